//! Order engine: converts a live quote into a durable order exactly once.
//!
//! The idempotency story has three layers: a point query against the sink's
//! order meta, an in-process lock table keyed by the idempotency key (so
//! concurrent same-key calls serialize), and the sink's unique-meta
//! constraint as the final backstop. Locks are dropped from the table as
//! soon as the write terminates; nothing else is held across sink I/O.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, instrument, warn};

use crate::backoffice::{
    BackOfficeError, Catalog, OrderHeader, OrderLine, OrderRecord, OrderSink, StockLedger,
};
use crate::config::CurrencyConfig;
use crate::errors::{stock_rejection, ServiceError};
use crate::events::{Event, EventSender};
use crate::models::{
    next_action_for_status, derive_initial_status, Address, CreateOrderResponse, OrderRequest,
    StoredQuote,
};
use crate::quote_store::QuoteStore;
use crate::services::quotes::{resolve_line, QuoteRetiring};

const META_QUOTE_ID: &str = "_quote_id";
const META_IDEMPOTENCY_KEY: &str = "_idempotency_key";
const META_CREATED_VIA: &str = "_created_via";
const META_STOCK_REDUCTION_FAILED: &str = "_stock_reduction_failed";
const CREATED_VIA: &str = "checkout-api";

pub struct OrderService {
    catalog: Arc<dyn Catalog>,
    sink: Arc<dyn OrderSink>,
    ledger: Arc<dyn StockLedger>,
    quotes: Arc<dyn QuoteStore>,
    retiring: Arc<dyn QuoteRetiring>,
    event_sender: EventSender,
    currency: CurrencyConfig,
    idempotency_locks: Arc<AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl OrderService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        sink: Arc<dyn OrderSink>,
        ledger: Arc<dyn StockLedger>,
        quotes: Arc<dyn QuoteStore>,
        retiring: Arc<dyn QuoteRetiring>,
        event_sender: EventSender,
        currency: CurrencyConfig,
    ) -> Self {
        Self {
            catalog,
            sink,
            ledger,
            quotes,
            retiring,
            event_sender,
            currency,
            idempotency_locks: Arc::new(AsyncMutex::new(HashMap::new())),
        }
    }

    #[instrument(skip(self, request), fields(quote_id = %request.quote_id, has_key = request.idempotency_key.is_some()))]
    pub async fn create_order(
        &self,
        request: OrderRequest,
    ) -> Result<CreateOrderResponse, ServiceError> {
        validate_request(&request)?;

        match request.idempotency_key.clone() {
            Some(key) => {
                let lock = self.acquire_idempotency_lock(&key).await;
                let result = {
                    let _guard = lock.lock().await;
                    self.create_order_inner(&request, Some(&key)).await
                };
                self.release_idempotency_lock(&key, lock).await;
                result
            }
            None => self.create_order_inner(&request, None).await,
        }
    }

    async fn create_order_inner(
        &self,
        request: &OrderRequest,
        idempotency_key: Option<&str>,
    ) -> Result<CreateOrderResponse, ServiceError> {
        // 1. Replay check: a key that already produced an order short-circuits
        //    everything else.
        if let Some(key) = idempotency_key {
            if let Some(existing) = self.find_existing(key).await? {
                info!(order_id = existing.id, "idempotent replay");
                self.event_sender
                    .send_or_log(Event::OrderReplayed {
                        order_id: existing.id,
                    })
                    .await;
                return Ok(summary(existing, false));
            }
        }

        // 2. Reload the quote. Missing and expired are indistinguishable.
        let stored = self
            .quotes
            .get(&request.quote_id)
            .await
            .map_err(|e| ServiceError::QuoteStoreUnavailable(e.to_string()))?
            .ok_or(ServiceError::QuoteExpired)?;

        // 3. Shipping rate selection.
        let selected_rate = select_rate(&stored, request.shipping_rate_id.as_deref())?;

        // 4. Independent stock re-probe. The quote-time snapshot is not
        //    trusted here.
        for item in &stored.retained.items {
            let (_, stock) =
                resolve_line(self.catalog.as_ref(), item, self.currency.decimals).await?;
            if !stock.can_fulfill(item.quantity) {
                return Err(stock_rejection(
                    item.product_id,
                    stock.available.unwrap_or(0),
                ));
            }
        }

        // 5. Materialize through the sink.
        let mut draft = self
            .sink
            .create(OrderHeader {
                customer_id: stored.retained.customer_id,
                currency: self.currency.code.clone(),
            })
            .await
            .map_err(|e| ServiceError::OrderCreationFailed(e.to_string()))?;

        for item in &stored.retained.items {
            draft.add_line(OrderLine {
                product_id: item.product_id,
                variation_id: item.variation_id,
                quantity: item.quantity,
                meta: item.meta.clone(),
            });
        }
        if let Some(rate) = selected_rate {
            draft.add_shipping(rate);
        }

        // The quote's discounts were advisory; the back-office recomputes
        // each code it recognizes.
        for coupon in stored.response.coupons.iter().filter(|c| c.valid) {
            self.sink
                .apply_coupon(&mut draft, &coupon.code)
                .await
                .map_err(|e| ServiceError::OrderCreationFailed(e.to_string()))?;
        }

        let billing = request
            .billing_address
            .as_ref()
            .map(Address::sanitized)
            .unwrap_or_default();
        let shipping = request
            .shipping_address
            .as_ref()
            .map(Address::sanitized)
            .unwrap_or_else(|| billing.clone());
        draft.set_addresses(billing, shipping);
        draft.customer_email = request.customer_email.clone();
        draft.set_payment(&request.payment_method, request.set_paid);
        draft.customer_note = request.customer_note.clone();

        self.sink
            .recompute_totals(&mut draft)
            .await
            .map_err(|e| ServiceError::OrderCreationFailed(e.to_string()))?;

        draft.set_meta(META_QUOTE_ID, &request.quote_id);
        if let Some(key) = idempotency_key {
            draft.set_meta(META_IDEMPOTENCY_KEY, key);
        }
        draft.set_meta(META_CREATED_VIA, CREATED_VIA);

        // 6. Initial status.
        let (status, next_action) =
            derive_initial_status(request.set_paid, &request.payment_method);

        let record = match self.sink.save(draft, status).await {
            Ok(record) => record,
            // A concurrent writer with the same key beat us to the unique
            // meta constraint; return its order.
            Err(BackOfficeError::Conflict { existing_order_id }) => {
                warn!(existing_order_id, "idempotency conflict on save");
                let existing = self
                    .find_order(existing_order_id, idempotency_key)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::OrderCreationFailed("conflicting order vanished".into())
                    })?;
                return Ok(summary(existing, false));
            }
            Err(e) => return Err(ServiceError::OrderCreationFailed(e.to_string())),
        };

        // 7. Stock reduction is best-effort: a ledger failure leaves the
        //    order standing, flagged for reconciliation.
        if let Err(e) = self.ledger.reduce_for_order(record.id).await {
            warn!(order_id = record.id, error = %e, "stock reduction failed");
            self.event_sender
                .send_or_log(Event::StockReductionFailed {
                    order_id: record.id,
                })
                .await;
            if let Err(e) = self
                .sink
                .annotate(record.id, META_STOCK_REDUCTION_FAILED, "1")
                .await
            {
                warn!(order_id = record.id, error = %e, "failed to flag stock reduction");
            }
        }

        // 8. Retire the quote, best-effort. A retry with a different key
        //    cannot succeed because the quote is gone.
        if self.retiring.retire_quote(&request.quote_id).await.is_err() {
            warn!(quote_id = %request.quote_id, "quote retirement failed");
        }

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: record.id,
                quote_id: request.quote_id.clone(),
            })
            .await;
        info!(order_id = record.id, status, "order created");

        let mut response = summary(record, true);
        response.next_action = next_action.as_str().to_string();
        Ok(response)
    }

    async fn find_existing(&self, key: &str) -> Result<Option<OrderRecord>, ServiceError> {
        self.sink
            .find_by_meta(META_IDEMPOTENCY_KEY, key)
            .await
            .map_err(|e| ServiceError::OrderCreationFailed(e.to_string()))
    }

    async fn find_order(
        &self,
        order_id: u64,
        idempotency_key: Option<&str>,
    ) -> Result<Option<OrderRecord>, ServiceError> {
        let Some(key) = idempotency_key else {
            return Ok(None);
        };
        Ok(self
            .find_existing(key)
            .await?
            .filter(|record| record.id == order_id))
    }

    async fn acquire_idempotency_lock(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.idempotency_locks.lock().await;
        if let Some(lock) = locks.get(key) {
            lock.clone()
        } else {
            let new_lock = Arc::new(AsyncMutex::new(()));
            locks.insert(key.to_string(), new_lock.clone());
            new_lock
        }
    }

    async fn release_idempotency_lock(&self, key: &str, lock: Arc<AsyncMutex<()>>) {
        if Arc::strong_count(&lock) == 1 {
            let mut locks = self.idempotency_locks.lock().await;
            if let Some(existing) = locks.get(key) {
                if Arc::ptr_eq(existing, &lock) {
                    locks.remove(key);
                }
            }
        }
    }
}

fn validate_request(request: &OrderRequest) -> Result<(), ServiceError> {
    if request.quote_id.trim().is_empty() {
        return Err(ServiceError::MissingField("quote_id"));
    }
    if request.billing_address.is_none() {
        return Err(ServiceError::MissingField("billing_address"));
    }
    if request.payment_method.trim().is_empty() {
        return Err(ServiceError::MissingField("payment_method"));
    }
    Ok(())
}

/// Picks the quote's rate matching the request. Quotes without rates ignore
/// the field entirely.
fn select_rate<'a>(
    stored: &'a StoredQuote,
    shipping_rate_id: Option<&str>,
) -> Result<Option<&'a crate::models::ShippingRate>, ServiceError> {
    if stored.response.shipping_rates.is_empty() {
        return Ok(None);
    }
    let Some(rate_id) = shipping_rate_id else {
        return Err(ServiceError::InvalidShippingRate(
            "shipping_rate_id is required for this quote".into(),
        ));
    };
    stored
        .response
        .shipping_rates
        .iter()
        .find(|rate| rate.rate_id == rate_id)
        .map(Some)
        .ok_or_else(|| {
            ServiceError::InvalidShippingRate(format!(
                "shipping rate {rate_id:?} is not part of this quote"
            ))
        })
}

fn summary(record: OrderRecord, created: bool) -> CreateOrderResponse {
    let next_action = next_action_for_status(&record.status);
    CreateOrderResponse {
        order_id: record.id,
        order_key: record.order_key,
        status: record.status,
        totals: record.totals,
        payment_url: record.payment_url,
        next_action: next_action.as_str().to_string(),
        created,
    }
}
