//! Quote engine: turns a shopping intent into a priced, stock-checked,
//! coupon-evaluated snapshot with a TTL.

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use rand::RngCore;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::backoffice::{calc_tax, Catalog, TaxTable};
use crate::config::{CurrencyConfig, QuoteConfig, TaxConfig};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::models::{
    Address, CouponSummary, CurrencyInfo, LineItemInput, QuoteRequest, QuoteResponse, QuoteTotals,
    ResolvedLineItem, RetainedRequest, StockCheck, StoredQuote,
};
use crate::money::Money;
use crate::quote_store::QuoteStore;
use crate::services::coupons::{normalize_code, CouponEvaluator};
use crate::services::shipping::ShippingService;

/// Stock facts gathered while resolving a line. `available` is `None` when
/// the product does not manage stock.
#[derive(Debug, Clone, Copy)]
pub struct StockFacts {
    pub managed: bool,
    pub available: Option<i64>,
    pub backorders_allowed: bool,
}

impl StockFacts {
    /// A probe passes unless stock is managed, backorders are off, and the
    /// available quantity falls short.
    pub fn can_fulfill(&self, requested: u32) -> bool {
        if !self.managed || self.backorders_allowed {
            return true;
        }
        self.available.unwrap_or(0) >= i64::from(requested)
    }
}

/// Resolves one request line against the catalog. Shared by the quote path
/// and the order path's independent re-probe.
pub(crate) async fn resolve_line(
    catalog: &dyn Catalog,
    item: &LineItemInput,
    decimals: u32,
) -> Result<(ResolvedLineItem, StockFacts), ServiceError> {
    let product = catalog
        .get_product(item.product_id)
        .await
        .map_err(|e| ServiceError::CatalogUnavailable(e.to_string()))?
        .ok_or(ServiceError::ProductNotFound(item.product_id))?;

    if !product.is_purchasable() {
        return Err(ServiceError::ProductNotPurchasable(item.product_id));
    }
    if let Some(max) = product.max_quantity {
        if item.quantity > max {
            return Err(ServiceError::InvalidItems(format!(
                "quantity for product {} exceeds the maximum of {max}",
                item.product_id
            )));
        }
    }

    let (price_str, sku, tax_class, stock) = if item.variation_id != 0 {
        let variation = catalog
            .get_variation(item.variation_id)
            .await
            .map_err(|e| ServiceError::CatalogUnavailable(e.to_string()))?
            .ok_or(ServiceError::ProductNotFound(item.variation_id))?;
        let stock = if variation.manage_stock {
            StockFacts {
                managed: true,
                available: Some(variation.stock_quantity.unwrap_or(0)),
                backorders_allowed: variation.backorders_allowed,
            }
        } else {
            product_stock_facts(&product)
        };
        (
            variation.display_price().to_string(),
            variation.sku.clone(),
            variation
                .tax_class
                .clone()
                .unwrap_or_else(|| product.tax_class.clone()),
            stock,
        )
    } else {
        (
            product.display_price().to_string(),
            product.sku.clone(),
            product.tax_class.clone(),
            product_stock_facts(&product),
        )
    };

    let unit_price = Money::from_decimal_string(&price_str, decimals)
        .map_err(|_| ServiceError::ProductNotPurchasable(item.product_id))?;

    Ok((
        ResolvedLineItem {
            product_id: item.product_id,
            variation_id: item.variation_id,
            name: product.name.clone(),
            sku,
            quantity: item.quantity,
            unit_price,
            line_total: unit_price.mul_quantity(item.quantity),
            line_tax: Money::ZERO,
            meta: item.meta.clone(),
            tax_class,
            needs_shipping: product.needs_shipping(),
            category_ids: product.category_ids.clone(),
        },
        stock,
    ))
}

fn product_stock_facts(product: &crate::backoffice::ProductRecord) -> StockFacts {
    StockFacts {
        managed: product.manage_stock,
        available: if product.manage_stock {
            Some(product.stock_quantity.unwrap_or(0))
        } else {
            None
        },
        backorders_allowed: product.backorders_allowed,
    }
}

/// Request validation and line merging: duplicate `(product, variation,
/// meta)` triples collapse into one line at the first position.
pub(crate) fn validate_and_merge_items(
    items: &[LineItemInput],
) -> Result<Vec<LineItemInput>, ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::InvalidItems(
            "at least one item is required".into(),
        ));
    }

    let mut merged: Vec<LineItemInput> = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        if item.product_id == 0 {
            return Err(ServiceError::InvalidItems(format!(
                "items[{index}].product_id must be positive"
            )));
        }
        if item.quantity == 0 {
            return Err(ServiceError::InvalidItems(format!(
                "items[{index}].quantity must be at least 1"
            )));
        }
        if let Some(existing) = merged.iter_mut().find(|m| m.identity() == item.identity()) {
            existing.quantity = existing.quantity.saturating_add(item.quantity);
        } else {
            merged.push(item.clone());
        }
    }
    Ok(merged)
}

/// Quote-time totals. Shipping is intentionally zero: the chosen rate is
/// committed at order time only.
pub fn compute_totals(subtotal: Money, discount_sum: Money, tax: Money) -> QuoteTotals {
    let discount = discount_sum.min(subtotal);
    QuoteTotals {
        subtotal,
        discount,
        shipping: Money::ZERO,
        tax,
        total: subtotal.saturating_sub(discount).add(tax),
    }
}

fn generate_quote_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Capability handed to the order engine for consuming quotes, so the
/// engines never hold each other directly.
#[async_trait]
pub trait QuoteRetiring: Send + Sync {
    async fn retire_quote(&self, quote_id: &str) -> Result<(), ServiceError>;
}

pub struct QuoteService {
    catalog: Arc<dyn Catalog>,
    coupons: Arc<CouponEvaluator>,
    shipping: Arc<ShippingService>,
    tax_table: Arc<dyn TaxTable>,
    store: Arc<dyn QuoteStore>,
    event_sender: EventSender,
    currency: CurrencyConfig,
    quote_config: QuoteConfig,
    tax_config: TaxConfig,
}

impl QuoteService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<dyn Catalog>,
        coupons: Arc<CouponEvaluator>,
        shipping: Arc<ShippingService>,
        tax_table: Arc<dyn TaxTable>,
        store: Arc<dyn QuoteStore>,
        event_sender: EventSender,
        currency: CurrencyConfig,
        quote_config: QuoteConfig,
        tax_config: TaxConfig,
    ) -> Self {
        Self {
            catalog,
            coupons,
            shipping,
            tax_table,
            store,
            event_sender,
            currency,
            quote_config,
            tax_config,
        }
    }

    fn currency_info(&self) -> CurrencyInfo {
        CurrencyInfo {
            code: self.currency.code.clone(),
            symbol: self.currency.symbol.clone(),
            decimals: self.currency.decimals,
        }
    }

    /// Resolves request items without issuing a quote; the coupon validation
    /// endpoint uses this to obtain a subtotal.
    pub async fn resolve_request_items(
        &self,
        items: &[LineItemInput],
    ) -> Result<(Vec<ResolvedLineItem>, Money), ServiceError> {
        let mut lines = Vec::with_capacity(items.len());
        let mut subtotal = Money::ZERO;
        for item in validate_and_merge_items(items)? {
            let (line, _) = resolve_line(self.catalog.as_ref(), &item, self.currency.decimals).await?;
            subtotal = subtotal.add(line.line_total);
            lines.push(line);
        }
        Ok((lines, subtotal))
    }

    #[instrument(skip(self, request), fields(items = request.items.len(), coupons = request.coupons.len()))]
    pub async fn create_quote(&self, request: QuoteRequest) -> Result<QuoteResponse, ServiceError> {
        let decimals = self.currency.decimals;
        let items = validate_and_merge_items(&request.items)?;

        // Resolve lines in submission order; any missing or unpurchasable
        // product rejects the whole request.
        let mut lines: Vec<ResolvedLineItem> = Vec::with_capacity(items.len());
        let mut stock_status: Vec<StockCheck> = Vec::with_capacity(items.len());
        let mut subtotal = Money::ZERO;
        for item in &items {
            let (line, stock) = resolve_line(self.catalog.as_ref(), item, decimals).await?;
            // The probe never rejects quote creation; a short line is issued
            // with ok=false so the client can surface it.
            stock_status.push(StockCheck {
                product_id: item.product_id,
                available: stock.available,
                requested: item.quantity,
                ok: stock.can_fulfill(item.quantity),
            });
            subtotal = subtotal.add(line.line_total);
            lines.push(line);
        }

        // Coupons evaluate independently against the pre-discount subtotal,
        // in submission order.
        let mut coupon_codes = Vec::with_capacity(request.coupons.len());
        let mut coupons: Vec<CouponSummary> = Vec::with_capacity(request.coupons.len());
        let mut discount_sum = Money::ZERO;
        for code in &request.coupons {
            let outcome = self.coupons.validate(code, &lines, subtotal).await?;
            discount_sum = discount_sum.add(outcome.discount());
            coupon_codes.push(normalize_code(code));
            coupons.push(CouponSummary::from(&outcome));
        }

        let shipping_rates = self
            .shipping
            .rates(request.shipping_address.as_ref(), &lines)
            .await?;

        let mut tax_total = Money::ZERO;
        if self.tax_config.enabled {
            for line in &mut lines {
                let tax = self
                    .line_tax(line, request.shipping_address.as_ref())
                    .await?;
                line.line_tax = tax;
                tax_total = tax_total.add(tax);
            }
        }

        let totals = compute_totals(subtotal, discount_sum, tax_total);
        let quote_id = generate_quote_id();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.quote_config.ttl())
                .unwrap_or_else(|_| chrono::Duration::seconds(900));

        let response = QuoteResponse {
            quote_id: quote_id.clone(),
            expires_at,
            line_items: lines,
            coupons,
            shipping_rates,
            totals,
            currency: self.currency_info(),
            stock_status,
        };

        // Persistence is the final step; a cancelled request leaves nothing
        // behind.
        self.store
            .put(
                StoredQuote {
                    response: response.clone(),
                    retained: RetainedRequest {
                        items,
                        coupon_codes,
                        shipping_address: request.shipping_address,
                        customer_id: request.customer_id,
                    },
                },
                self.quote_config.ttl(),
            )
            .await
            .map_err(|e| ServiceError::QuoteStoreUnavailable(e.to_string()))?;

        self.event_sender
            .send_or_log(Event::QuoteCreated {
                quote_id: quote_id.clone(),
                line_count: response.line_items.len(),
            })
            .await;
        info!(%quote_id, total = %response.totals.total, "quote created");

        Ok(response)
    }

    async fn line_tax(
        &self,
        line: &ResolvedLineItem,
        destination: Option<&Address>,
    ) -> Result<Money, ServiceError> {
        let (country, state, postcode, city) = match destination {
            Some(addr) if addr.has_country() => (
                addr.country.as_str(),
                addr.state.as_str(),
                addr.postcode.as_str(),
                addr.city.as_str(),
            ),
            _ => (
                self.tax_config.base_country.as_str(),
                self.tax_config.base_state.as_str(),
                "",
                "",
            ),
        };
        let rates = self
            .tax_table
            .find_rates(country, state, postcode, city, &line.tax_class)
            .await
            .map_err(|e| ServiceError::CatalogUnavailable(e.to_string()))?;
        let amounts = calc_tax(
            line.line_total,
            &rates,
            self.tax_config.prices_include_tax,
        );
        Ok(amounts
            .into_iter()
            .fold(Money::ZERO, |acc, amount| acc.add(amount)))
    }

    /// Returns the stored quote if it is still live. The store filters
    /// expired entries, so a stale id reads as missing.
    #[instrument(skip(self))]
    pub async fn get_quote(&self, quote_id: &str) -> Result<QuoteResponse, ServiceError> {
        self.load(quote_id)
            .await?
            .map(|stored| stored.response)
            .ok_or(ServiceError::QuoteNotFound)
    }

    async fn load(&self, quote_id: &str) -> Result<Option<StoredQuote>, ServiceError> {
        self.store
            .get(quote_id)
            .await
            .map_err(|e| ServiceError::QuoteStoreUnavailable(e.to_string()))
    }

    pub async fn delete_quote(&self, quote_id: &str) -> Result<(), ServiceError> {
        self.store
            .delete(quote_id)
            .await
            .map_err(|e| ServiceError::QuoteStoreUnavailable(e.to_string()))?;
        self.event_sender
            .send_or_log(Event::QuoteRetired {
                quote_id: quote_id.to_string(),
            })
            .await;
        Ok(())
    }
}

#[async_trait]
impl QuoteRetiring for QuoteService {
    async fn retire_quote(&self, quote_id: &str) -> Result<(), ServiceError> {
        if let Err(e) = self.delete_quote(quote_id).await {
            warn!(%quote_id, error = %e, "failed to retire quote");
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn item(product_id: u64, quantity: u32) -> LineItemInput {
        LineItemInput {
            product_id,
            variation_id: 0,
            quantity,
            meta: BTreeMap::new(),
        }
    }

    #[test]
    fn empty_items_are_rejected() {
        let err = validate_and_merge_items(&[]).unwrap_err();
        assert_eq!(err.kind(), "invalid_items");
    }

    #[test]
    fn zero_product_id_is_rejected_with_the_index() {
        let err = validate_and_merge_items(&[item(0, 1)]).unwrap_err();
        assert!(err.to_string().contains("items[0]"));
    }

    #[test]
    fn duplicate_triples_merge_quantities() {
        let merged = validate_and_merge_items(&[item(1, 2), item(2, 1), item(1, 3)]).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].product_id, 1);
        assert_eq!(merged[0].quantity, 5);
        assert_eq!(merged[1].product_id, 2);
    }

    #[test]
    fn lines_with_different_meta_do_not_merge() {
        let mut flavored = item(1, 1);
        flavored.meta.insert("grind".into(), "espresso".into());
        let merged = validate_and_merge_items(&[item(1, 1), flavored]).unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn totals_algebra_holds() {
        let totals = compute_totals(
            Money::from_minor(2000),
            Money::from_minor(200),
            Money::from_minor(150),
        );
        assert_eq!(totals.total, Money::from_minor(1950));
        assert_eq!(totals.shipping, Money::ZERO);
    }

    #[test]
    fn discount_is_clamped_by_subtotal() {
        let totals = compute_totals(
            Money::from_minor(1000),
            Money::from_minor(2500),
            Money::ZERO,
        );
        assert_eq!(totals.discount, Money::from_minor(1000));
        assert_eq!(totals.total, Money::ZERO);
    }

    #[test]
    fn quote_ids_are_url_safe_and_distinct() {
        let a = generate_quote_id();
        let b = generate_quote_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 22); // 16 random bytes, base64url, unpadded
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn unmanaged_stock_always_fulfills() {
        let facts = StockFacts {
            managed: false,
            available: None,
            backorders_allowed: false,
        };
        assert!(facts.can_fulfill(10_000));
    }

    #[test]
    fn managed_stock_respects_backorders() {
        let short = StockFacts {
            managed: true,
            available: Some(1),
            backorders_allowed: false,
        };
        assert!(!short.can_fulfill(2));
        let backordered = StockFacts {
            backorders_allowed: true,
            ..short
        };
        assert!(backordered.can_fulfill(2));
    }
}
