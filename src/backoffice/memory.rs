//! In-memory back-office.
//!
//! Implements every collaborator contract against process-local state. The
//! demo composition in `main` runs on it, and the test suite drives the
//! whole engine through it — the same role the mock commerce server plays in
//! local development.

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::warn;

use crate::backoffice::{
    calc_tax, BackOfficeError, BackOfficeInfo, Catalog, CouponRecord, CouponStore, OrderCouponLine,
    OrderDraft, OrderHeader, OrderLine, OrderRecord, OrderSink, ProductRecord, RateProvider,
    StockLedger, TaxRateRecord, TaxTable, VariationRecord,
};
use crate::models::{Address, OrderTotals, ResolvedLineItem, ShippingRate};
use crate::money::Money;
use crate::services::coupons::{coupon_discount, normalize_code};

const BACKEND_VERSION: &str = "9.8.1";

#[derive(Debug, Clone)]
struct FlatRate {
    cost: Money,
    label: String,
}

struct StoredOrder {
    record: OrderRecord,
    lines: Vec<OrderLine>,
}

#[derive(Default)]
struct Inner {
    products: HashMap<u64, ProductRecord>,
    variations: HashMap<u64, VariationRecord>,
    coupons: HashMap<String, CouponRecord>,
    tax_rates: Vec<TaxRateRecord>,
    flat_rate: Option<FlatRate>,
    orders: HashMap<u64, StoredOrder>,
    next_order_id: u64,
    reduced_orders: HashSet<u64>,
}

pub struct MemoryBackOffice {
    inner: RwLock<Inner>,
    base_url: String,
    decimals: u32,
    stock_ledger_down: AtomicBool,
}

impl MemoryBackOffice {
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_order_id: 1500,
                ..Inner::default()
            }),
            base_url: base_url.trim_end_matches('/').to_string(),
            decimals: 2,
            stock_ledger_down: AtomicBool::new(false),
        }
    }

    // ---- seeding -----------------------------------------------------

    pub fn insert_product(&self, product: ProductRecord) {
        self.write().products.insert(product.id, product);
    }

    pub fn insert_variation(&self, variation: VariationRecord) {
        self.write().variations.insert(variation.id, variation);
    }

    pub fn insert_coupon(&self, coupon: CouponRecord) {
        let mut inner = self.write();
        inner.coupons.insert(normalize_code(&coupon.code), coupon);
    }

    pub fn insert_tax_rate(&self, rate: TaxRateRecord) {
        self.write().tax_rates.push(rate);
    }

    pub fn set_flat_rate(&self, cost: Money, label: &str) {
        self.write().flat_rate = Some(FlatRate {
            cost,
            label: label.to_string(),
        });
    }

    /// Overwrites a product's managed stock level, e.g. to model a sale that
    /// happened between quote and order.
    pub fn set_stock(&self, product_id: u64, quantity: i64) {
        let mut inner = self.write();
        if let Some(product) = inner.products.get_mut(&product_id) {
            product.manage_stock = true;
            product.stock_quantity = Some(quantity);
        }
        if let Some(variation) = inner.variations.get_mut(&product_id) {
            variation.manage_stock = true;
            variation.stock_quantity = Some(quantity);
        }
    }

    pub fn stock_of(&self, product_id: u64) -> Option<i64> {
        let inner = self.read();
        inner
            .products
            .get(&product_id)
            .and_then(|p| p.stock_quantity)
            .or_else(|| inner.variations.get(&product_id).and_then(|v| v.stock_quantity))
    }

    /// Simulates a stock-ledger outage.
    pub fn set_stock_ledger_available(&self, available: bool) {
        self.stock_ledger_down.store(!available, Ordering::SeqCst);
    }

    pub fn order_count(&self) -> usize {
        self.read().orders.len()
    }

    pub fn order_meta(&self, order_id: u64, key: &str) -> Option<String> {
        self.read()
            .orders
            .get(&order_id)
            .and_then(|o| o.record.meta.get(key).cloned())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Re-resolves draft lines against the current catalog, the way the
    /// back-office does when it recomputes an order.
    fn resolved_lines(
        &self,
        inner: &Inner,
        lines: &[OrderLine],
    ) -> Result<Vec<ResolvedLineItem>, BackOfficeError> {
        lines
            .iter()
            .map(|line| {
                let product = inner.products.get(&line.product_id).ok_or_else(|| {
                    BackOfficeError::Unavailable(format!(
                        "product {} disappeared during materialization",
                        line.product_id
                    ))
                })?;
                let (price, sku, tax_class) = if line.variation_id != 0 {
                    let variation =
                        inner.variations.get(&line.variation_id).ok_or_else(|| {
                            BackOfficeError::Unavailable(format!(
                                "variation {} disappeared during materialization",
                                line.variation_id
                            ))
                        })?;
                    (
                        variation.display_price().to_string(),
                        variation.sku.clone(),
                        variation
                            .tax_class
                            .clone()
                            .unwrap_or_else(|| product.tax_class.clone()),
                    )
                } else {
                    (
                        product.display_price().to_string(),
                        product.sku.clone(),
                        product.tax_class.clone(),
                    )
                };
                let unit_price = Money::from_decimal_string(&price, self.decimals)
                    .map_err(|e| BackOfficeError::Unavailable(e.to_string()))?;
                Ok(ResolvedLineItem {
                    product_id: line.product_id,
                    variation_id: line.variation_id,
                    name: product.name.clone(),
                    sku,
                    quantity: line.quantity,
                    unit_price,
                    line_total: unit_price.mul_quantity(line.quantity),
                    line_tax: Money::ZERO,
                    meta: line.meta.clone(),
                    tax_class,
                    needs_shipping: product.needs_shipping(),
                    category_ids: product.category_ids.clone(),
                })
            })
            .collect()
    }

    fn line_tax(&self, inner: &Inner, line: &ResolvedLineItem, destination: &Address) -> Money {
        let rates: Vec<TaxRateRecord> = inner
            .tax_rates
            .iter()
            .filter(|rate| rate_matches(rate, destination, &line.tax_class))
            .cloned()
            .collect();
        calc_tax(line.line_total, &rates, false)
            .into_iter()
            .fold(Money::ZERO, |acc, amount| acc.add(amount))
    }
}

fn rate_matches(rate: &TaxRateRecord, destination: &Address, tax_class: &str) -> bool {
    let field_matches = |rate_field: &str, value: &str| {
        rate_field.is_empty() || rate_field.eq_ignore_ascii_case(value)
    };
    field_matches(&rate.country, &destination.country)
        && field_matches(&rate.state, &destination.state)
        && field_matches(&rate.postcode, &destination.postcode)
        && field_matches(&rate.city, &destination.city)
        && rate.tax_class == tax_class
}

fn generate_order_key() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(13)
        .map(char::from)
        .collect();
    format!("wc_order_{}", suffix.to_lowercase())
}

// ---------------------------------------------------------------------------

#[async_trait]
impl Catalog for MemoryBackOffice {
    async fn get_product(&self, id: u64) -> Result<Option<ProductRecord>, BackOfficeError> {
        Ok(self.read().products.get(&id).cloned())
    }

    async fn get_variation(&self, id: u64) -> Result<Option<VariationRecord>, BackOfficeError> {
        Ok(self.read().variations.get(&id).cloned())
    }
}

#[async_trait]
impl CouponStore for MemoryBackOffice {
    async fn get(&self, code: &str) -> Result<Option<CouponRecord>, BackOfficeError> {
        Ok(self.read().coupons.get(code).cloned())
    }
}

#[async_trait]
impl RateProvider for MemoryBackOffice {
    async fn rates(
        &self,
        _destination: &Address,
        _items: &[ResolvedLineItem],
    ) -> Result<Vec<ShippingRate>, BackOfficeError> {
        let inner = self.read();
        Ok(inner
            .flat_rate
            .iter()
            .map(|flat| ShippingRate {
                rate_id: "flat_rate:1".to_string(),
                method_id: "flat_rate".to_string(),
                instance_id: 1,
                label: flat.label.clone(),
                cost: flat.cost,
                tax: Money::ZERO,
                meta_data: BTreeMap::new(),
            })
            .collect())
    }
}

#[async_trait]
impl TaxTable for MemoryBackOffice {
    async fn find_rates(
        &self,
        country: &str,
        state: &str,
        postcode: &str,
        city: &str,
        tax_class: &str,
    ) -> Result<Vec<TaxRateRecord>, BackOfficeError> {
        let destination = Address {
            country: country.to_string(),
            state: state.to_string(),
            postcode: postcode.to_string(),
            city: city.to_string(),
            ..Address::default()
        };
        Ok(self
            .read()
            .tax_rates
            .iter()
            .filter(|rate| rate_matches(rate, &destination, tax_class))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OrderSink for MemoryBackOffice {
    async fn create(&self, header: OrderHeader) -> Result<OrderDraft, BackOfficeError> {
        Ok(OrderDraft::new(header))
    }

    async fn apply_coupon(
        &self,
        draft: &mut OrderDraft,
        code: &str,
    ) -> Result<(), BackOfficeError> {
        let code = normalize_code(code);
        let inner = self.read();
        let Some(coupon) = inner.coupons.get(&code).cloned() else {
            // The quote's view was advisory; a code deleted since then is
            // skipped rather than failing the order.
            warn!(%code, "coupon no longer exists, skipping");
            return Ok(());
        };
        let lines = self.resolved_lines(&inner, &draft.lines)?;
        drop(inner);
        let subtotal = lines
            .iter()
            .fold(Money::ZERO, |acc, line| acc.add(line.line_total));
        let discount = coupon_discount(&coupon, &lines, subtotal, self.decimals)
            .map_err(|e| BackOfficeError::Unavailable(e.to_string()))?
            .unwrap_or(Money::ZERO);
        draft.coupon_lines.push(OrderCouponLine { code, discount });
        Ok(())
    }

    async fn recompute_totals(&self, draft: &mut OrderDraft) -> Result<(), BackOfficeError> {
        let inner = self.read();
        let lines = self.resolved_lines(&inner, &draft.lines)?;

        let subtotal = lines
            .iter()
            .fold(Money::ZERO, |acc, line| acc.add(line.line_total));
        let discount = draft
            .coupon_lines
            .iter()
            .fold(Money::ZERO, |acc, line| acc.add(line.discount))
            .min(subtotal);
        let shipping = draft
            .shipping_lines
            .iter()
            .fold(Money::ZERO, |acc, line| acc.add(line.cost));
        let mut tax = draft
            .shipping_lines
            .iter()
            .fold(Money::ZERO, |acc, line| acc.add(line.tax));
        for line in &lines {
            tax = tax.add(self.line_tax(&inner, line, &draft.shipping));
        }

        draft.totals = OrderTotals {
            subtotal,
            shipping,
            discount,
            tax,
            total: subtotal.saturating_sub(discount).add(shipping).add(tax),
        };
        Ok(())
    }

    async fn save(&self, draft: OrderDraft, status: &str) -> Result<OrderRecord, BackOfficeError> {
        let mut inner = self.write();

        if let Some(key) = draft.meta.get("_idempotency_key") {
            if let Some(existing) = inner
                .orders
                .values()
                .find(|o| o.record.meta.get("_idempotency_key") == Some(key))
            {
                return Err(BackOfficeError::Conflict {
                    existing_order_id: existing.record.id,
                });
            }
        }

        let id = inner.next_order_id;
        inner.next_order_id += 1;
        let order_key = generate_order_key();
        let record = OrderRecord {
            id,
            order_key: order_key.clone(),
            status: status.to_string(),
            totals: draft.totals.clone(),
            payment_url: format!(
                "{}/checkout/order-pay/{id}/?pay_for_order=true&key={order_key}",
                self.base_url
            ),
            meta: draft.meta.clone(),
        };
        inner.orders.insert(
            id,
            StoredOrder {
                record: record.clone(),
                lines: draft.lines,
            },
        );
        Ok(record)
    }

    async fn find_by_meta(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<OrderRecord>, BackOfficeError> {
        Ok(self
            .read()
            .orders
            .values()
            .find(|o| o.record.meta.get(key).map(String::as_str) == Some(value))
            .map(|o| o.record.clone()))
    }

    async fn annotate(
        &self,
        order_id: u64,
        key: &str,
        value: &str,
    ) -> Result<(), BackOfficeError> {
        let mut inner = self.write();
        let order = inner.orders.get_mut(&order_id).ok_or_else(|| {
            BackOfficeError::Unavailable(format!("order {order_id} not found"))
        })?;
        order
            .record
            .meta
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl StockLedger for MemoryBackOffice {
    async fn reduce_for_order(&self, order_id: u64) -> Result<(), BackOfficeError> {
        if self.stock_ledger_down.load(Ordering::SeqCst) {
            return Err(BackOfficeError::Unavailable("stock ledger is down".into()));
        }
        let mut inner = self.write();
        if !inner.reduced_orders.insert(order_id) {
            return Ok(());
        }
        let lines: Vec<OrderLine> = inner
            .orders
            .get(&order_id)
            .map(|o| o.lines.clone())
            .unwrap_or_default();
        for line in lines {
            let quantity = i64::from(line.quantity);
            if line.variation_id != 0 {
                if let Some(variation) = inner.variations.get_mut(&line.variation_id) {
                    if variation.manage_stock {
                        variation.stock_quantity =
                            Some(variation.stock_quantity.unwrap_or(0) - quantity);
                        continue;
                    }
                }
            }
            if let Some(product) = inner.products.get_mut(&line.product_id) {
                if product.manage_stock {
                    product.stock_quantity =
                        Some(product.stock_quantity.unwrap_or(0) - quantity);
                }
            }
        }
        Ok(())
    }
}

impl BackOfficeInfo for MemoryBackOffice {
    fn backend_version(&self) -> String {
        BACKEND_VERSION.to_string()
    }
}

/// A small catalog used by the demo composition in `main`.
pub fn with_demo_catalog(base_url: &str) -> MemoryBackOffice {
    let backoffice = MemoryBackOffice::new(base_url);
    backoffice.insert_product(ProductRecord {
        id: 1,
        name: "House Blend Beans".into(),
        sku: "BEANS-HOUSE".into(),
        status: "publish".into(),
        catalog_visibility: "visible".into(),
        password_protected: false,
        price: "18.99".into(),
        regular_price: "18.99".into(),
        sale_price: String::new(),
        tax_class: String::new(),
        manage_stock: false,
        stock_quantity: None,
        backorders_allowed: false,
        is_virtual: false,
        max_quantity: None,
        category_ids: vec![10],
    });
    backoffice.insert_product(ProductRecord {
        id: 101,
        name: "Single Origin Beans".into(),
        sku: "BEANS-SO".into(),
        status: "publish".into(),
        catalog_visibility: "visible".into(),
        password_protected: false,
        price: "14.99".into(),
        regular_price: "14.99".into(),
        sale_price: String::new(),
        tax_class: String::new(),
        manage_stock: false,
        stock_quantity: None,
        backorders_allowed: false,
        is_virtual: false,
        max_quantity: None,
        category_ids: vec![10],
    });
    backoffice.insert_variation(VariationRecord {
        id: 1011,
        parent_id: 101,
        sku: "BEANS-SO-250".into(),
        price: "14.99".into(),
        regular_price: "14.99".into(),
        sale_price: String::new(),
        tax_class: None,
        manage_stock: true,
        stock_quantity: Some(40),
        backorders_allowed: false,
        attributes: BTreeMap::from([("Weight".to_string(), "250g".to_string())]),
    });
    backoffice.insert_coupon(CouponRecord {
        code: "save10".into(),
        status: "publish".into(),
        description: "10% off your order".into(),
        discount_type: "percent".into(),
        amount: "10".into(),
        date_expires: None,
        usage_count: 0,
        usage_limit: 0,
        minimum_amount: String::new(),
        maximum_amount: String::new(),
        free_shipping: false,
        product_ids: vec![],
        excluded_product_ids: vec![],
        product_categories: vec![],
        excluded_product_categories: vec![],
    });
    backoffice.set_flat_rate(Money::from_minor(500), "Flat rate");
    backoffice
}
