//! Contracts for the commerce back-office this service fronts.
//!
//! The engine never talks to a database or an upstream API directly; it
//! consumes these capability traits. The in-memory implementation in
//! [`memory`] backs the demo composition and the test suite.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::{Address, OrderTotals, ResolvedLineItem, ShippingRate};
use crate::money::Money;

#[derive(Debug, Error)]
pub enum BackOfficeError {
    #[error("back-office unavailable: {0}")]
    Unavailable(String),

    /// An order with the same idempotency meta already exists.
    #[error("duplicate idempotency key, order {existing_order_id} already exists")]
    Conflict { existing_order_id: u64 },
}

// ---------------------------------------------------------------------------
// Catalog

/// Product facts as the catalog reports them.
#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub id: u64,
    pub name: String,
    pub sku: String,
    /// Lifecycle status, `"publish"` for live products.
    pub status: String,
    pub catalog_visibility: String,
    pub password_protected: bool,
    pub price: String,
    pub regular_price: String,
    pub sale_price: String,
    pub tax_class: String,
    pub manage_stock: bool,
    pub stock_quantity: Option<i64>,
    pub backorders_allowed: bool,
    /// Virtual products need no shipping.
    pub is_virtual: bool,
    pub max_quantity: Option<u32>,
    pub category_ids: Vec<u64>,
}

impl ProductRecord {
    /// Sale price wins when set, then the effective price, then the regular
    /// price.
    pub fn display_price(&self) -> &str {
        if !self.sale_price.is_empty() {
            &self.sale_price
        } else if !self.price.is_empty() {
            &self.price
        } else {
            &self.regular_price
        }
    }

    pub fn is_purchasable(&self) -> bool {
        self.status == "publish"
            && !self.password_protected
            && self.catalog_visibility != "hidden"
            && !self.display_price().is_empty()
    }

    pub fn needs_shipping(&self) -> bool {
        !self.is_virtual
    }
}

#[derive(Debug, Clone)]
pub struct VariationRecord {
    pub id: u64,
    pub parent_id: u64,
    pub sku: String,
    pub price: String,
    pub regular_price: String,
    pub sale_price: String,
    /// `None` inherits the parent product's tax class.
    pub tax_class: Option<String>,
    pub manage_stock: bool,
    pub stock_quantity: Option<i64>,
    pub backorders_allowed: bool,
    pub attributes: BTreeMap<String, String>,
}

impl VariationRecord {
    pub fn display_price(&self) -> &str {
        if !self.sale_price.is_empty() {
            &self.sale_price
        } else if !self.price.is_empty() {
            &self.price
        } else {
            &self.regular_price
        }
    }
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_product(&self, id: u64) -> Result<Option<ProductRecord>, BackOfficeError>;
    async fn get_variation(&self, id: u64) -> Result<Option<VariationRecord>, BackOfficeError>;
}

// ---------------------------------------------------------------------------
// Coupons

#[derive(Debug, Clone)]
pub struct CouponRecord {
    /// Stored normalized (lowercase, trimmed).
    pub code: String,
    pub status: String,
    pub description: String,
    pub discount_type: String,
    /// Raw amount string: a percentage for `percent`, a decimal price
    /// otherwise.
    pub amount: String,
    pub date_expires: Option<DateTime<Utc>>,
    pub usage_count: u64,
    /// Zero means unlimited.
    pub usage_limit: u64,
    /// Empty or `"0"` means no threshold.
    pub minimum_amount: String,
    pub maximum_amount: String,
    pub free_shipping: bool,
    pub product_ids: Vec<u64>,
    pub excluded_product_ids: Vec<u64>,
    pub product_categories: Vec<u64>,
    pub excluded_product_categories: Vec<u64>,
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Lookup by normalized code.
    async fn get(&self, code: &str) -> Result<Option<CouponRecord>, BackOfficeError>;
}

// ---------------------------------------------------------------------------
// Shipping

#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn rates(
        &self,
        destination: &Address,
        items: &[ResolvedLineItem],
    ) -> Result<Vec<ShippingRate>, BackOfficeError>;
}

// ---------------------------------------------------------------------------
// Taxes

#[derive(Debug, Clone)]
pub struct TaxRateRecord {
    pub id: u64,
    pub country: String,
    pub state: String,
    pub postcode: String,
    pub city: String,
    pub tax_class: String,
    /// Percentage, e.g. `8.25`.
    pub rate: Decimal,
    pub label: String,
    pub applies_to_shipping: bool,
}

#[async_trait]
pub trait TaxTable: Send + Sync {
    async fn find_rates(
        &self,
        country: &str,
        state: &str,
        postcode: &str,
        city: &str,
        tax_class: &str,
    ) -> Result<Vec<TaxRateRecord>, BackOfficeError>;
}

/// Per-rate tax amounts for a line total. Pure; rounding goes through the
/// Money half-even point.
pub fn calc_tax(line_total: Money, rates: &[TaxRateRecord], prices_include_tax: bool) -> Vec<Money> {
    rates
        .iter()
        .map(|rate| {
            let total = Decimal::from(line_total.minor());
            let raw = if prices_include_tax {
                // Back the tax out of a gross amount.
                total - total / (Decimal::ONE + rate.rate / Decimal::from(100))
            } else {
                total * rate.rate / Decimal::from(100)
            };
            Money::round_half_even(raw).unwrap_or(Money::ZERO)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Order sink

#[derive(Debug, Clone)]
pub struct OrderHeader {
    /// Zero for guest checkout.
    pub customer_id: u64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct OrderLine {
    pub product_id: u64,
    pub variation_id: u64,
    pub quantity: u32,
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct OrderShippingLine {
    pub method_id: String,
    pub label: String,
    pub cost: Money,
    pub tax: Money,
}

#[derive(Debug, Clone)]
pub struct OrderCouponLine {
    pub code: String,
    pub discount: Money,
}

/// An order being assembled. Field mutators live here; anything that needs
/// the back-office (coupon recomputation, totals, persistence) goes through
/// the [`OrderSink`].
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub header: OrderHeader,
    pub lines: Vec<OrderLine>,
    pub shipping_lines: Vec<OrderShippingLine>,
    pub coupon_lines: Vec<OrderCouponLine>,
    pub billing: Address,
    pub shipping: Address,
    pub customer_email: Option<String>,
    pub payment_method: String,
    pub set_paid: bool,
    pub customer_note: Option<String>,
    pub meta: BTreeMap<String, String>,
    pub totals: OrderTotals,
}

impl OrderDraft {
    pub fn new(header: OrderHeader) -> Self {
        OrderDraft {
            header,
            lines: Vec::new(),
            shipping_lines: Vec::new(),
            coupon_lines: Vec::new(),
            billing: Address::default(),
            shipping: Address::default(),
            customer_email: None,
            payment_method: String::new(),
            set_paid: false,
            customer_note: None,
            meta: BTreeMap::new(),
            totals: OrderTotals::default(),
        }
    }

    pub fn add_line(&mut self, line: OrderLine) {
        self.lines.push(line);
    }

    pub fn add_shipping(&mut self, rate: &ShippingRate) {
        self.shipping_lines.push(OrderShippingLine {
            method_id: rate.method_id.clone(),
            label: rate.label.clone(),
            cost: rate.cost,
            tax: rate.tax,
        });
    }

    pub fn set_addresses(&mut self, billing: Address, shipping: Address) {
        self.billing = billing;
        self.shipping = shipping;
    }

    pub fn set_payment(&mut self, method: &str, set_paid: bool) {
        self.payment_method = method.to_string();
        self.set_paid = set_paid;
    }

    pub fn set_meta(&mut self, key: &str, value: &str) {
        self.meta.insert(key.to_string(), value.to_string());
    }
}

/// A materialized, durable order.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub id: u64,
    pub order_key: String,
    pub status: String,
    pub totals: OrderTotals,
    pub payment_url: String,
    pub meta: BTreeMap<String, String>,
}

#[async_trait]
pub trait OrderSink: Send + Sync {
    /// Opens a draft for the given header.
    async fn create(&self, header: OrderHeader) -> Result<OrderDraft, BackOfficeError>;

    /// Re-applies a coupon by name; the back-office recomputes the discount
    /// from its own records. Unknown codes are skipped — the quote's view was
    /// advisory.
    async fn apply_coupon(
        &self,
        draft: &mut OrderDraft,
        code: &str,
    ) -> Result<(), BackOfficeError>;

    /// Recomputes the draft's totals from its lines, shipping, and coupons.
    async fn recompute_totals(&self, draft: &mut OrderDraft) -> Result<(), BackOfficeError>;

    /// Persists the draft with the given initial status. Enforces uniqueness
    /// of the `_idempotency_key` meta, reporting a conflict with the existing
    /// order id.
    async fn save(&self, draft: OrderDraft, status: &str) -> Result<OrderRecord, BackOfficeError>;

    /// Point query against order meta, used for idempotent replays.
    async fn find_by_meta(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Option<OrderRecord>, BackOfficeError>;

    /// Post-save annotation, e.g. flagging a failed stock reduction.
    async fn annotate(
        &self,
        order_id: u64,
        key: &str,
        value: &str,
    ) -> Result<(), BackOfficeError>;
}

// ---------------------------------------------------------------------------
// Stock ledger

#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Reduces stock for every line of the order. Idempotent on the order id.
    async fn reduce_for_order(&self, order_id: u64) -> Result<(), BackOfficeError>;
}

/// Health reporting for the backing commerce system.
pub trait BackOfficeInfo: Send + Sync {
    fn backend_version(&self) -> String;
}
