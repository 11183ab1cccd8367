//! Quote request and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::models::address::Address;
use crate::models::coupon::CouponSummary;
use crate::money::Money;

/// Currency facts injected from configuration and echoed on every quote.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrencyInfo {
    pub code: String,
    pub symbol: String,
    pub decimals: u32,
}

/// One requested purchase line. Identity for merging is the
/// `(product_id, variation_id, meta)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LineItemInput {
    pub product_id: u64,
    #[serde(default)]
    pub variation_id: u64,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl LineItemInput {
    pub fn identity(&self) -> (u64, u64, &BTreeMap<String, String>) {
        (self.product_id, self.variation_id, &self.meta)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct QuoteRequest {
    pub items: Vec<LineItemInput>,
    #[serde(default)]
    pub coupons: Vec<String>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub customer_id: u64,
}

/// A line item after catalog resolution. Pricing facts that do not travel on
/// the wire (tax class, shippability, categories) stay server-side.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResolvedLineItem {
    pub product_id: u64,
    pub variation_id: u64,
    pub name: String,
    pub sku: String,
    pub quantity: u32,
    #[schema(value_type = String)]
    pub unit_price: Money,
    #[schema(value_type = String)]
    pub line_total: Money,
    #[schema(value_type = String)]
    pub line_tax: Money,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    #[serde(skip)]
    pub tax_class: String,
    #[serde(skip)]
    pub needs_shipping: bool,
    #[serde(skip)]
    pub category_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShippingRate {
    pub rate_id: String,
    pub method_id: String,
    pub instance_id: u32,
    pub label: String,
    #[schema(value_type = String)]
    pub cost: Money,
    #[schema(value_type = String)]
    pub tax: Money,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schema(value_type = Object)]
    pub meta_data: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuoteTotals {
    #[schema(value_type = String)]
    pub subtotal: Money,
    #[schema(value_type = String)]
    pub discount: Money,
    #[schema(value_type = String)]
    pub shipping: Money,
    #[schema(value_type = String)]
    pub tax: Money,
    #[schema(value_type = String)]
    pub total: Money,
}

/// Per-line stock probe result. `available` is `null` for products that do
/// not manage stock (treated as unlimited).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StockCheck {
    pub product_id: u64,
    pub available: Option<i64>,
    pub requested: u32,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuoteResponse {
    pub quote_id: String,
    pub expires_at: DateTime<Utc>,
    pub line_items: Vec<ResolvedLineItem>,
    pub coupons: Vec<CouponSummary>,
    pub shipping_rates: Vec<ShippingRate>,
    pub totals: QuoteTotals,
    pub currency: CurrencyInfo,
    pub stock_status: Vec<StockCheck>,
}

/// The slice of the original request the order path needs later.
#[derive(Debug, Clone)]
pub struct RetainedRequest {
    pub items: Vec<LineItemInput>,
    pub coupon_codes: Vec<String>,
    pub shipping_address: Option<Address>,
    pub customer_id: u64,
}

/// What the quote store holds under a quote id.
#[derive(Debug, Clone)]
pub struct StoredQuote {
    pub response: QuoteResponse,
    pub retained: RetainedRequest,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CouponValidateRequest {
    pub code: String,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend_version: String,
}
