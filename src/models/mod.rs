//! Wire-facing data model: requests, quotes, coupons, orders, addresses.

pub mod address;
pub mod coupon;
pub mod order;
pub mod quote;

pub use address::Address;
pub use coupon::{CouponOutcome, CouponSummary, DiscountType, InvalidReason};
pub use order::{
    derive_initial_status, next_action_for_status, CreateOrderResponse, NextAction, OrderRequest,
    OrderTotals,
};
pub use quote::{
    CouponValidateRequest, CurrencyInfo, HealthResponse, LineItemInput, QuoteRequest,
    QuoteResponse, QuoteTotals, ResolvedLineItem, RetainedRequest, ShippingRate, StockCheck,
    StoredQuote,
};
