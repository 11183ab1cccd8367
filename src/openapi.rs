//! OpenAPI document for the wire DTOs, served as JSON.

use axum::{routing::get, Json, Router};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::errors::ErrorEnvelope;
use crate::models::{
    address::Address,
    coupon::CouponSummary,
    order::{CreateOrderResponse, OrderRequest, OrderTotals},
    quote::{
        CouponValidateRequest, CurrencyInfo, HealthResponse, LineItemInput, QuoteRequest,
        QuoteResponse, QuoteTotals, ResolvedLineItem, ShippingRate, StockCheck,
    },
};
use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Checkout API",
        description = "Stateless quote-based checkout service"
    ),
    components(schemas(
        Address,
        CouponSummary,
        CouponValidateRequest,
        CreateOrderResponse,
        CurrencyInfo,
        ErrorEnvelope,
        HealthResponse,
        LineItemInput,
        OrderRequest,
        OrderTotals,
        QuoteRequest,
        QuoteResponse,
        QuoteTotals,
        ResolvedLineItem,
        ShippingRate,
        StockCheck,
    ))
)]
pub struct ApiDoc;

pub fn openapi_routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDoc::openapi()) }),
    )
}
