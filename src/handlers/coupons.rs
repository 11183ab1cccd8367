//! Read-only coupon validation endpoint.

use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use std::sync::Arc;

use crate::errors::ServiceError;
use crate::models::{CouponSummary, CouponValidateRequest};
use crate::money::Money;
use crate::AppState;

pub fn coupon_routes() -> Router<Arc<AppState>> {
    Router::new().route("/coupon/validate", post(validate_coupon))
}

async fn validate_coupon(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CouponValidateRequest>,
) -> Result<Json<CouponSummary>, ServiceError> {
    if payload.code.trim().is_empty() {
        return Err(ServiceError::MissingCode);
    }

    // Items are optional; without them the coupon is checked against an
    // empty cart and a zero subtotal.
    let (lines, subtotal) = if payload.items.is_empty() {
        (Vec::new(), Money::ZERO)
    } else {
        state
            .services
            .quotes
            .resolve_request_items(&payload.items)
            .await?
    };

    let outcome = state
        .services
        .coupons
        .validate(&payload.code, &lines, subtotal)
        .await?;
    Ok(Json(CouponSummary::from(&outcome)))
}
