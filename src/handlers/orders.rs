//! Order endpoint.

use axum::{
    extract::{Json, State},
    response::Response,
    routing::post,
    Router,
};
use std::sync::Arc;

use crate::errors::ServiceError;
use crate::handlers::common::{created_response, success_response};
use crate::models::OrderRequest;
use crate::AppState;

pub fn order_routes() -> Router<Arc<AppState>> {
    Router::new().route("/order", post(create_order))
}

/// 201 on first materialization, 200 on an idempotent replay.
async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OrderRequest>,
) -> Result<Response, ServiceError> {
    let summary = state.services.orders.create_order(payload).await?;
    if summary.created {
        Ok(created_response(summary))
    } else {
        Ok(success_response(summary))
    }
}
