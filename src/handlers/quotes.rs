//! Quote endpoints.

use axum::{
    extract::{Json, Path, State},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::errors::ServiceError;
use crate::handlers::common::created_response;
use crate::models::{QuoteRequest, QuoteResponse};
use crate::AppState;

/// Routes requiring write scope.
pub fn quote_write_routes() -> Router<Arc<AppState>> {
    Router::new().route("/quote", post(create_quote))
}

/// Routes requiring read scope.
pub fn quote_read_routes() -> Router<Arc<AppState>> {
    Router::new().route("/quote/:quote_id", get(get_quote))
}

async fn create_quote(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QuoteRequest>,
) -> Result<Response, ServiceError> {
    let quote = state.services.quotes.create_quote(payload).await?;
    Ok(created_response(quote))
}

async fn get_quote(
    State(state): State<Arc<AppState>>,
    Path(quote_id): Path<String>,
) -> Result<Json<QuoteResponse>, ServiceError> {
    let quote = state.services.quotes.get_quote(&quote_id).await?;
    Ok(Json(quote))
}
