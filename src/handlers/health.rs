//! Unauthenticated health endpoint.

use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;

use crate::models::HealthResponse;
use crate::AppState;

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend_version: state.services.backoffice_info.backend_version(),
    })
}
