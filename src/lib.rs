//! Checkout API library.
//!
//! A stateless quote → order pipeline in front of a commerce back-office:
//! quotes are priced, stock-checked, coupon-evaluated snapshots with a TTL;
//! orders materialize a quote exactly once under an idempotency key.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod middleware_helpers;
pub mod backoffice;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod money;
pub mod openapi;
pub mod quote_store;
pub mod services;

use axum::{middleware, Router};
use std::sync::Arc;

use crate::auth::AuthKeys;
use crate::config::AppConfig;
use crate::events::EventSender;
use crate::handlers::AppServices;

/// Process-wide state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub services: AppServices,
    pub auth: AuthKeys,
    pub event_sender: EventSender,
}

/// The `/api/v1` surface: write endpoints gated on write-scoped keys, read
/// endpoints on any valid key, health open.
pub fn api_v1_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let write_routes = handlers::quotes::quote_write_routes()
        .merge(handlers::orders::order_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_write,
        ));

    let read_routes = handlers::quotes::quote_read_routes()
        .merge(handlers::coupons::coupon_routes())
        .route_layer(middleware::from_fn_with_state(state, auth::require_read));

    write_routes
        .merge(read_routes)
        .merge(handlers::health::health_routes())
}

/// The complete application router.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes(state.clone()))
        .merge(handlers::health::health_routes())
        .merge(openapi::openapi_routes())
        .with_state(state)
}
