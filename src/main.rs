use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};

use checkout_api::{
    app_router,
    auth::AuthKeys,
    backoffice::memory,
    config,
    events::{process_events, EventSender},
    handlers::AppServices,
    quote_store::InMemoryQuoteStore,
    services::{CouponEvaluator, OrderService, QuoteService, ShippingService},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load_config()?;
    config::init_tracing(&config.log_level);
    tracing::info!(environment = %config.environment, "starting checkout API");

    let (event_sender, event_rx) = EventSender::channel(1000);
    let _event_processor = tokio::spawn(process_events(event_rx));

    // Demo composition runs on the in-memory back-office; a production
    // deployment swaps in clients for the real catalog, coupon store, order
    // store, and rate provider behind the same traits.
    let backoffice = Arc::new(memory::with_demo_catalog(&config.public_url));
    tracing::info!("using in-memory back-office with demo catalog");

    let quote_store = Arc::new(InMemoryQuoteStore::new());
    let _sweeper = quote_store.spawn_sweeper(config.quote.sweep_interval());

    // Composition root: evaluator -> quote engine -> order engine -> HTTP.
    let coupons = Arc::new(CouponEvaluator::new(
        backoffice.clone(),
        config.currency.clone(),
    ));
    let shipping = Arc::new(ShippingService::new(backoffice.clone()));
    let quotes = Arc::new(QuoteService::new(
        backoffice.clone(),
        coupons.clone(),
        shipping,
        backoffice.clone(),
        quote_store.clone(),
        event_sender.clone(),
        config.currency.clone(),
        config.quote.clone(),
        config.tax.clone(),
    ));
    let orders = Arc::new(OrderService::new(
        backoffice.clone(),
        backoffice.clone(),
        backoffice.clone(),
        quote_store,
        quotes.clone(),
        event_sender.clone(),
        config.currency.clone(),
    ));

    let auth = AuthKeys::from_config(&config.api_keys);
    if auth.is_empty() {
        tracing::warn!("no API keys configured; all authenticated endpoints will reject");
    }

    let state = Arc::new(AppState {
        config: config.clone(),
        services: AppServices {
            quotes,
            orders,
            coupons,
            backoffice_info: backoffice,
        },
        auth,
        event_sender,
    });

    let app = app_router(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new()),
        )
        .layer(axum::middleware::from_fn(
            checkout_api::middleware_helpers::request_id_middleware,
        ));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("checkout API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
