//! Shared test harness: a fully wired engine over the in-memory back-office.

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use base64::Engine as _;
use chrono::{Duration as ChronoDuration, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use checkout_api::{
    app_router,
    auth::AuthKeys,
    backoffice::{
        memory::MemoryBackOffice, CouponRecord, ProductRecord, TaxRateRecord, VariationRecord,
    },
    config::{ApiKeyEntry, AppConfig, CurrencyConfig, QuoteConfig, TaxConfig},
    events::EventSender,
    handlers::AppServices,
    money::Money,
    quote_store::InMemoryQuoteStore,
    services::{CouponEvaluator, OrderService, QuoteService, ShippingService},
    AppState,
};

pub const WRITE_KEY: (&str, &str) = ("ck_test_write", "cs_test_write");
pub const READ_KEY: (&str, &str) = ("ck_test_read", "cs_test_read");

#[derive(Clone, Copy)]
pub enum Auth {
    None,
    Read,
    Write,
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub backoffice: Arc<MemoryBackOffice>,
}

fn simple_product(id: u64, name: &str, price: &str, is_virtual: bool) -> ProductRecord {
    ProductRecord {
        id,
        name: name.to_string(),
        sku: format!("SKU-{id}"),
        status: "publish".into(),
        catalog_visibility: "visible".into(),
        password_protected: false,
        price: price.to_string(),
        regular_price: price.to_string(),
        sale_price: String::new(),
        tax_class: String::new(),
        manage_stock: false,
        stock_quantity: None,
        backorders_allowed: false,
        is_virtual,
        max_quantity: None,
        category_ids: vec![],
    }
}

fn coupon(code: &str, discount_type: &str, amount: &str) -> CouponRecord {
    CouponRecord {
        code: code.to_string(),
        status: "publish".into(),
        description: String::new(),
        discount_type: discount_type.to_string(),
        amount: amount.to_string(),
        date_expires: None,
        usage_count: 0,
        usage_limit: 0,
        minimum_amount: String::new(),
        maximum_amount: String::new(),
        free_shipping: false,
        product_ids: vec![],
        excluded_product_ids: vec![],
        product_categories: vec![],
        excluded_product_categories: vec![],
    }
}

fn seed(backoffice: &MemoryBackOffice) {
    // 1: virtual product at $18.99 (no shipping involved)
    backoffice.insert_product(simple_product(1, "Gift Beans Box", "18.99", true));
    // 2: virtual product at a round $20.00 for coupon scenarios
    backoffice.insert_product(simple_product(2, "Tasting Credit", "20.00", true));
    // 3: physical product with managed stock of 5, no backorders
    let mut managed = simple_product(3, "Burr Grinder", "9.50", false);
    managed.manage_stock = true;
    managed.stock_quantity = Some(5);
    backoffice.insert_product(managed);
    // 7: unpublished product
    let mut draft_product = simple_product(7, "Unreleased Roast", "12.00", true);
    draft_product.status = "draft".into();
    backoffice.insert_product(draft_product);
    // 101: variable product; its variation 1011 carries the selling price
    let mut parent = simple_product(101, "Single Origin Beans", "14.99", false);
    parent.category_ids = vec![10];
    backoffice.insert_product(parent);
    backoffice.insert_variation(VariationRecord {
        id: 1011,
        parent_id: 101,
        sku: "BEANS-SO-250".into(),
        price: "14.99".into(),
        regular_price: "14.99".into(),
        sale_price: String::new(),
        tax_class: None,
        manage_stock: false,
        stock_quantity: None,
        backorders_allowed: false,
        attributes: BTreeMap::from([("Weight".to_string(), "250g".to_string())]),
    });

    backoffice.insert_coupon(coupon("save10", "percent", "10"));
    let mut expired = coupon("expired10", "percent", "10");
    expired.date_expires = Some(Utc::now() - ChronoDuration::days(1));
    backoffice.insert_coupon(expired);
    backoffice.insert_coupon(coupon("fiveoff", "fixed_cart", "5.00"));

    backoffice.set_flat_rate(Money::from_minor(500), "Flat rate");
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(Duration::from_secs(900), false)
    }

    pub fn with_quote_ttl(ttl: Duration) -> Self {
        Self::build(ttl, false)
    }

    /// Enables taxation with a single 10% rate for the US.
    pub fn with_taxes() -> Self {
        Self::build(Duration::from_secs(900), true)
    }

    fn build(ttl: Duration, taxes: bool) -> Self {
        let config = AppConfig {
            public_url: "https://shop.test".into(),
            api_keys: vec![
                ApiKeyEntry {
                    consumer_key: WRITE_KEY.0.into(),
                    consumer_secret: WRITE_KEY.1.into(),
                    scope: "write".into(),
                },
                ApiKeyEntry {
                    consumer_key: READ_KEY.0.into(),
                    consumer_secret: READ_KEY.1.into(),
                    scope: "read".into(),
                },
            ],
            quote: QuoteConfig {
                ttl_secs: ttl.as_secs(),
                sweep_interval_secs: 60,
            },
            tax: TaxConfig {
                enabled: taxes,
                prices_include_tax: false,
                base_country: "US".into(),
                base_state: String::new(),
            },
            ..AppConfig::default()
        };
        let currency: CurrencyConfig = config.currency.clone();

        let backoffice = Arc::new(MemoryBackOffice::new(&config.public_url));
        seed(&backoffice);
        if taxes {
            backoffice.insert_tax_rate(TaxRateRecord {
                id: 1,
                country: "US".into(),
                state: String::new(),
                postcode: String::new(),
                city: String::new(),
                tax_class: String::new(),
                rate: rust_decimal::Decimal::from(10),
                label: "US Tax".into(),
                applies_to_shipping: false,
            });
        }

        let (event_sender, mut event_rx) = EventSender::channel(64);
        // Tests do not consume events; drain them so senders never block.
        let _drain = tokio::spawn(async move { while event_rx.recv().await.is_some() {} });

        let store = Arc::new(InMemoryQuoteStore::new());
        let coupons = Arc::new(CouponEvaluator::new(backoffice.clone(), currency.clone()));
        let shipping = Arc::new(ShippingService::new(backoffice.clone()));
        let quotes = Arc::new(QuoteService::new(
            backoffice.clone(),
            coupons.clone(),
            shipping,
            backoffice.clone(),
            store.clone(),
            event_sender.clone(),
            currency.clone(),
            config.quote.clone(),
            config.tax.clone(),
        ));
        let orders = Arc::new(OrderService::new(
            backoffice.clone(),
            backoffice.clone(),
            backoffice.clone(),
            store.clone(),
            quotes.clone(),
            event_sender.clone(),
            currency,
        ));

        let auth = AuthKeys::from_config(&config.api_keys);
        let state = Arc::new(AppState {
            config,
            services: AppServices {
                quotes,
                orders,
                coupons,
                backoffice_info: backoffice.clone(),
            },
            auth,
            event_sender,
        });

        TestApp { state, backoffice }
    }

    pub fn router(&self) -> Router {
        app_router(self.state.clone())
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        auth: Auth,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        let credentials = match auth {
            Auth::None => None,
            Auth::Read => Some(READ_KEY),
            Auth::Write => Some(WRITE_KEY),
        };
        if let Some((key, secret)) = credentials {
            let token =
                base64::engine::general_purpose::STANDARD.encode(format!("{key}:{secret}"));
            builder = builder.header(header::AUTHORIZATION, format!("Basic {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = self
            .router()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("response body")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}
