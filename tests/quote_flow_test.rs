//! End-to-end quote scenarios through the HTTP router.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{Auth, TestApp};

#[tokio::test]
async fn simple_quote_without_coupons_or_shipping() {
    let app = TestApp::new();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({ "items": [{ "product_id": 1, "quantity": 2 }] })),
            Auth::Write,
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["totals"]["subtotal"], "3798");
    assert_eq!(body["totals"]["discount"], "0");
    assert_eq!(body["totals"]["shipping"], "0");
    assert_eq!(body["totals"]["tax"], "0");
    assert_eq!(body["totals"]["total"], "3798");
    assert_eq!(body["line_items"].as_array().unwrap().len(), 1);
    assert_eq!(body["line_items"][0]["unit_price"], "1899");
    assert_eq!(body["line_items"][0]["line_total"], "3798");
    assert!(body["shipping_rates"].as_array().unwrap().is_empty());
    assert_eq!(body["stock_status"][0]["ok"], true);
    assert_eq!(body["currency"]["code"], "USD");
    assert!(!body["quote_id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn percent_coupon_discounts_the_subtotal() {
    let app = TestApp::new();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({
                "items": [{ "product_id": 2, "quantity": 1 }],
                "coupons": ["SAVE10"]
            })),
            Auth::Write,
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["totals"]["subtotal"], "2000");
    assert_eq!(body["totals"]["discount"], "200");
    assert_eq!(body["totals"]["total"], "1800");
    assert_eq!(body["coupons"][0]["valid"], true);
    assert_eq!(body["coupons"][0]["code"], "save10");
    assert_eq!(body["coupons"][0]["discount"], "200");
}

#[tokio::test]
async fn expired_coupon_rides_inside_the_quote() {
    let app = TestApp::new();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({
                "items": [{ "product_id": 2, "quantity": 1 }],
                "coupons": ["EXPIRED10"]
            })),
            Auth::Write,
        )
        .await;

    // A coupon rejection never fails the quote.
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["totals"]["subtotal"], "2000");
    assert_eq!(body["totals"]["discount"], "0");
    assert_eq!(body["totals"]["total"], "2000");
    assert_eq!(body["coupons"][0]["valid"], false);
    assert_eq!(body["coupons"][0]["reason"], "coupon_expired");
}

#[tokio::test]
async fn coupons_stack_additively_against_the_subtotal() {
    let app = TestApp::new();

    let (_, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({
                "items": [{ "product_id": 2, "quantity": 1 }],
                "coupons": ["SAVE10", "FIVEOFF"]
            })),
            Auth::Write,
        )
        .await;

    // Both evaluate against the pre-discount subtotal of 2000.
    assert_eq!(body["coupons"][0]["discount"], "200");
    assert_eq!(body["coupons"][1]["discount"], "500");
    assert_eq!(body["totals"]["discount"], "700");
    assert_eq!(body["totals"]["total"], "1300");
}

#[tokio::test]
async fn submission_order_is_preserved() {
    let app = TestApp::new();

    let (_, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({
                "items": [
                    { "product_id": 2, "quantity": 1 },
                    { "product_id": 1, "quantity": 1 }
                ],
                "coupons": ["EXPIRED10", "SAVE10"]
            })),
            Auth::Write,
        )
        .await;

    assert_eq!(body["line_items"][0]["product_id"], 2);
    assert_eq!(body["line_items"][1]["product_id"], 1);
    assert_eq!(body["coupons"][0]["code"], "expired10");
    assert_eq!(body["coupons"][1]["code"], "save10");
}

#[tokio::test]
async fn coupon_outcome_does_not_depend_on_other_coupons() {
    let app = TestApp::new();
    let items = json!([{ "product_id": 2, "quantity": 1 }]);

    let (_, alone) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({ "items": items.clone(), "coupons": ["SAVE10"] })),
            Auth::Write,
        )
        .await;
    let (_, stacked) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({ "items": items, "coupons": ["EXPIRED10", "FIVEOFF", "SAVE10"] })),
            Auth::Write,
        )
        .await;

    // save10's own record is identical either way; only the aggregate sum
    // couples coupons.
    assert_eq!(alone["coupons"][0]["valid"], stacked["coupons"][2]["valid"]);
    assert_eq!(
        alone["coupons"][0]["discount"],
        stacked["coupons"][2]["discount"]
    );
}

#[tokio::test]
async fn short_stock_flags_the_line_but_issues_the_quote() {
    let app = TestApp::new();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({ "items": [{ "product_id": 3, "quantity": 10 }] })),
            Auth::Write,
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["stock_status"][0]["ok"], false);
    assert_eq!(body["stock_status"][0]["available"], 5);
    assert_eq!(body["stock_status"][0]["requested"], 10);
}

#[tokio::test]
async fn unmanaged_stock_reports_null_availability() {
    let app = TestApp::new();

    let (_, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({ "items": [{ "product_id": 1, "quantity": 500 }] })),
            Auth::Write,
        )
        .await;

    assert_eq!(body["stock_status"][0]["ok"], true);
    assert!(body["stock_status"][0]["available"].is_null());
}

#[tokio::test]
async fn duplicate_lines_merge_by_identity_triple() {
    let app = TestApp::new();

    let (_, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({
                "items": [
                    { "product_id": 1, "quantity": 1 },
                    { "product_id": 1, "quantity": 1, "meta": { "grind": "espresso" } },
                    { "product_id": 1, "quantity": 2 }
                ]
            })),
            Auth::Write,
        )
        .await;

    let lines = body["line_items"].as_array().unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["quantity"], 3);
    assert_eq!(lines[1]["meta"]["grind"], "espresso");
}

#[tokio::test]
async fn variable_product_quotes_with_shipping_rates() {
    let app = TestApp::new();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({
                "items": [{ "product_id": 101, "variation_id": 1011, "quantity": 1 }],
                "shipping_address": { "country": "US" }
            })),
            Auth::Write,
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["line_items"][0]["unit_price"], "1499");
    assert_eq!(body["line_items"][0]["sku"], "BEANS-SO-250");
    let rates = body["shipping_rates"].as_array().unwrap();
    assert_eq!(rates.len(), 1);
    assert_eq!(rates[0]["rate_id"], "flat_rate:1");
    assert_eq!(rates[0]["cost"], "500");
    // Shipping is committed at order time, not in the quote total.
    assert_eq!(body["totals"]["shipping"], "0");
    assert_eq!(body["totals"]["total"], "1499");
}

#[tokio::test]
async fn missing_product_rejects_the_whole_request() {
    let app = TestApp::new();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({
                "items": [
                    { "product_id": 1, "quantity": 1 },
                    { "product_id": 999, "quantity": 1 }
                ]
            })),
            Auth::Write,
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "product_not_found");
    assert_eq!(body["status"], 404);
    assert!(body["message"].as_str().unwrap().contains("999"));
}

#[tokio::test]
async fn unpublished_product_is_not_purchasable() {
    let app = TestApp::new();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({ "items": [{ "product_id": 7, "quantity": 1 }] })),
            Auth::Write,
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "product_not_purchasable");
}

#[tokio::test]
async fn invalid_items_are_rejected_with_machine_readable_errors() {
    let app = TestApp::new();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({ "items": [] })),
            Auth::Write,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_items");

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({ "items": [{ "product_id": 1, "quantity": 0 }] })),
            Auth::Write,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_items");
    assert!(body["message"].as_str().unwrap().contains("items[0]"));
}

#[tokio::test]
async fn stored_quote_reads_back_until_it_expires() {
    let app = TestApp::new();

    let (_, created) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({ "items": [{ "product_id": 1, "quantity": 1 }] })),
            Auth::Write,
        )
        .await;
    let quote_id = created["quote_id"].as_str().unwrap();

    let (status, fetched) = app
        .request(
            Method::GET,
            &format!("/api/v1/quote/{quote_id}"),
            None,
            Auth::Read,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["quote_id"], created["quote_id"]);
    assert_eq!(fetched["totals"]["total"], created["totals"]["total"]);

    let (status, body) = app
        .request(Method::GET, "/api/v1/quote/nope", None, Auth::Read)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "quote_not_found");
}

#[tokio::test]
async fn coupon_validate_is_a_read_only_path() {
    let app = TestApp::new();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/coupon/validate",
            Some(json!({
                "code": "SAVE10",
                "items": [{ "product_id": 2, "quantity": 1 }]
            })),
            Auth::Read,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["discount"], "200");

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/coupon/validate",
            Some(json!({ "code": "" })),
            Auth::Read,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "missing_code");
}

#[tokio::test]
async fn write_endpoints_enforce_key_scopes() {
    let app = TestApp::new();
    let payload = json!({ "items": [{ "product_id": 1, "quantity": 1 }] });

    let (status, body) = app
        .request(Method::POST, "/api/v1/quote", Some(payload.clone()), Auth::None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, body) = app
        .request(Method::POST, "/api/v1/quote", Some(payload.clone()), Auth::Read)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "insufficient_permissions");

    // The same pair is accepted as query parameters.
    let (status, _) = app
        .request(
            Method::POST,
            &format!(
                "/api/v1/quote?consumer_key={}&consumer_secret={}",
                common::WRITE_KEY.0,
                common::WRITE_KEY.1
            ),
            Some(payload),
            Auth::None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn enabled_taxes_are_computed_per_line() {
    let app = TestApp::with_taxes();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({
                "items": [
                    { "product_id": 2, "quantity": 1 },
                    { "product_id": 1, "quantity": 1 }
                ],
                "shipping_address": { "country": "US" }
            })),
            Auth::Write,
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    // 10% of each line, summed into the totals.
    assert_eq!(body["line_items"][0]["line_tax"], "200");
    assert_eq!(body["line_items"][1]["line_tax"], "190");
    assert_eq!(body["totals"]["tax"], "390");
    assert_eq!(body["totals"]["total"], "4289");
}

#[tokio::test]
async fn taxes_fall_back_to_the_store_base_address() {
    let app = TestApp::with_taxes();

    // No destination: the configured US base address still matches the rate.
    let (_, body) = app
        .request(
            Method::POST,
            "/api/v1/quote",
            Some(json!({ "items": [{ "product_id": 2, "quantity": 1 }] })),
            Auth::Write,
        )
        .await;
    assert_eq!(body["totals"]["tax"], "200");
    assert_eq!(body["totals"]["total"], "2200");
}

#[tokio::test]
async fn health_is_unauthenticated() {
    let app = TestApp::new();

    for path in ["/health", "/api/v1/health"] {
        let (status, body) = app.request(Method::GET, path, None, Auth::None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(!body["backend_version"].as_str().unwrap().is_empty());
    }
}
