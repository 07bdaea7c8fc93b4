//! End-to-end behavior through the HTTP router backed by the in-memory store.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

use flower_shop::api::{router, AppState};
use flower_shop::config::ShopConfig;
use flower_shop::ShopService;

fn app() -> Router {
    router(AppState { service: Arc::new(ShopService::in_memory(ShopConfig::default())) })
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(serde_json::to_vec(&body).expect("serialize body")),
            None => Body::empty(),
        })
        .expect("request");

    let response = router.clone().oneshot(request).await.expect("router dispatch");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.expect("body");
    let payload = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).expect("json") };
    (status, payload)
}

fn dec(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}

async fn create_customer(router: &Router, name: &str, tier: Option<&str>) -> String {
    let (status, body) = send(router, "POST", "/api/v1/customers", Some(json!({ "name": name, "tier": tier }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().expect("customer id").to_string()
}

#[tokio::test]
async fn health_reports_service() {
    let (status, body) = send(&app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "flower-shop");
}

#[tokio::test]
async fn farmer_discount_is_capped() {
    let router = app();
    let id = create_customer(&router, "Trần Thị Bình", Some("Nông dân")).await;

    let (status, body) = send(&router, "POST", "/api/v1/discounts/quote", Some(json!({ "customer_id": id, "order_total": "2000000" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["eligible"], true);
    assert_eq!(dec(&body["discount_amount"]), Decimal::from(50_000));
    assert_eq!(dec(&body["discount_percentage"]), Decimal::from(5));
    assert_eq!(body["remaining_uses"], 0);
    assert_eq!(body["usage_period"], "month");
}

#[tokio::test]
async fn discount_below_minimum_order_is_zero() {
    let router = app();
    let id = create_customer(&router, "Bình", Some("Nông dân")).await;
    let (_, body) = send(&router, "POST", "/api/v1/discounts/quote", Some(json!({ "customer_id": id, "order_total": "999999" }))).await;
    assert_eq!(body["eligible"], false);
    assert_eq!(dec(&body["discount_amount"]), Decimal::ZERO);
    assert!(!body["message"].as_str().unwrap_or_default().is_empty());
}

#[tokio::test]
async fn tycoon_points_use_multiplier() {
    let router = app();
    let (status, body) = send(&router, "POST", "/api/v1/points/quote", Some(json!({ "paid_amount": "500000", "tier": "Đại gia" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["points"], 1000);

    let (status, _) = send(&router, "POST", "/api/v1/points/quote", Some(json!({ "paid_amount": "-1" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn debt_then_payment_builds_history() {
    let router = app();
    let id = create_customer(&router, "Trần Thị Bình", None).await;

    let (status, opened) = send(&router, "POST", "/api/v1/debts", Some(json!({
        "customer_id": id, "amount": "500000", "employee": { "id": "E1", "name": "Lan" }
    }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let debt_id = opened["debt"]["id"].as_str().expect("debt id").to_string();

    let (status, paid) = send(&router, "POST", &format!("/api/v1/debts/{debt_id}/payments"), Some(json!({ "amount": "200000", "method": "cash" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec(&paid["debt"]["remaining_amount"]), Decimal::from(300_000));

    let (status, history) = send(&router, "GET", &format!("/api/v1/customers/{id}/debt-history"), None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = history["entries"].as_array().expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["action"], "CREATE_DEBT");
    assert_eq!(dec(&entries[0]["amount"]), Decimal::from(500_000));
    assert_eq!(dec(&entries[0]["remaining_debt"]), Decimal::from(500_000));
    assert_eq!(entries[1]["action"], "PAYMENT");
    assert_eq!(dec(&entries[1]["amount"]), Decimal::from(200_000));
    assert_eq!(dec(&entries[1]["remaining_debt"]), Decimal::from(300_000));
    assert_eq!(dec(&history["outstanding"]), Decimal::from(300_000));
}

#[tokio::test]
async fn overpayment_is_rejected() {
    let router = app();
    let id = create_customer(&router, "Bình", None).await;
    let (_, opened) = send(&router, "POST", "/api/v1/debts", Some(json!({ "customer_id": id, "amount": "100000" }))).await;
    let debt_id = opened["debt"]["id"].as_str().expect("debt id").to_string();

    let (status, body) = send(&router, "POST", &format!("/api/v1/debts/{debt_id}/payments"), Some(json!({ "amount": "100001" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().is_some());

    let (_, debt) = send(&router, "GET", &format!("/api/v1/debts/{debt_id}"), None).await;
    assert_eq!(dec(&debt["remaining_amount"]), Decimal::from(100_000));
}

#[tokio::test]
async fn webhook_settles_debt() {
    let router = app();
    let id = create_customer(&router, "Bình", None).await;
    let (_, opened) = send(&router, "POST", "/api/v1/debts", Some(json!({ "customer_id": id, "amount": "150000" }))).await;
    let debt_id = opened["debt"]["id"].as_str().expect("debt id").to_string();

    let (status, body) = send(&router, "POST", "/api/v1/payment-webhook", Some(json!({
        "debt_id": debt_id, "amount": "150000", "reference": "FT24001"
    }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["debt"]["status"], "Đã thanh toán");
    assert_eq!(body["ledger_entry"]["employee_id"], "system");

    let (status, _) = send(&router, "POST", "/api/v1/payment-webhook", Some(json!({
        "debt_id": debt_id, "amount": "1", "reference": "FT24002"
    }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn search_is_accent_insensitive() {
    let router = app();
    create_customer(&router, "Trần Thị Bình", None).await;
    create_customer(&router, "Nguyễn Văn An", None).await;

    let (status, body) = send(&router, "GET", "/api/v1/customers?q=binh", None).await;
    assert_eq!(status, StatusCode::OK);
    let hits = body.as_array().expect("hits");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["customer"]["name"], "Trần Thị Bình");
    assert!(hits[0]["score"].as_f64().unwrap_or_default() > 0.1);
}

#[tokio::test]
async fn sale_records_invoice_debt_and_points() {
    let router = app();
    let id = create_customer(&router, "Trần Thị Bình", Some("Nông dân")).await;

    let (status, receipt) = send(&router, "POST", "/api/v1/sales", Some(json!({
        "customer_id": id, "order_total": "2000000", "paid_amount": "1450000", "payment_method": "bank_transfer"
    }))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(dec(&receipt["invoice"]["discount_amount"]), Decimal::from(50_000));
    assert_eq!(dec(&receipt["invoice"]["debt_amount"]), Decimal::from(500_000));
    assert_eq!(receipt["points_balance"], 1450);
    assert_eq!(receipt["ledger_entry"]["action"], "CREATE_DEBT");

    let (_, debts) = send(&router, "GET", &format!("/api/v1/customers/{id}/debts"), None).await;
    assert_eq!(debts.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn unknown_records_are_not_found() {
    let router = app();
    let (status, _) = send(&router, "GET", "/api/v1/debts/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&router, "POST", "/api/v1/discounts/quote", Some(json!({ "customer_id": "missing", "order_total": "10" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_input_is_rejected() {
    let router = app();
    let (status, _) = send(&router, "POST", "/api/v1/customers", Some(json!({ "name": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, "PUT", "/api/v1/banners", Some(json!([{ "title": "Tết", "image_url": "not a url" }]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn banners_are_replaced_in_position_order() {
    let router = app();
    let (status, saved) = send(&router, "PUT", "/api/v1/banners", Some(json!([
        { "title": "Tết", "image_url": "https://cdn.example.com/tet.jpg", "position": 4 },
        { "title": "Valentine", "image_url": "https://cdn.example.com/valentine.jpg", "position": 1 }
    ]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved[0]["title"], "Valentine");
    assert_eq!(saved[0]["position"], 0);
    assert_eq!(saved[1]["position"], 1);

    let (_, listed) = send(&router, "GET", "/api/v1/banners", None).await;
    assert_eq!(listed, saved);
}

#[tokio::test]
async fn extending_past_decimal_range_is_bad_request() {
    let router = app();
    let id = create_customer(&router, "Bình", None).await;
    let (status, opened) = send(&router, "POST", "/api/v1/debts", Some(json!({ "customer_id": id, "amount": Decimal::MAX.to_string() }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let debt_id = opened["debt"]["id"].as_str().expect("debt id").to_string();

    let (status, body) = send(&router, "POST", "/api/v1/debts", Some(json!({ "customer_id": id, "amount": "1", "extend_debt_id": debt_id }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some());

    let (_, debt) = send(&router, "GET", &format!("/api/v1/debts/{debt_id}"), None).await;
    assert_eq!(dec(&debt["remaining_amount"]), Decimal::MAX);
}
