//! HTTP surface for the point of sale and the storefront.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use validator::Validate;

use crate::domain::aggregates::{Banner, Customer, Debt};
use crate::domain::value_objects::{EmployeeRef, PaymentMethod};
use crate::ledger::DebtHistoryEntry;
use crate::points::PointsQuote;
use crate::service::{
    BannerInput, CustomerMatch, DebtHistoryView, OpenDebtRequest, PaymentReceipt, PaymentRequest, SaleReceipt, SaleRequest, ShopService,
};
use crate::tiers::DiscountOutcome;
use crate::ShopError;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ShopService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "flower-shop"})) }))
        .route("/api/v1/customers", get(search_customers).post(create_customer))
        .route("/api/v1/customers/:id", get(get_customer))
        .route("/api/v1/customers/:id/tier", put(set_customer_tier))
        .route("/api/v1/customers/:id/debts", get(list_customer_debts))
        .route("/api/v1/customers/:id/debt-history", get(get_debt_history))
        .route("/api/v1/customers/:id/debt-history/stream", get(stream_debt_history))
        .route("/api/v1/debts", post(open_debt))
        .route("/api/v1/debts/:id", get(get_debt))
        .route("/api/v1/debts/:id/payments", post(record_payment))
        .route("/api/v1/discounts/quote", post(quote_discount))
        .route("/api/v1/points/quote", post(quote_points))
        .route("/api/v1/sales", post(finalize_sale))
        .route("/api/v1/payment-webhook", post(payment_webhook))
        .route("/api/v1/banners", get(list_banners).put(replace_banners))
        .with_state(state)
}

impl IntoResponse for ShopError {
    fn into_response(self) -> Response {
        let status = match &self {
            ShopError::InvalidAmount { .. } | ShopError::Validation(_) => StatusCode::BAD_REQUEST,
            ShopError::DebtNotFound | ShopError::CustomerNotFound => StatusCode::NOT_FOUND,
            ShopError::Conflict { .. } => StatusCode::CONFLICT,
            ShopError::Overpayment { .. } | ShopError::DebtSettled => StatusCode::UNPROCESSABLE_ENTITY,
            ShopError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn employee_or_system(employee: Option<EmployeeRef>) -> EmployeeRef {
    employee.unwrap_or_else(EmployeeRef::system)
}

fn default_true() -> bool { true }

// =============================================================================
// Customers
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchParams { pub q: Option<String> }

async fn search_customers(State(s): State<AppState>, Query(p): Query<SearchParams>) -> Result<Json<Vec<CustomerMatch>>, ShopError> {
    Ok(Json(s.service.search_customers(p.q.as_deref().unwrap_or("")).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[validate(length(min = 8, max = 20))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 40))]
    pub tier: Option<String>,
}

async fn create_customer(State(s): State<AppState>, Json(r): Json<CreateCustomerRequest>) -> Result<(StatusCode, Json<Customer>), ShopError> {
    r.validate()?;
    let customer = s.service.register_customer(&r.name, r.phone, r.tier).await?;
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn get_customer(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Customer>, ShopError> {
    Ok(Json(s.service.get_customer(&id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetTierRequest {
    #[validate(length(min = 1, max = 40))]
    pub tier: Option<String>,
}

async fn set_customer_tier(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<SetTierRequest>) -> Result<Json<Customer>, ShopError> {
    r.validate()?;
    Ok(Json(s.service.set_customer_tier(&id, r.tier).await?))
}

async fn list_customer_debts(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<Debt>>, ShopError> {
    Ok(Json(s.service.debts_for_customer(&id).await?))
}

async fn get_debt_history(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<DebtHistoryView>, ShopError> {
    Ok(Json(s.service.debt_history(&id).await?))
}

/// Pushes each new ledger entry for the customer as a `debt_history` event.
async fn stream_debt_history(State(s): State<AppState>, Path(id): Path<String>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = s.service.subscribe_history(&id).into_stream().map(|entry| {
        Ok(Event::default()
            .event("debt_history")
            .json_data(&entry)
            .unwrap_or_else(|_| Event::default().comment("unencodable entry")))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// =============================================================================
// Debts
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct OpenDebtBody {
    #[validate(length(min = 1))]
    pub customer_id: String,
    pub amount: Decimal,
    pub due_date: Option<DateTime<Utc>>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    pub invoice_id: Option<String>,
    pub extend_debt_id: Option<String>,
    pub employee: Option<EmployeeRef>,
}

#[derive(Debug, Serialize)]
pub struct OpenDebtResponse {
    pub debt: Debt,
    pub ledger_entry: DebtHistoryEntry,
}

async fn open_debt(State(s): State<AppState>, Json(r): Json<OpenDebtBody>) -> Result<(StatusCode, Json<OpenDebtResponse>), ShopError> {
    r.validate()?;
    let (debt, ledger_entry) = s.service.open_debt(OpenDebtRequest {
        customer_id: r.customer_id, amount: r.amount, due_date: r.due_date, notes: r.notes,
        invoice_id: r.invoice_id, extend_debt_id: r.extend_debt_id, employee: employee_or_system(r.employee),
    }).await?;
    Ok((StatusCode::CREATED, Json(OpenDebtResponse { debt, ledger_entry })))
}

async fn get_debt(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Debt>, ShopError> {
    Ok(Json(s.service.get_debt(&id).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentBody {
    pub amount: Decimal,
    #[serde(default)]
    pub method: PaymentMethod,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    pub employee: Option<EmployeeRef>,
}

async fn record_payment(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<PaymentBody>) -> Result<Json<PaymentReceipt>, ShopError> {
    r.validate()?;
    let receipt = s.service.record_payment(PaymentRequest {
        debt_id: id, amount: r.amount, method: r.method, notes: r.notes, employee: employee_or_system(r.employee),
    }).await?;
    Ok(Json(receipt))
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentWebhook {
    #[validate(length(min = 1))]
    pub debt_id: String,
    pub amount: Decimal,
    #[serde(default = "default_webhook_method")]
    pub method: PaymentMethod,
    #[validate(length(min = 1, max = 120))]
    pub reference: String,
}

fn default_webhook_method() -> PaymentMethod { PaymentMethod::BankTransfer }

/// Payment notifications from the bank or wallet gateway, booked by the system employee.
async fn payment_webhook(State(s): State<AppState>, Json(r): Json<PaymentWebhook>) -> Result<Json<PaymentReceipt>, ShopError> {
    r.validate()?;
    tracing::info!(debt_id = %r.debt_id, amount = %r.amount, reference = %r.reference, "payment webhook received");
    let receipt = s.service.record_payment(PaymentRequest {
        debt_id: r.debt_id, amount: r.amount, method: r.method,
        notes: Some(format!("Thanh toán tự động, mã giao dịch {}", r.reference)), employee: EmployeeRef::system(),
    }).await?;
    Ok(Json(receipt))
}

// =============================================================================
// Quotes and sales
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct DiscountQuoteBody {
    #[validate(length(min = 1))]
    pub customer_id: String,
    pub order_total: Decimal,
}

async fn quote_discount(State(s): State<AppState>, Json(r): Json<DiscountQuoteBody>) -> Result<Json<DiscountOutcome>, ShopError> {
    r.validate()?;
    Ok(Json(s.service.quote_discount(&r.customer_id, r.order_total, Utc::now()).await?))
}

#[derive(Debug, Deserialize)]
pub struct PointsQuoteBody {
    pub paid_amount: Decimal,
    pub tier: Option<String>,
    /// Takes the tier from this customer when set.
    pub customer_id: Option<String>,
}

async fn quote_points(State(s): State<AppState>, Json(r): Json<PointsQuoteBody>) -> Result<Json<PointsQuote>, ShopError> {
    let tier = match &r.customer_id {
        Some(id) => s.service.get_customer(id).await?.tier_label().map(str::to_string),
        None => r.tier,
    };
    Ok(Json(s.service.quote_points(r.paid_amount, tier.as_deref())?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SaleBody {
    pub customer_id: Option<String>,
    pub order_total: Decimal,
    pub paid_amount: Decimal,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default = "default_true")]
    pub apply_tier_discount: bool,
    pub due_date: Option<DateTime<Utc>>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    pub employee: Option<EmployeeRef>,
}

async fn finalize_sale(State(s): State<AppState>, Json(r): Json<SaleBody>) -> Result<(StatusCode, Json<SaleReceipt>), ShopError> {
    r.validate()?;
    let receipt = s.service.finalize_sale(SaleRequest {
        customer_id: r.customer_id, order_total: r.order_total, paid_amount: r.paid_amount,
        payment_method: r.payment_method, apply_tier_discount: r.apply_tier_discount, due_date: r.due_date,
        notes: r.notes, employee: employee_or_system(r.employee),
    }).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

// =============================================================================
// Banners
// =============================================================================

async fn list_banners(State(s): State<AppState>) -> Result<Json<Vec<Banner>>, ShopError> {
    Ok(Json(s.service.list_banners().await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct BannerBody {
    pub id: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(url)]
    pub image_url: String,
    pub link: Option<String>,
    #[serde(default)]
    pub position: u32,
    #[serde(default = "default_true")]
    pub active: bool,
}

async fn replace_banners(State(s): State<AppState>, Json(body): Json<Vec<BannerBody>>) -> Result<Json<Vec<Banner>>, ShopError> {
    for banner in &body {
        banner.validate()?;
    }
    let inputs = body.into_iter().map(|b| BannerInput {
        id: b.id, title: b.title, image_url: b.image_url, link: b.link, position: b.position, active: b.active,
    }).collect();
    Ok(Json(s.service.replace_banners(inputs).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_conflict_maps_to_409_with_error_body() {
        let response = ShopError::Conflict { entity: "debt", id: "D1".to_string(), expected: 3 }.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let bytes = to_bytes(response.into_body(), 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].as_str().unwrap().contains("D1"));
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ShopError::InvalidAmount { field: "amount", value: Decimal::ZERO }, StatusCode::BAD_REQUEST),
            (ShopError::Validation("name".to_string()), StatusCode::BAD_REQUEST),
            (ShopError::DebtNotFound, StatusCode::NOT_FOUND),
            (ShopError::CustomerNotFound, StatusCode::NOT_FOUND),
            (ShopError::Conflict { entity: "customer", id: "C1".to_string(), expected: 0 }, StatusCode::CONFLICT),
            (ShopError::Overpayment { attempted: Decimal::TWO, remaining: Decimal::ONE }, StatusCode::UNPROCESSABLE_ENTITY),
            (ShopError::DebtSettled, StatusCode::UNPROCESSABLE_ENTITY),
            (ShopError::Storage("down".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
