//! The six thin HTTP verbs named in §6. Each handler does argument
//! extraction and response shaping only; every decision lives in
//! `LifecycleManager`/`BillingEngine`.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Json, Router};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use billforge_core::{CreateOutcome, Error};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubscriptionRequest {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub payment_method_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub promo_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelSubscriptionRequest {
    #[serde(default)]
    pub immediate: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpgradeSubscriptionRequest {
    pub new_plan_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct GetInvoiceQuery {
    pub transaction_id: Option<Uuid>,
}

async fn create_subscription(
    State(state): State<AppState>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<Json<CreateOutcome>, ApiError> {
    request.validate().map_err(|e| ApiError(Error::invalid_input(e.to_string())))?;
    let outcome = state
        .lifecycle
        .create(request.user_id, request.plan_id, request.payment_method_id, request.promo_code.as_deref())
        .await?;
    Ok(Json(outcome))
}

async fn cancel_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
    Json(request): Json<CancelSubscriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.lifecycle.cancel(subscription_id, request.immediate).await?;
    Ok(Json(summary))
}

async fn upgrade_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
    Json(request): Json<UpgradeSubscriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.lifecycle.upgrade(subscription_id, request.new_plan_id).await?;
    Ok(Json(summary))
}

async fn renew_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state.lifecycle.renew(subscription_id).await?;
    Ok(Json(summary))
}

async fn get_invoice(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
    Query(query): Query<GetInvoiceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rendered = state.billing.generate_invoice(subscription_id, query.transaction_id).await?;
    Ok(([(header::CONTENT_TYPE, "text/html; charset=utf-8")], rendered))
}

/// Fires the billing pass in the background and replies immediately (§6:
/// "202-style fire-and-forget") rather than blocking on the run's result.
async fn admin_process_billing(State(state): State<AppState>) -> impl IntoResponse {
    let started_at = state.billing.clock().now();
    let billing = state.billing.clone();
    tokio::spawn(async move {
        if let Err(err) = billing.process_recurring_payments().await {
            tracing::error!(error = %err, "admin-triggered billing pass failed");
        }
    });
    (StatusCode::ACCEPTED, Json(json!({ "started_at": started_at })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/subscriptions", post(create_subscription))
        .route("/subscriptions/:id/cancel", post(cancel_subscription))
        .route("/subscriptions/:id/upgrade", post(upgrade_subscription))
        .route("/subscriptions/:id/renew", post(renew_subscription))
        .route("/subscriptions/:id/invoice", get(get_invoice))
        .route("/admin/billing/process", post(admin_process_billing))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_accepts_missing_promo_code() {
        let request = CreateSubscriptionRequest {
            user_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            payment_method_id: Uuid::new_v4(),
            promo_code: None,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn create_request_rejects_empty_promo_code() {
        let request = CreateSubscriptionRequest {
            user_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            payment_method_id: Uuid::new_v4(),
            promo_code: Some(String::new()),
        };
        assert!(request.validate().is_err());
    }
}
