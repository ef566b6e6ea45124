use crate::dtos::{RecordPaymentRequest, RevertPaymentRequest};
use crate::error::Result;
use crate::models::PaymentTransaction;
use crate::services::{PaymentOutcome, RevertOutcome};
use crate::startup::AppState;
use crate::utils::{IdPath, OptionalJson, ValidatedJson};
use axum::{extract::State, http::StatusCode, Json};
use service_core::response::ApiResponse;

pub async fn record_payment(
    State(state): State<AppState>,
    IdPath(schedule_id): IdPath,
    ValidatedJson(payload): ValidatedJson<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PaymentOutcome>>)> {
    let outcome = state
        .payments
        .record_payment(schedule_id, payload.into())
        .await?;
    let message = format!("Payment recorded, receipt {}", outcome.transaction.receipt_number);
    Ok(ApiResponse::ok(outcome, message).with_status(StatusCode::CREATED))
}

pub async fn list_transactions(
    State(state): State<AppState>,
    IdPath(schedule_id): IdPath,
) -> Result<ApiResponse<Vec<PaymentTransaction>>> {
    let transactions = state.payments.list_transactions(schedule_id).await?;
    let message = format!("{} transactions", transactions.len());
    Ok(ApiResponse::ok(transactions, message))
}

pub async fn revert_payment(
    State(state): State<AppState>,
    IdPath(schedule_id): IdPath,
    OptionalJson(payload): OptionalJson<RevertPaymentRequest>,
) -> Result<ApiResponse<RevertOutcome>> {
    let reverted_by = payload.and_then(|body| body.reverted_by_name);
    let outcome = state.payments.revert(schedule_id, reverted_by).await?;
    let message = format!(
        "Reverted {} across {} transaction(s)",
        outcome.paid_amount_reverted, outcome.transactions_reverted
    );
    Ok(ApiResponse::ok(outcome, message))
}
