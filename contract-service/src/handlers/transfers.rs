use crate::dtos::{CreateTransferRequest, TransferDecisionRequest};
use crate::error::Result;
use crate::models::TransferRequest;
use crate::services::DecisionOutcome;
use crate::startup::AppState;
use crate::utils::{AppJson, IdPath};
use axum::{extract::State, http::StatusCode, Json};
use service_core::response::ApiResponse;

pub async fn create_transfer(
    State(state): State<AppState>,
    IdPath(contract_id): IdPath,
    AppJson(payload): AppJson<CreateTransferRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TransferRequest>>)> {
    let request = state.transfers.create(contract_id, payload).await?;
    Ok(ApiResponse::ok(request, "Transfer request submitted").with_status(StatusCode::CREATED))
}

pub async fn list_transfers(
    State(state): State<AppState>,
    IdPath(contract_id): IdPath,
) -> Result<ApiResponse<Vec<TransferRequest>>> {
    let requests = state.transfers.list(contract_id).await?;
    let message = format!("{} transfer requests", requests.len());
    Ok(ApiResponse::ok(requests, message))
}

pub async fn get_transfer(
    State(state): State<AppState>,
    IdPath(request_id): IdPath,
) -> Result<ApiResponse<TransferRequest>> {
    let request = state.transfers.get(request_id).await?;
    Ok(ApiResponse::ok(request, "Transfer request retrieved"))
}

pub async fn decide_transfer(
    State(state): State<AppState>,
    IdPath(request_id): IdPath,
    AppJson(payload): AppJson<TransferDecisionRequest>,
) -> Result<ApiResponse<DecisionOutcome>> {
    let outcome = state.transfers.decide(request_id, payload).await?;
    let message = format!("Transfer request {}", outcome.request.request_status.as_str());
    Ok(ApiResponse::ok(outcome, message))
}
