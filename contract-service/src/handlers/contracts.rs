use crate::dtos::{CreateContractRequest, VoidContractRequest};
use crate::error::Result;
use crate::models::PaymentSchedule;
use crate::services::{ContractWithSchedules, VoidOutcome};
use crate::startup::AppState;
use crate::utils::{IdPath, OptionalJson, ValidatedJson};
use axum::{extract::State, http::StatusCode, Json};
use service_core::response::ApiResponse;

pub async fn create_contract(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateContractRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ContractWithSchedules>>)> {
    let created = state.contracts.create(payload.into_input()?).await?;
    let message = format!(
        "Contract {} created with {} installments",
        created.contract.contract_number,
        created.schedules.len()
    );
    Ok(ApiResponse::ok(created, message).with_status(StatusCode::CREATED))
}

pub async fn get_contract(
    State(state): State<AppState>,
    IdPath(contract_id): IdPath,
) -> Result<ApiResponse<ContractWithSchedules>> {
    let contract = state.contracts.get(contract_id).await?;
    Ok(ApiResponse::ok(contract, "Contract retrieved"))
}

pub async fn list_schedules(
    State(state): State<AppState>,
    IdPath(contract_id): IdPath,
) -> Result<ApiResponse<Vec<PaymentSchedule>>> {
    let schedules = state.payments.list_schedules(contract_id).await?;
    let message = format!("{} installments", schedules.len());
    Ok(ApiResponse::ok(schedules, message))
}

pub async fn void_contract(
    State(state): State<AppState>,
    IdPath(contract_id): IdPath,
    OptionalJson(payload): OptionalJson<VoidContractRequest>,
) -> Result<ApiResponse<VoidOutcome>> {
    let reason = payload.and_then(|body| body.reason);
    let outcome = state.voids.void(contract_id, reason).await?;
    let message = if outcome.cleanup_warnings.is_empty() {
        "Contract voided".to_string()
    } else {
        format!(
            "Contract voided with {} cleanup warning(s)",
            outcome.cleanup_warnings.len()
        )
    };
    Ok(ApiResponse::ok(outcome, message))
}
