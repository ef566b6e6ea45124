//! Domain errors for contract-service.
//!
//! Every variant maps onto one [`ErrorKind`]; the HTTP layer renders them
//! into the shared failure envelope with a stable `error` code.

use crate::models::Contract;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use service_core::response::ErrorBody;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T, E = ContractError> = std::result::Result<T, E>;

/// Error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    PersistenceFailure,
    /// A cleanup step failed after the primary transition committed.
    PartialFailure,
}

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Reservation {0} not found or not approved")]
    ReservationNotFound(Uuid),

    #[error("Contract {0} not found")]
    ContractNotFound(Uuid),

    #[error("Payment schedule {0} not found")]
    ScheduleNotFound(Uuid),

    #[error("Transfer request {0} not found")]
    TransferRequestNotFound(Uuid),

    #[error("Contract {} already exists for reservation {}", .0.contract_number, .0.reservation_id)]
    ContractAlreadyExists(Box<Contract>),

    #[error("A transfer request is already pending for contract {0}")]
    TransferAlreadyPending(Uuid),

    #[error("Transfer request {0} has already been decided")]
    TransferAlreadyDecided(Uuid),

    #[error("Contract {0} is already voided")]
    ContractAlreadyVoided(Uuid),

    #[error("Contract {0} is voided")]
    ContractVoided(Uuid),

    #[error("Payment schedule {0} changed while the operation was in progress; retry")]
    ConcurrentUpdate(Uuid),

    #[error("Unsupported payment frequency '{0}' (expected monthly, weekly or daily)")]
    InvalidFrequency(String),

    #[error("Payment plan must be between 1 and 60 months, got {0}")]
    InvalidPlanRange(i32),

    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("Invalid payment amount: {0}")]
    InvalidPaymentAmount(String),

    #[error("Payment schedule {0} has no recorded payment to revert")]
    NothingToRevert(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to void contract {0}: {1}")]
    VoidUpdateFailed(Uuid, String),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] anyhow::Error),
}

impl ContractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ReservationNotFound(_)
            | Self::ContractNotFound(_)
            | Self::ScheduleNotFound(_)
            | Self::TransferRequestNotFound(_) => ErrorKind::NotFound,
            Self::ContractAlreadyExists(_)
            | Self::TransferAlreadyPending(_)
            | Self::TransferAlreadyDecided(_)
            | Self::ContractAlreadyVoided(_)
            | Self::ContractVoided(_)
            | Self::ConcurrentUpdate(_) => ErrorKind::Conflict,
            Self::InvalidFrequency(_)
            | Self::InvalidPlanRange(_)
            | Self::MissingFields(_)
            | Self::InvalidPaymentAmount(_)
            | Self::NothingToRevert(_)
            | Self::Validation(_) => ErrorKind::Validation,
            Self::VoidUpdateFailed(..) | Self::Persistence(_) => ErrorKind::PersistenceFailure,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ReservationNotFound(_) => "RESERVATION_NOT_FOUND",
            Self::ContractNotFound(_) => "CONTRACT_NOT_FOUND",
            Self::ScheduleNotFound(_) => "SCHEDULE_NOT_FOUND",
            Self::TransferRequestNotFound(_) => "TRANSFER_REQUEST_NOT_FOUND",
            Self::ContractAlreadyExists(_) => "CONTRACT_ALREADY_EXISTS",
            Self::TransferAlreadyPending(_) => "TRANSFER_ALREADY_PENDING",
            Self::TransferAlreadyDecided(_) => "TRANSFER_ALREADY_DECIDED",
            Self::ContractAlreadyVoided(_) => "CONTRACT_ALREADY_VOIDED",
            Self::ContractVoided(_) => "CONTRACT_VOIDED",
            Self::ConcurrentUpdate(_) => "CONCURRENT_UPDATE",
            Self::InvalidFrequency(_) => "INVALID_FREQUENCY",
            Self::InvalidPlanRange(_) => "INVALID_PLAN_RANGE",
            Self::MissingFields(_) => "MISSING_FIELDS",
            Self::InvalidPaymentAmount(_) => "INVALID_PAYMENT_AMOUNT",
            Self::NothingToRevert(_) => "NOTHING_TO_REVERT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::VoidUpdateFailed(..) => "VOID_UPDATE_FAILED",
            Self::Persistence(_) => "PERSISTENCE_FAILURE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::PersistenceFailure | ErrorKind::PartialFailure => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<validator::ValidationErrors> for ContractError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<JsonRejection> for ContractError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ContractError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl IntoResponse for ContractError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Persistence(err) => {
                tracing::error!(error = ?err, "Persistence failure");
                "A storage error occurred; the operation was not applied".to_string()
            }
            other => other.to_string(),
        };

        let mut body = ErrorBody::new(self.code(), message);
        if let Self::ContractAlreadyExists(existing) = &self {
            body = body.with_data(json!({
                "contract_id": existing.contract_id,
                "contract_number": existing.contract_number,
            }));
        }

        body.into_response_with(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_taxonomy() {
        let id = Uuid::new_v4();
        assert_eq!(ContractError::ContractNotFound(id).kind(), ErrorKind::NotFound);
        assert_eq!(ContractError::TransferAlreadyPending(id).kind(), ErrorKind::Conflict);
        assert_eq!(ContractError::InvalidPlanRange(61).kind(), ErrorKind::Validation);
        assert_eq!(
            ContractError::Persistence(anyhow::anyhow!("boom")).kind(),
            ErrorKind::PersistenceFailure
        );
    }

    #[test]
    fn missing_fields_message_lists_fields() {
        let err = ContractError::MissingFields(vec!["relationship".into(), "transfer_reason".into()]);
        assert_eq!(
            err.to_string(),
            "Missing required fields: relationship, transfer_reason"
        );
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
