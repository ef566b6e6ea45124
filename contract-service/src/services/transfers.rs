//! Ownership Transfer State Machine: `pending → approved | rejected`.

use crate::error::{ContractError, Result};
use crate::models::{Contract, TransferRequest, TransferStatus};
use crate::services::metrics::record_operation;
use crate::services::notifier::{dispatch, Notification, NotificationDispatcher, Priority, Recipient};
use crate::services::store::{ContractStore, TransferDecision};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_REJECTION_NOTE: &str = "No reason provided";

/// Proposed new holder of a contract.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateTransfer {
    pub new_client_name: Option<String>,
    #[validate(email(message = "new_client_email must be a valid email address"))]
    pub new_client_email: Option<String>,
    pub new_client_phone: Option<String>,
    pub new_client_address: Option<String>,
    pub relationship: Option<String>,
    pub transfer_reason: Option<String>,
    pub requested_by_id: Option<Uuid>,
    pub requested_by_name: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl CreateTransfer {
    /// Same request with every text field trimmed and blanks dropped.
    pub fn normalized(self) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            new_client_name: clean(self.new_client_name),
            new_client_email: clean(self.new_client_email),
            new_client_phone: clean(self.new_client_phone),
            new_client_address: clean(self.new_client_address),
            relationship: clean(self.relationship),
            transfer_reason: clean(self.transfer_reason),
            requested_by_id: self.requested_by_id,
            requested_by_name: clean(self.requested_by_name),
        }
    }

    /// Names of required fields that are absent or blank.
    pub fn missing_fields(&self) -> Vec<String> {
        [
            ("new_client_name", &self.new_client_name),
            ("new_client_email", &self.new_client_email),
            ("new_client_phone", &self.new_client_phone),
            ("new_client_address", &self.new_client_address),
            ("relationship", &self.relationship),
            ("transfer_reason", &self.transfer_reason),
            ("requested_by_name", &self.requested_by_name),
        ]
        .into_iter()
        .filter(|(_, value)| present(value).is_none())
        .map(|(name, _)| name.to_string())
        .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransferDecisionInput {
    pub approved: bool,
    pub approved_by_name: Option<String>,
    pub rejection_reason: Option<String>,
    pub approval_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOutcome {
    pub request: TransferRequest,
    /// The contract as rewritten by an approval.
    pub contract: Option<Contract>,
}

#[derive(Clone)]
pub struct TransferWorkflow {
    store: Arc<dyn ContractStore>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl TransferWorkflow {
    pub fn new(store: Arc<dyn ContractStore>, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self { store, notifier }
    }

    #[instrument(skip(self, input), fields(contract_id = %contract_id))]
    pub async fn create(&self, contract_id: Uuid, input: CreateTransfer) -> Result<TransferRequest> {
        let result = self.create_inner(contract_id, input).await;
        record_operation("create_transfer", &result);
        result
    }

    async fn create_inner(&self, contract_id: Uuid, input: CreateTransfer) -> Result<TransferRequest> {
        let input = input.normalized();
        let missing = input.missing_fields();
        if !missing.is_empty() {
            return Err(ContractError::MissingFields(missing));
        }
        input.validate()?;

        let contract = self
            .store
            .find_contract(contract_id)
            .await?
            .ok_or(ContractError::ContractNotFound(contract_id))?;
        if contract.is_voided() {
            return Err(ContractError::ContractVoided(contract_id));
        }
        if self.store.find_pending_transfer(contract_id).await?.is_some() {
            return Err(ContractError::TransferAlreadyPending(contract_id));
        }

        let trimmed = |value: &Option<String>| present(value).unwrap_or_default().to_string();
        let request = TransferRequest {
            id: Uuid::new_v4(),
            contract_id,
            original_client_name: contract.client_name.clone(),
            original_client_email: contract.client_email.clone(),
            original_client_phone: contract.client_phone.clone(),
            original_client_address: contract.client_address.clone(),
            new_client_name: trimmed(&input.new_client_name),
            new_client_email: trimmed(&input.new_client_email),
            new_client_phone: trimmed(&input.new_client_phone),
            new_client_address: trimmed(&input.new_client_address),
            relationship: trimmed(&input.relationship),
            transfer_reason: trimmed(&input.transfer_reason),
            request_status: TransferStatus::Pending,
            requested_by_id: input.requested_by_id,
            requested_by_name: trimmed(&input.requested_by_name),
            approved_by: None,
            approved_at: None,
            approval_notes: None,
            created_utc: Utc::now(),
        };

        if !self.store.insert_transfer(&request).await? {
            return Err(ContractError::TransferAlreadyPending(contract_id));
        }

        info!(request_id = %request.id, "Transfer request created");

        dispatch(
            self.notifier.as_ref(),
            Notification {
                recipient: Recipient::role("admin"),
                title: "Contract transfer requested".to_string(),
                message: format!(
                    "{} requested transfer of contract {} from {} to {}.",
                    request.requested_by_name,
                    contract.contract_number,
                    request.original_client_name,
                    request.new_client_name
                ),
                priority: Priority::Normal,
                action_url: Some(format!("/transfers/{}", request.id)),
                data: json!({
                    "request_id": request.id,
                    "contract_id": contract_id,
                    "relationship": request.relationship,
                }),
            },
        )
        .await;

        Ok(request)
    }

    #[instrument(skip(self, input), fields(request_id = %request_id, approved = input.approved))]
    pub async fn decide(
        &self,
        request_id: Uuid,
        input: TransferDecisionInput,
    ) -> Result<DecisionOutcome> {
        let result = self.decide_inner(request_id, input).await;
        record_operation("decide_transfer", &result);
        result
    }

    async fn decide_inner(
        &self,
        request_id: Uuid,
        input: TransferDecisionInput,
    ) -> Result<DecisionOutcome> {
        let approved_by = present(&input.approved_by_name)
            .ok_or_else(|| ContractError::MissingFields(vec!["approved_by_name".to_string()]))?
            .to_string();

        let request = self
            .store
            .find_transfer(request_id)
            .await?
            .ok_or(ContractError::TransferRequestNotFound(request_id))?;
        if !request.is_pending() {
            return Err(ContractError::TransferAlreadyDecided(request_id));
        }

        let decision = if input.approved {
            let contract = self
                .store
                .find_contract(request.contract_id)
                .await?
                .ok_or(ContractError::ContractNotFound(request.contract_id))?;
            if contract.is_voided() {
                return Err(ContractError::ContractVoided(contract.contract_id));
            }
            TransferDecision {
                request_id,
                contract_id: request.contract_id,
                new_client: Some(request.new_client()),
                approved_by,
                approved_at: Utc::now(),
                approval_notes: present(&input.approval_notes)
                    .unwrap_or("Transfer approved")
                    .to_string(),
            }
        } else {
            TransferDecision {
                request_id,
                contract_id: request.contract_id,
                new_client: None,
                approved_by,
                approved_at: Utc::now(),
                approval_notes: present(&input.rejection_reason)
                    .unwrap_or(DEFAULT_REJECTION_NOTE)
                    .to_string(),
            }
        };

        let decided = self.store.apply_transfer_decision(&decision).await?;
        let contract = if decision.is_approval() {
            self.store.find_contract(decided.contract_id).await?
        } else {
            None
        };

        info!(
            contract_id = %decided.contract_id,
            status = decided.request_status.as_str(),
            "Transfer request decided"
        );

        let recipient = decided
            .requested_by_id
            .map(Recipient::User)
            .unwrap_or_else(|| Recipient::role("customer_service"));
        let verdict = decided.request_status.as_str();
        dispatch(
            self.notifier.as_ref(),
            Notification {
                recipient,
                title: format!("Transfer request {}", verdict),
                message: format!(
                    "The transfer of contract to {} was {} by {}.",
                    decided.new_client_name, verdict, decision.approved_by
                ),
                priority: Priority::Normal,
                action_url: Some(format!("/transfers/{}", decided.id)),
                data: json!({
                    "request_id": decided.id,
                    "contract_id": decided.contract_id,
                    "request_status": verdict,
                    "approval_notes": decided.approval_notes,
                }),
            },
        )
        .await;

        Ok(DecisionOutcome {
            request: decided,
            contract,
        })
    }

    pub async fn get(&self, request_id: Uuid) -> Result<TransferRequest> {
        self.store
            .find_transfer(request_id)
            .await?
            .ok_or(ContractError::TransferRequestNotFound(request_id))
    }

    pub async fn list(&self, contract_id: Uuid) -> Result<Vec<TransferRequest>> {
        self.store
            .find_contract(contract_id)
            .await?
            .ok_or(ContractError::ContractNotFound(contract_id))?;
        self.store.list_transfers(contract_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> CreateTransfer {
        CreateTransfer {
            new_client_name: Some("Ben Cruz".to_string()),
            new_client_email: Some("ben@example.com".to_string()),
            new_client_phone: Some("555-0101".to_string()),
            new_client_address: Some("Lot 4, Block 2".to_string()),
            relationship: Some("Sibling".to_string()),
            transfer_reason: Some("Relocating abroad".to_string()),
            requested_by_id: None,
            requested_by_name: Some("Front Desk".to_string()),
        }
    }

    #[test]
    fn complete_request_has_no_missing_fields() {
        assert!(complete().missing_fields().is_empty());
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn blank_fields_count_as_missing() {
        let input = CreateTransfer {
            relationship: Some("   ".to_string()),
            transfer_reason: None,
            ..complete()
        };
        assert_eq!(input.missing_fields(), vec!["relationship", "transfer_reason"]);
    }

    #[test]
    fn malformed_email_fails_validation() {
        let input = CreateTransfer {
            new_client_email: Some("not-an-email".to_string()),
            ..complete()
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn padded_email_is_valid_once_normalized() {
        let input = CreateTransfer {
            new_client_email: Some("  ben@example.com ".to_string()),
            relationship: Some("   ".to_string()),
            ..complete()
        }
        .normalized();
        assert_eq!(input.new_client_email.as_deref(), Some("ben@example.com"));
        assert!(input.relationship.is_none());
        assert!(input.validate().is_ok());
    }
}
