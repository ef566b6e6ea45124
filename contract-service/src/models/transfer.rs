//! Ownership transfer requests.

use super::ClientIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// `Pending` moves once, to `Approved` or `Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Approved,
    Rejected,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TransferRequest {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub original_client_name: String,
    pub original_client_email: String,
    pub original_client_phone: String,
    pub original_client_address: String,
    pub new_client_name: String,
    pub new_client_email: String,
    pub new_client_phone: String,
    pub new_client_address: String,
    pub relationship: String,
    pub transfer_reason: String,
    pub request_status: TransferStatus,
    pub requested_by_id: Option<Uuid>,
    pub requested_by_name: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_notes: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl TransferRequest {
    pub fn is_pending(&self) -> bool {
        self.request_status == TransferStatus::Pending
    }

    pub fn new_client(&self) -> ClientIdentity {
        ClientIdentity {
            name: self.new_client_name.clone(),
            email: self.new_client_email.clone(),
            phone: self.new_client_phone.clone(),
            address: self.new_client_address.clone(),
        }
    }
}
