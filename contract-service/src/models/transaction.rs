//! Append-only payment events against a schedule row.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Reverted,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Reverted => "reverted",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub transaction_id: Uuid,
    pub schedule_id: Uuid,
    pub amount: Decimal,
    pub transaction_date: DateTime<Utc>,
    pub transaction_status: TransactionStatus,
    pub receipt_number: String,
    pub notes: Option<String>,
}

impl PaymentTransaction {
    /// Flip to reverted, appending the audit line to any existing notes.
    pub fn mark_reverted(&mut self, audit_note: &str) {
        self.transaction_status = TransactionStatus::Reverted;
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, audit_note),
            _ => audit_note.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_matches_stored_value() {
        for status in [TransactionStatus::Completed, TransactionStatus::Reverted] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, status.as_str());
        }
    }

    #[test]
    fn mark_reverted_appends_audit_line() {
        let mut tx = PaymentTransaction {
            transaction_id: Uuid::new_v4(),
            schedule_id: Uuid::new_v4(),
            amount: Decimal::from(7_500),
            transaction_date: Utc::now(),
            transaction_status: TransactionStatus::Completed,
            receipt_number: "OR-20240101-ABCDEF12".to_string(),
            notes: Some("cash".to_string()),
        };
        tx.mark_reverted("reverted by Auditor");
        assert_eq!(tx.transaction_status.as_str(), "reverted");
        assert_eq!(tx.notes.as_deref(), Some("cash\nreverted by Auditor"));
    }
}
