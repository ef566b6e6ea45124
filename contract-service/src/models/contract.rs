//! Contract model: one per approved reservation.

use crate::error::ContractError;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status. `Voided` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    Active,
    Voided,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Voided => "voided",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DownpaymentStatus {
    InProgress,
    Completed,
}

impl DownpaymentStatus {
    /// Status implied by an outstanding downpayment balance.
    pub fn for_balance(remaining_balance: Decimal) -> Self {
        if remaining_balance > Decimal::ZERO {
            Self::InProgress
        } else {
            Self::Completed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

/// How often installments fall due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentFrequency {
    Monthly,
    Weekly,
    Daily,
}

impl PaymentFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Weekly => "weekly",
            Self::Daily => "daily",
        }
    }
}

impl std::fmt::Display for PaymentFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentFrequency {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "weekly" => Ok(Self::Weekly),
            "daily" => Ok(Self::Daily),
            _ => Err(ContractError::InvalidFrequency(s.to_string())),
        }
    }
}

/// Name and contact details of whoever holds a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

/// Property-purchase contract.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contract {
    pub contract_id: Uuid,
    pub contract_number: String,
    pub reservation_id: Uuid,
    pub property_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub client_address: String,
    pub total_contract_price: Decimal,
    pub downpayment_total: Decimal,
    pub reservation_fee_paid: Decimal,
    pub remaining_downpayment: Decimal,
    pub remaining_balance: Decimal,
    pub bank_financing_amount: Decimal,
    pub payment_plan_months: i32,
    pub payment_frequency: PaymentFrequency,
    /// Month-equivalent installment kept for older consumers, whatever the frequency.
    pub monthly_installment: Decimal,
    pub allow_partial_payments: bool,
    pub contract_status: ContractStatus,
    pub downpayment_status: DownpaymentStatus,
    pub contract_signed_date: NaiveDate,
    pub first_installment_date: NaiveDate,
    pub final_installment_date: Option<NaiveDate>,
    pub voided_at: Option<DateTime<Utc>>,
    pub void_reason: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Contract {
    pub fn is_voided(&self) -> bool {
        self.contract_status == ContractStatus::Voided
    }

    pub fn client(&self) -> ClientIdentity {
        ClientIdentity {
            name: self.client_name.clone(),
            email: self.client_email.clone(),
            phone: self.client_phone.clone(),
            address: self.client_address.clone(),
        }
    }

    /// Set both balance fields (they are kept identical) and the derived status.
    pub fn set_remaining_balance(&mut self, remaining_balance: Decimal) {
        self.remaining_balance = remaining_balance;
        self.remaining_downpayment = remaining_balance;
        self.downpayment_status = DownpaymentStatus::for_balance(remaining_balance);
    }

    pub fn set_client(&mut self, client: &ClientIdentity) {
        self.client_name = client.name.clone();
        self.client_email = client.email.clone();
        self.client_phone = client.phone.clone();
        self.client_address = client.address.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frequency_case_insensitively() {
        assert_eq!(
            " Weekly ".parse::<PaymentFrequency>().unwrap(),
            PaymentFrequency::Weekly
        );
        assert!(matches!(
            "quarterly".parse::<PaymentFrequency>(),
            Err(ContractError::InvalidFrequency(f)) if f == "quarterly"
        ));
    }

    #[test]
    fn downpayment_status_follows_balance() {
        assert_eq!(
            DownpaymentStatus::for_balance(Decimal::new(1, 2)),
            DownpaymentStatus::InProgress
        );
        assert_eq!(
            DownpaymentStatus::for_balance(Decimal::ZERO),
            DownpaymentStatus::Completed
        );
    }
}
