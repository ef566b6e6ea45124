//! Installment row of a contract's amortization schedule.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
}

impl PaymentStatus {
    /// Status implied by how much of a scheduled amount is still owed.
    pub fn for_amounts(paid_amount: Decimal, remaining_amount: Decimal) -> Self {
        if remaining_amount <= Decimal::ZERO {
            Self::Paid
        } else if paid_amount > Decimal::ZERO {
            Self::Partial
        } else {
            Self::Pending
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Paid => "paid",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentSchedule {
    pub schedule_id: Uuid,
    pub contract_id: Uuid,
    pub installment_number: i32,
    pub installment_description: String,
    pub scheduled_amount: Decimal,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub penalty_amount: Decimal,
    pub due_date: NaiveDate,
    /// Advisory end of the grace window; nothing gates on it.
    pub grace_period_end: Option<NaiveDate>,
    pub payment_status: PaymentStatus,
    pub is_overdue: bool,
    pub days_overdue: i32,
    pub paid_date: Option<DateTime<Utc>>,
    pub processed_by_name: Option<String>,
}

impl PaymentSchedule {
    /// A fresh, unpaid installment.
    pub fn pending(
        contract_id: Uuid,
        installment_number: i32,
        installment_count: i32,
        scheduled_amount: Decimal,
        due_date: NaiveDate,
        grace_period_end: Option<NaiveDate>,
    ) -> Self {
        Self {
            schedule_id: Uuid::new_v4(),
            contract_id,
            installment_number,
            installment_description: format!(
                "Installment {} of {}",
                installment_number, installment_count
            ),
            scheduled_amount,
            paid_amount: Decimal::ZERO,
            remaining_amount: scheduled_amount,
            penalty_amount: Decimal::ZERO,
            due_date,
            grace_period_end,
            payment_status: PaymentStatus::Pending,
            is_overdue: false,
            days_overdue: 0,
            paid_date: None,
            processed_by_name: None,
        }
    }

    /// Whether any payment is recorded against this row.
    pub fn has_payment(&self) -> bool {
        self.payment_status == PaymentStatus::Paid || self.paid_amount > Decimal::ZERO
    }

    /// Back to the freshly generated state.
    pub fn reset(&mut self) {
        self.payment_status = PaymentStatus::Pending;
        self.paid_amount = Decimal::ZERO;
        self.remaining_amount = self.scheduled_amount;
        self.penalty_amount = Decimal::ZERO;
        self.paid_date = None;
    }
}
