//! Payment Transaction & Revert Engine.
//!
//! Recording a payment increments one schedule row; reverting resets it. In
//! both directions the contract's downpayment balance is re-derived from the
//! paid amounts of all its rows, and the three writes (row, transactions,
//! contract) land in one atomic store call.

use crate::error::{ContractError, Result};
use crate::models::{
    Contract, DownpaymentStatus, PaymentSchedule, PaymentStatus, PaymentTransaction,
    TransactionStatus,
};
use crate::services::metrics::record_operation;
use crate::services::notifier::{dispatch, Notification, NotificationDispatcher, Priority, Recipient};
use crate::services::store::{ContractBalance, ContractStore};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// A payment against one installment.
#[derive(Debug, Clone, Default)]
pub struct RecordPayment {
    pub amount: Decimal,
    pub penalty_amount: Option<Decimal>,
    pub receipt_number: Option<String>,
    pub notes: Option<String>,
    pub processed_by_name: Option<String>,
}

/// Writes needed to record a payment.
#[derive(Debug, Clone)]
pub struct PaymentPosting {
    pub contract_id: Uuid,
    /// `paid_amount` observed when the posting was computed.
    pub expected_paid_amount: Decimal,
    /// The row as it must look afterwards.
    pub schedule: PaymentSchedule,
    pub transaction: PaymentTransaction,
}

impl PaymentPosting {
    pub fn compute(
        contract: &Contract,
        schedule: &PaymentSchedule,
        input: &RecordPayment,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if contract.is_voided() {
            return Err(ContractError::ContractVoided(contract.contract_id));
        }
        if input.amount <= Decimal::ZERO {
            return Err(ContractError::InvalidPaymentAmount(
                "amount must be greater than zero".to_string(),
            ));
        }
        if input.amount.round_dp(2) != input.amount {
            return Err(ContractError::InvalidPaymentAmount(
                "amount cannot have more than two decimal places".to_string(),
            ));
        }
        if input.amount > schedule.remaining_amount {
            return Err(ContractError::InvalidPaymentAmount(format!(
                "amount {} exceeds the remaining {} on installment {}",
                input.amount, schedule.remaining_amount, schedule.installment_number
            )));
        }
        let penalty = input.penalty_amount.unwrap_or(Decimal::ZERO);
        if penalty < Decimal::ZERO {
            return Err(ContractError::InvalidPaymentAmount(
                "penalty cannot be negative".to_string(),
            ));
        }

        let mut updated = schedule.clone();
        updated.paid_amount += input.amount;
        updated.remaining_amount = updated.scheduled_amount - updated.paid_amount;
        updated.penalty_amount += penalty;
        updated.payment_status =
            PaymentStatus::for_amounts(updated.paid_amount, updated.remaining_amount);
        updated.paid_date = Some(now);
        if input.processed_by_name.is_some() {
            updated.processed_by_name = input.processed_by_name.clone();
        }

        let transaction_id = Uuid::new_v4();
        let receipt_number = input
            .receipt_number
            .clone()
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| generate_receipt_number(transaction_id, now));

        Ok(Self {
            contract_id: contract.contract_id,
            expected_paid_amount: schedule.paid_amount,
            schedule: updated,
            transaction: PaymentTransaction {
                transaction_id,
                schedule_id: schedule.schedule_id,
                amount: input.amount,
                transaction_date: now,
                transaction_status: TransactionStatus::Completed,
                receipt_number,
                notes: input.notes.clone(),
            },
        })
    }
}

fn generate_receipt_number(transaction_id: Uuid, now: DateTime<Utc>) -> String {
    let simple = transaction_id.simple().to_string();
    format!(
        "OR-{}-{}",
        now.format("%Y%m%d"),
        simple[..8].to_ascii_uppercase()
    )
}

/// Response of a successful revert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertOutcome {
    pub schedule_id: Uuid,
    pub paid_amount_reverted: Decimal,
    pub penalty_amount_reverted: Decimal,
    pub transactions_reverted: usize,
    pub new_remaining_balance: Decimal,
    pub total_paid_after_revert: Decimal,
}

/// Writes needed to revert a schedule row, plus the computed response.
#[derive(Debug, Clone)]
pub struct RevertPlan {
    pub contract_id: Uuid,
    pub expected_paid_amount: Decimal,
    /// The row reset to its generated state.
    pub schedule: PaymentSchedule,
    pub transaction_ids: Vec<Uuid>,
    pub audit_note: String,
    pub outcome: RevertOutcome,
}

impl RevertPlan {
    /// `schedules` is every row of the contract, the target included.
    pub fn compute(
        contract: &Contract,
        schedule: &PaymentSchedule,
        schedules: &[PaymentSchedule],
        transactions: &[PaymentTransaction],
        reverted_by: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if !schedule.has_payment() {
            return Err(ContractError::NothingToRevert(schedule.schedule_id));
        }

        let paid_amount_reverted = schedule.paid_amount;
        let penalty_amount_reverted = schedule.penalty_amount;

        let total_paid_after_revert: Decimal = schedules
            .iter()
            .filter(|s| s.schedule_id != schedule.schedule_id)
            .map(|s| s.paid_amount)
            .sum();
        let balance = ContractBalance::for_contract(contract, total_paid_after_revert);

        let mut reset = schedule.clone();
        reset.reset();

        let transaction_ids: Vec<Uuid> = transactions
            .iter()
            .filter(|t| t.transaction_status == TransactionStatus::Completed)
            .map(|t| t.transaction_id)
            .collect();

        let audit_note = format!(
            "[{}] Payment reverted by {}",
            now.format("%Y-%m-%d %H:%M:%S UTC"),
            reverted_by.filter(|n| !n.trim().is_empty()).unwrap_or("system")
        );

        Ok(Self {
            contract_id: contract.contract_id,
            expected_paid_amount: paid_amount_reverted,
            schedule: reset,
            outcome: RevertOutcome {
                schedule_id: schedule.schedule_id,
                paid_amount_reverted,
                penalty_amount_reverted,
                transactions_reverted: transaction_ids.len(),
                new_remaining_balance: balance.remaining_balance,
                total_paid_after_revert,
            },
            transaction_ids,
            audit_note,
        })
    }
}

/// Response of a recorded payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOutcome {
    pub schedule: PaymentSchedule,
    pub transaction: PaymentTransaction,
    pub remaining_balance: Decimal,
    pub downpayment_status: DownpaymentStatus,
}

#[derive(Clone)]
pub struct PaymentEngine {
    store: Arc<dyn ContractStore>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl PaymentEngine {
    pub fn new(store: Arc<dyn ContractStore>, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self { store, notifier }
    }

    /// Load a schedule together with its owning contract.
    async fn load(&self, schedule_id: Uuid) -> Result<(PaymentSchedule, Contract)> {
        let schedule = self
            .store
            .find_schedule(schedule_id)
            .await?
            .ok_or(ContractError::ScheduleNotFound(schedule_id))?;
        let contract = self
            .store
            .find_contract(schedule.contract_id)
            .await?
            .ok_or(ContractError::ContractNotFound(schedule.contract_id))?;
        Ok((schedule, contract))
    }

    #[instrument(skip(self, input), fields(schedule_id = %schedule_id, amount = %input.amount))]
    pub async fn record_payment(
        &self,
        schedule_id: Uuid,
        input: RecordPayment,
    ) -> Result<PaymentOutcome> {
        let result = self.record_payment_inner(schedule_id, input).await;
        record_operation("record_payment", &result);
        result
    }

    async fn record_payment_inner(
        &self,
        schedule_id: Uuid,
        input: RecordPayment,
    ) -> Result<PaymentOutcome> {
        let (schedule, contract) = self.load(schedule_id).await?;
        let posting = PaymentPosting::compute(&contract, &schedule, &input, Utc::now())?;
        let balance = self.store.apply_payment(&posting).await?;

        info!(
            contract_id = %contract.contract_id,
            installment_number = schedule.installment_number,
            payment_status = posting.schedule.payment_status.as_str(),
            remaining_balance = %balance.remaining_balance,
            "Payment recorded"
        );

        if let Some(user_id) = contract.user_id {
            dispatch(
                self.notifier.as_ref(),
                Notification {
                    recipient: Recipient::User(user_id),
                    title: "Payment received".to_string(),
                    message: format!(
                        "We received {} for installment {} of contract {}.",
                        posting.transaction.amount,
                        schedule.installment_number,
                        contract.contract_number
                    ),
                    priority: Priority::Normal,
                    action_url: Some(format!("/contracts/{}", contract.contract_id)),
                    data: json!({
                        "contract_id": contract.contract_id,
                        "schedule_id": schedule_id,
                        "receipt_number": posting.transaction.receipt_number,
                    }),
                },
            )
            .await;
        }

        Ok(PaymentOutcome {
            downpayment_status: DownpaymentStatus::for_balance(balance.remaining_balance),
            remaining_balance: balance.remaining_balance,
            schedule: posting.schedule,
            transaction: posting.transaction,
        })
    }

    /// Undo the payment(s) recorded on a schedule row.
    #[instrument(skip(self, reverted_by), fields(schedule_id = %schedule_id))]
    pub async fn revert(
        &self,
        schedule_id: Uuid,
        reverted_by: Option<String>,
    ) -> Result<RevertOutcome> {
        let result = self.revert_inner(schedule_id, reverted_by).await;
        record_operation("revert_payment", &result);
        result
    }

    async fn revert_inner(
        &self,
        schedule_id: Uuid,
        reverted_by: Option<String>,
    ) -> Result<RevertOutcome> {
        let (schedule, contract) = self.load(schedule_id).await?;
        if !schedule.has_payment() {
            return Err(ContractError::NothingToRevert(schedule_id));
        }
        if contract.is_voided() {
            return Err(ContractError::ContractVoided(contract.contract_id));
        }

        let transactions = self.store.list_transactions(schedule_id).await?;
        let schedules = self.store.list_schedules(contract.contract_id).await?;
        let plan = RevertPlan::compute(
            &contract,
            &schedule,
            &schedules,
            &transactions,
            reverted_by.as_deref(),
            Utc::now(),
        )?;

        let balance = self.store.apply_revert(&plan).await?;
        let outcome = RevertOutcome {
            new_remaining_balance: balance.remaining_balance,
            total_paid_after_revert: balance.total_paid,
            ..plan.outcome
        };

        info!(
            contract_id = %contract.contract_id,
            paid_amount_reverted = %outcome.paid_amount_reverted,
            transactions_reverted = outcome.transactions_reverted,
            new_remaining_balance = %outcome.new_remaining_balance,
            "Payment reverted"
        );

        let data = json!({
            "contract_id": contract.contract_id,
            "schedule_id": schedule_id,
            "paid_amount_reverted": outcome.paid_amount_reverted,
        });
        let message = format!(
            "The payment of {} on installment {} of contract {} was reverted.",
            outcome.paid_amount_reverted, schedule.installment_number, contract.contract_number
        );
        let mut recipients = vec![Recipient::role("accounting")];
        if let Some(user_id) = contract.user_id {
            recipients.push(Recipient::User(user_id));
        }
        for recipient in recipients {
            dispatch(
                self.notifier.as_ref(),
                Notification {
                    recipient,
                    title: "Payment reverted".to_string(),
                    message: message.clone(),
                    priority: Priority::High,
                    action_url: Some(format!("/contracts/{}", contract.contract_id)),
                    data: data.clone(),
                },
            )
            .await;
        }

        Ok(outcome)
    }

    pub async fn list_schedules(&self, contract_id: Uuid) -> Result<Vec<PaymentSchedule>> {
        self.store
            .find_contract(contract_id)
            .await?
            .ok_or(ContractError::ContractNotFound(contract_id))?;
        self.store.list_schedules(contract_id).await
    }

    pub async fn list_transactions(&self, schedule_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        self.store
            .find_schedule(schedule_id)
            .await?
            .ok_or(ContractError::ScheduleNotFound(schedule_id))?;
        self.store.list_transactions(schedule_id).await
    }
}
