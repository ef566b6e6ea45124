//! Contract Factory and Void/Cascade Controller.

use crate::error::{ContractError, ErrorKind, Result};
use crate::models::{
    Contract, ContractStatus, DownpaymentStatus, PaymentFrequency, PaymentSchedule,
    PropertyAvailability, Reservation,
};
use crate::services::ledger::{self, ScheduleRequest};
use crate::services::metrics::{record_operation, CLEANUP_FAILURES_TOTAL};
use crate::services::notifier::{dispatch, Notification, NotificationDispatcher, Priority, Recipient};
use crate::services::store::{ContractStore, PropertyRegistry, ReservationSource, VoidTransition};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Share of the contract price paid as downpayment (0.10).
pub const DOWNPAYMENT_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);
/// Share of the contract price covered by bank financing (0.90).
pub const BANK_FINANCING_RATE: Decimal = Decimal::from_parts(90, 0, 0, false, 2);

pub const DEFAULT_VOID_REASON: &str = "Non-payment for 3 consecutive months";

#[derive(Debug, Clone)]
pub struct CreateContract {
    pub reservation_id: Uuid,
    pub payment_plan_months: i32,
    pub payment_frequency: PaymentFrequency,
    /// Stored on the contract; not enforced yet.
    pub allow_partial_payments: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractWithSchedules {
    pub contract: Contract,
    pub schedules: Vec<PaymentSchedule>,
}

/// `CTS-<year>-<SUFFIX>`.
///
/// The suffix is the reservation's tracking number without its leading
/// `<PREFIX>-` segment, or the first 8 characters of the reservation id.
pub fn contract_number(reservation: &Reservation, year: i32) -> String {
    let suffix = reservation
        .tracking_number
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|tracking| match tracking.split_once('-') {
            Some((_, rest)) if !rest.is_empty() => rest,
            _ => tracking,
        })
        .map(str::to_ascii_uppercase)
        .unwrap_or_else(|| {
            reservation.reservation_id.simple().to_string()[..8].to_ascii_uppercase()
        });
    format!("CTS-{}-{}", year, suffix)
}

/// Derive a new contract from an approved reservation.
pub fn build_contract(
    reservation: &Reservation,
    input: &CreateContract,
    now: DateTime<Utc>,
) -> Result<Contract> {
    ledger::validate_plan_months(input.payment_plan_months)?;

    let signed: NaiveDate = now.date_naive();
    let first_installment_date = ledger::shift_by_periods(signed, input.payment_frequency, 1)
        .ok_or_else(|| ContractError::Validation("First installment date out of range".into()))?;

    let price = reservation.total_contract_price;
    let downpayment_total = ledger::round_money(price * DOWNPAYMENT_RATE);
    let bank_financing_amount = ledger::round_money(price * BANK_FINANCING_RATE);
    let remaining = (downpayment_total - reservation.reservation_fee_paid).max(Decimal::ZERO);

    let contract_id = Uuid::new_v4();
    let final_installment_date = ledger::final_due_date(&ScheduleRequest {
        contract_id,
        remaining_downpayment: remaining,
        payment_plan_months: input.payment_plan_months,
        payment_frequency: input.payment_frequency,
        first_installment_date,
    })?;

    Ok(Contract {
        contract_id,
        contract_number: contract_number(reservation, signed.year()),
        reservation_id: reservation.reservation_id,
        property_id: reservation.property_id,
        user_id: reservation.user_id,
        client_name: reservation.client_name.clone(),
        client_email: reservation.client_email.clone(),
        client_phone: reservation.client_phone.clone(),
        client_address: reservation.client_address.clone(),
        total_contract_price: price,
        downpayment_total,
        reservation_fee_paid: reservation.reservation_fee_paid,
        remaining_downpayment: remaining,
        remaining_balance: remaining,
        bank_financing_amount,
        payment_plan_months: input.payment_plan_months,
        payment_frequency: input.payment_frequency,
        monthly_installment: ledger::monthly_equivalent(remaining, input.payment_plan_months),
        allow_partial_payments: input.allow_partial_payments,
        contract_status: ContractStatus::Active,
        downpayment_status: DownpaymentStatus::for_balance(remaining),
        contract_signed_date: signed,
        first_installment_date,
        final_installment_date,
        voided_at: None,
        void_reason: None,
        created_utc: now,
        updated_utc: now,
    })
}

#[derive(Clone)]
pub struct ContractFactory {
    store: Arc<dyn ContractStore>,
    reservations: Arc<dyn ReservationSource>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl ContractFactory {
    pub fn new(
        store: Arc<dyn ContractStore>,
        reservations: Arc<dyn ReservationSource>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            reservations,
            notifier,
        }
    }

    #[instrument(skip(self, input), fields(reservation_id = %input.reservation_id))]
    pub async fn create(&self, input: CreateContract) -> Result<ContractWithSchedules> {
        let result = self.create_inner(input).await;
        record_operation("create_contract", &result);
        result
    }

    async fn create_inner(&self, input: CreateContract) -> Result<ContractWithSchedules> {
        ledger::validate_plan_months(input.payment_plan_months)?;

        let reservation = self
            .reservations
            .find_reservation(input.reservation_id)
            .await?
            .filter(Reservation::is_approved)
            .ok_or(ContractError::ReservationNotFound(input.reservation_id))?;

        if let Some(existing) = self
            .store
            .find_contract_by_reservation(reservation.reservation_id)
            .await?
        {
            return Err(ContractError::ContractAlreadyExists(Box::new(existing)));
        }

        let contract = build_contract(&reservation, &input, Utc::now())?;
        if !self.store.insert_contract(&contract).await? {
            // Lost the race to a concurrent create; report the winner.
            let existing = self
                .store
                .find_contract_by_reservation(reservation.reservation_id)
                .await?
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "Contract for reservation {} vanished after a unique violation",
                        reservation.reservation_id
                    )
                })?;
            return Err(ContractError::ContractAlreadyExists(Box::new(existing)));
        }

        let schedules = match self.materialize_schedules(&contract).await {
            Ok(schedules) => schedules,
            Err(e) => {
                error!(
                    contract_id = %contract.contract_id,
                    error = %e,
                    "Schedule materialization failed, deleting contract"
                );
                if let Err(delete_err) = self.store.delete_contract(contract.contract_id).await {
                    error!(
                        contract_id = %contract.contract_id,
                        error = %delete_err,
                        "Compensating delete failed"
                    );
                }
                return Err(e);
            }
        };

        info!(
            contract_id = %contract.contract_id,
            contract_number = %contract.contract_number,
            installments = schedules.len(),
            frequency = contract.payment_frequency.as_str(),
            "Contract created"
        );

        self.notify_created(&contract).await;

        Ok(ContractWithSchedules {
            contract,
            schedules,
        })
    }

    async fn materialize_schedules(&self, contract: &Contract) -> Result<Vec<PaymentSchedule>> {
        let schedules = ledger::generate_schedule(&ScheduleRequest {
            contract_id: contract.contract_id,
            remaining_downpayment: contract.remaining_downpayment,
            payment_plan_months: contract.payment_plan_months,
            payment_frequency: contract.payment_frequency,
            first_installment_date: contract.first_installment_date,
        })?;
        if !schedules.is_empty() {
            self.store.insert_schedules(&schedules).await?;
        }
        Ok(schedules)
    }

    async fn notify_created(&self, contract: &Contract) {
        let data = json!({
            "contract_id": contract.contract_id,
            "contract_number": contract.contract_number,
            "reservation_id": contract.reservation_id,
        });
        let mut recipients = vec![Recipient::role("admin")];
        if let Some(user_id) = contract.user_id {
            recipients.push(Recipient::User(user_id));
        }
        for recipient in recipients {
            dispatch(
                self.notifier.as_ref(),
                Notification {
                    recipient,
                    title: "Contract created".to_string(),
                    message: format!(
                        "Contract {} was created for {}.",
                        contract.contract_number, contract.client_name
                    ),
                    priority: Priority::Normal,
                    action_url: Some(format!("/contracts/{}", contract.contract_id)),
                    data: data.clone(),
                },
            )
            .await;
        }
    }

    pub async fn get(&self, contract_id: Uuid) -> Result<ContractWithSchedules> {
        let contract = self
            .store
            .find_contract(contract_id)
            .await?
            .ok_or(ContractError::ContractNotFound(contract_id))?;
        let schedules = self.store.list_schedules(contract_id).await?;
        Ok(ContractWithSchedules {
            contract,
            schedules,
        })
    }
}

/// A cleanup step that failed after the contract was voided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupWarning {
    pub step: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl CleanupWarning {
    fn new(step: &str, error: &ContractError) -> Self {
        Self {
            step: step.to_string(),
            kind: ErrorKind::PartialFailure,
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoidOutcome {
    pub contract: Contract,
    pub schedules_removed: u64,
    pub property_released: bool,
    pub cleanup_warnings: Vec<CleanupWarning>,
}

#[derive(Clone)]
pub struct VoidController {
    store: Arc<dyn ContractStore>,
    properties: Arc<dyn PropertyRegistry>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl VoidController {
    pub fn new(
        store: Arc<dyn ContractStore>,
        properties: Arc<dyn PropertyRegistry>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            properties,
            notifier,
        }
    }

    /// Void a contract. Only the status transition can fail the call.
    #[instrument(skip(self, reason), fields(contract_id = %contract_id))]
    pub async fn void(&self, contract_id: Uuid, reason: Option<String>) -> Result<VoidOutcome> {
        let result = self.void_inner(contract_id, reason).await;
        record_operation("void_contract", &result);
        result
    }

    async fn void_inner(&self, contract_id: Uuid, reason: Option<String>) -> Result<VoidOutcome> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_VOID_REASON.to_string());

        let contract = match self.store.mark_voided(contract_id, &reason, Utc::now()).await {
            Ok(VoidTransition::Voided(contract)) => *contract,
            Ok(VoidTransition::AlreadyVoided) => {
                return Err(ContractError::ContractAlreadyVoided(contract_id))
            }
            Ok(VoidTransition::NotFound) => return Err(ContractError::ContractNotFound(contract_id)),
            Err(e) => {
                error!(error = %e, "Failed to mark contract voided");
                return Err(ContractError::VoidUpdateFailed(contract_id, e.to_string()));
            }
        };

        let mut cleanup_warnings = Vec::new();

        let schedules_removed = match self.store.purge_billing(contract_id).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Failed to purge billing records of voided contract");
                CLEANUP_FAILURES_TOTAL
                    .with_label_values(&["purge_billing"])
                    .inc();
                cleanup_warnings.push(CleanupWarning::new("purge_billing", &e));
                0
            }
        };

        let mut property_released = false;
        if let Some(property_id) = contract.property_id {
            match self
                .properties
                .set_availability(property_id, PropertyAvailability::Available)
                .await
            {
                Ok(()) => property_released = true,
                Err(e) => {
                    warn!(property_id = %property_id, error = %e, "Failed to release property");
                    CLEANUP_FAILURES_TOTAL
                        .with_label_values(&["release_property"])
                        .inc();
                    cleanup_warnings.push(CleanupWarning::new("release_property", &e));
                }
            }
        }

        info!(
            reason = %reason,
            schedules_removed,
            property_released,
            warnings = cleanup_warnings.len(),
            "Contract voided"
        );

        self.notify_voided(&contract).await;

        Ok(VoidOutcome {
            contract,
            schedules_removed,
            property_released,
            cleanup_warnings,
        })
    }

    async fn notify_voided(&self, contract: &Contract) {
        let data = json!({
            "contract_id": contract.contract_id,
            "contract_number": contract.contract_number,
            "void_reason": contract.void_reason,
        });
        let mut recipients = vec![Recipient::role("admin")];
        if let Some(user_id) = contract.user_id {
            recipients.push(Recipient::User(user_id));
        }
        for recipient in recipients {
            dispatch(
                self.notifier.as_ref(),
                Notification {
                    recipient,
                    title: "Contract voided".to_string(),
                    message: format!(
                        "Contract {} has been voided: {}",
                        contract.contract_number,
                        contract.void_reason.as_deref().unwrap_or(DEFAULT_VOID_REASON)
                    ),
                    priority: Priority::High,
                    action_url: Some(format!("/contracts/{}", contract.contract_id)),
                    data: data.clone(),
                },
            )
            .await;
        }
    }
}
