//! Persistence seams used by the engines.
//!
//! [`ContractStore`] owns contracts, schedules, transactions and transfer
//! requests. Reservations and property availability belong to neighbouring
//! systems and are reached through [`ReservationSource`] and
//! [`PropertyRegistry`].

use crate::error::Result;
use crate::models::{
    ClientIdentity, Contract, PaymentSchedule, PaymentTransaction, PropertyAvailability,
    Reservation, TransferRequest,
};
use crate::services::payments::{PaymentPosting, RevertPlan};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Contract balance as re-established by a store write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractBalance {
    pub remaining_balance: Decimal,
    pub total_paid: Decimal,
}

impl ContractBalance {
    /// `max(0, downpayment_total − reservation_fee_paid − total_paid)`, where
    /// `total_paid` sums the installment payments only.
    pub fn from_total_paid(
        downpayment_total: Decimal,
        reservation_fee_paid: Decimal,
        total_paid: Decimal,
    ) -> Self {
        Self {
            remaining_balance: (downpayment_total - reservation_fee_paid - total_paid)
                .max(Decimal::ZERO),
            total_paid,
        }
    }

    pub fn for_contract(contract: &Contract, total_paid: Decimal) -> Self {
        Self::from_total_paid(
            contract.downpayment_total,
            contract.reservation_fee_paid,
            total_paid,
        )
    }
}

/// Result of the conditional active → voided update.
#[derive(Debug, Clone)]
pub enum VoidTransition {
    Voided(Box<Contract>),
    AlreadyVoided,
    NotFound,
}

/// Decision applied to a pending transfer request.
#[derive(Debug, Clone)]
pub struct TransferDecision {
    pub request_id: Uuid,
    pub contract_id: Uuid,
    /// `Some` on approval: the identity written onto the contract.
    pub new_client: Option<ClientIdentity>,
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
    pub approval_notes: String,
}

impl TransferDecision {
    pub fn is_approval(&self) -> bool {
        self.new_client.is_some()
    }
}

#[async_trait]
pub trait ReservationSource: Send + Sync {
    async fn find_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>>;
}

#[async_trait]
pub trait PropertyRegistry: Send + Sync {
    async fn set_availability(
        &self,
        property_id: Uuid,
        availability: PropertyAvailability,
    ) -> Result<()>;
}

#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn health_check(&self) -> Result<()>;

    async fn find_contract(&self, contract_id: Uuid) -> Result<Option<Contract>>;

    async fn find_contract_by_reservation(&self, reservation_id: Uuid)
        -> Result<Option<Contract>>;

    /// Insert a new contract. Returns `false` when the reservation already
    /// has one (unique on `reservation_id`).
    async fn insert_contract(&self, contract: &Contract) -> Result<bool>;

    /// Compensating delete used when schedule materialization fails.
    async fn delete_contract(&self, contract_id: Uuid) -> Result<()>;

    async fn insert_schedules(&self, schedules: &[PaymentSchedule]) -> Result<()>;

    /// Schedules of a contract ordered by installment number.
    async fn list_schedules(&self, contract_id: Uuid) -> Result<Vec<PaymentSchedule>>;

    async fn find_schedule(&self, schedule_id: Uuid) -> Result<Option<PaymentSchedule>>;

    /// Transactions of a schedule, most recent first.
    async fn list_transactions(&self, schedule_id: Uuid) -> Result<Vec<PaymentTransaction>>;

    /// Apply a payment atomically: schedule row, new transaction, contract
    /// balance. Fails with `ConcurrentUpdate` if the row moved underneath.
    async fn apply_payment(&self, posting: &PaymentPosting) -> Result<ContractBalance>;

    /// Apply a revert atomically: schedule reset, transactions marked
    /// reverted, contract balance. Fails with `ConcurrentUpdate` if the row
    /// moved underneath.
    async fn apply_revert(&self, plan: &RevertPlan) -> Result<ContractBalance>;

    /// Conditional transition of an active contract to voided.
    async fn mark_voided(
        &self,
        contract_id: Uuid,
        reason: &str,
        voided_at: DateTime<Utc>,
    ) -> Result<VoidTransition>;

    /// Remove every billing artifact that hangs off a contract. Returns the
    /// number of schedule rows removed.
    async fn purge_billing(&self, contract_id: Uuid) -> Result<u64>;

    async fn find_pending_transfer(&self, contract_id: Uuid) -> Result<Option<TransferRequest>>;

    /// Insert a pending request. Returns `false` when one is already pending.
    async fn insert_transfer(&self, request: &TransferRequest) -> Result<bool>;

    async fn find_transfer(&self, request_id: Uuid) -> Result<Option<TransferRequest>>;

    async fn list_transfers(&self, contract_id: Uuid) -> Result<Vec<TransferRequest>>;

    /// Close a pending request and, on approval, rewrite the contract's
    /// client identity in the same unit of work.
    async fn apply_transfer_decision(&self, decision: &TransferDecision)
        -> Result<TransferRequest>;
}
