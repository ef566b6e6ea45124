//! In-process implementation of the persistence seams.
//!
//! Every write takes the single state lock, so each call is atomic in the same
//! way the Postgres transactions are. Named operations can be made to fail
//! with [`MemoryStore::fail_on`] to exercise compensation and cleanup paths.

use crate::error::{ContractError, Result};
use crate::models::{
    Contract, ContractStatus, PaymentSchedule, PaymentTransaction, PropertyAvailability,
    Reservation, TransactionStatus, TransferRequest, TransferStatus,
};
use crate::services::payments::{PaymentPosting, RevertPlan};
use crate::services::store::{
    ContractBalance, ContractStore, PropertyRegistry, ReservationSource, TransferDecision,
    VoidTransition,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    InsertContract,
    InsertSchedules,
    ApplyPayment,
    ApplyRevert,
    MarkVoided,
    PurgeBilling,
    SetAvailability,
    TransferDecision,
}

#[derive(Default)]
struct State {
    reservations: HashMap<Uuid, Reservation>,
    properties: HashMap<Uuid, PropertyAvailability>,
    contracts: HashMap<Uuid, Contract>,
    schedules: HashMap<Uuid, PaymentSchedule>,
    transactions: HashMap<Uuid, PaymentTransaction>,
    transfers: HashMap<Uuid, TransferRequest>,
    faults: HashSet<FaultPoint>,
}

impl State {
    fn check(&self, point: FaultPoint) -> Result<()> {
        if self.faults.contains(&point) {
            return Err(ContractError::Persistence(anyhow::anyhow!(
                "injected failure at {:?}",
                point
            )));
        }
        Ok(())
    }

    /// Re-derive the contract balance from its schedule rows.
    fn rebalance(&mut self, contract_id: Uuid, now: DateTime<Utc>) -> Result<ContractBalance> {
        let total_paid: Decimal = self
            .schedules
            .values()
            .filter(|s| s.contract_id == contract_id)
            .map(|s| s.paid_amount)
            .sum();
        let contract = self
            .contracts
            .get_mut(&contract_id)
            .ok_or(ContractError::ContractNotFound(contract_id))?;
        let balance = ContractBalance::for_contract(contract, total_paid);
        contract.set_remaining_balance(balance.remaining_balance);
        contract.updated_utc = now;
        Ok(balance)
    }

    /// Guard shared by payment and revert writes.
    fn guard_schedule(
        &self,
        contract_id: Uuid,
        schedule_id: Uuid,
        expected_paid_amount: Decimal,
    ) -> Result<()> {
        let contract = self
            .contracts
            .get(&contract_id)
            .ok_or(ContractError::ContractNotFound(contract_id))?;
        if contract.is_voided() {
            return Err(ContractError::ContractVoided(contract_id));
        }
        let current = self
            .schedules
            .get(&schedule_id)
            .ok_or(ContractError::ScheduleNotFound(schedule_id))?;
        if current.paid_amount != expected_paid_amount {
            return Err(ContractError::ConcurrentUpdate(schedule_id));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_reservation(&self, reservation: Reservation) {
        let mut state = self.state.write().await;
        state
            .reservations
            .insert(reservation.reservation_id, reservation);
    }

    pub async fn seed_property(&self, property_id: Uuid, availability: PropertyAvailability) {
        self.state
            .write()
            .await
            .properties
            .insert(property_id, availability);
    }

    pub async fn property_availability(&self, property_id: Uuid) -> Option<PropertyAvailability> {
        self.state.read().await.properties.get(&property_id).copied()
    }

    pub async fn contract_count(&self) -> usize {
        self.state.read().await.contracts.len()
    }

    pub async fn fail_on(&self, point: FaultPoint) {
        self.state.write().await.faults.insert(point);
    }

    pub async fn clear_faults(&self) {
        self.state.write().await.faults.clear();
    }
}

#[async_trait]
impl ReservationSource for MemoryStore {
    async fn find_reservation(&self, reservation_id: Uuid) -> Result<Option<Reservation>> {
        Ok(self
            .state
            .read()
            .await
            .reservations
            .get(&reservation_id)
            .cloned())
    }
}

#[async_trait]
impl PropertyRegistry for MemoryStore {
    async fn set_availability(
        &self,
        property_id: Uuid,
        availability: PropertyAvailability,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(FaultPoint::SetAvailability)?;
        state.properties.insert(property_id, availability);
        Ok(())
    }
}

#[async_trait]
impl ContractStore for MemoryStore {
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn find_contract(&self, contract_id: Uuid) -> Result<Option<Contract>> {
        Ok(self.state.read().await.contracts.get(&contract_id).cloned())
    }

    async fn find_contract_by_reservation(
        &self,
        reservation_id: Uuid,
    ) -> Result<Option<Contract>> {
        Ok(self
            .state
            .read()
            .await
            .contracts
            .values()
            .find(|c| c.reservation_id == reservation_id)
            .cloned())
    }

    async fn insert_contract(&self, contract: &Contract) -> Result<bool> {
        let mut state = self.state.write().await;
        state.check(FaultPoint::InsertContract)?;
        if state
            .contracts
            .values()
            .any(|c| c.reservation_id == contract.reservation_id)
        {
            return Ok(false);
        }
        state
            .contracts
            .insert(contract.contract_id, contract.clone());
        Ok(true)
    }

    async fn delete_contract(&self, contract_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        state.schedules.retain(|_, s| s.contract_id != contract_id);
        state.contracts.remove(&contract_id);
        Ok(())
    }

    async fn insert_schedules(&self, schedules: &[PaymentSchedule]) -> Result<()> {
        let mut state = self.state.write().await;
        state.check(FaultPoint::InsertSchedules)?;
        for schedule in schedules {
            state.schedules.insert(schedule.schedule_id, schedule.clone());
        }
        Ok(())
    }

    async fn list_schedules(&self, contract_id: Uuid) -> Result<Vec<PaymentSchedule>> {
        let state = self.state.read().await;
        let mut rows: Vec<PaymentSchedule> = state
            .schedules
            .values()
            .filter(|s| s.contract_id == contract_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.installment_number);
        Ok(rows)
    }

    async fn find_schedule(&self, schedule_id: Uuid) -> Result<Option<PaymentSchedule>> {
        Ok(self.state.read().await.schedules.get(&schedule_id).cloned())
    }

    async fn list_transactions(&self, schedule_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        let state = self.state.read().await;
        let mut rows: Vec<PaymentTransaction> = state
            .transactions
            .values()
            .filter(|t| t.schedule_id == schedule_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.transaction_date.cmp(&a.transaction_date));
        Ok(rows)
    }

    async fn apply_payment(&self, posting: &PaymentPosting) -> Result<ContractBalance> {
        let mut state = self.state.write().await;
        state.check(FaultPoint::ApplyPayment)?;
        state.guard_schedule(
            posting.contract_id,
            posting.schedule.schedule_id,
            posting.expected_paid_amount,
        )?;

        state
            .schedules
            .insert(posting.schedule.schedule_id, posting.schedule.clone());
        state
            .transactions
            .insert(posting.transaction.transaction_id, posting.transaction.clone());
        state.rebalance(posting.contract_id, posting.transaction.transaction_date)
    }

    async fn apply_revert(&self, plan: &RevertPlan) -> Result<ContractBalance> {
        let mut state = self.state.write().await;
        state.check(FaultPoint::ApplyRevert)?;
        state.guard_schedule(
            plan.contract_id,
            plan.schedule.schedule_id,
            plan.expected_paid_amount,
        )?;

        state
            .schedules
            .insert(plan.schedule.schedule_id, plan.schedule.clone());
        for id in &plan.transaction_ids {
            if let Some(tx) = state.transactions.get_mut(id) {
                if tx.transaction_status == TransactionStatus::Completed {
                    tx.mark_reverted(&plan.audit_note);
                }
            }
        }
        state.rebalance(plan.contract_id, Utc::now())
    }

    async fn mark_voided(
        &self,
        contract_id: Uuid,
        reason: &str,
        voided_at: DateTime<Utc>,
    ) -> Result<VoidTransition> {
        let mut state = self.state.write().await;
        state.check(FaultPoint::MarkVoided)?;
        let Some(contract) = state.contracts.get_mut(&contract_id) else {
            return Ok(VoidTransition::NotFound);
        };
        if contract.is_voided() {
            return Ok(VoidTransition::AlreadyVoided);
        }
        contract.contract_status = ContractStatus::Voided;
        contract.voided_at = Some(voided_at);
        contract.void_reason = Some(reason.to_string());
        contract.updated_utc = voided_at;
        Ok(VoidTransition::Voided(Box::new(contract.clone())))
    }

    async fn purge_billing(&self, contract_id: Uuid) -> Result<u64> {
        let mut state = self.state.write().await;
        state.check(FaultPoint::PurgeBilling)?;
        let before = state.schedules.len();
        state.schedules.retain(|_, s| s.contract_id != contract_id);
        Ok((before - state.schedules.len()) as u64)
    }

    async fn find_pending_transfer(&self, contract_id: Uuid) -> Result<Option<TransferRequest>> {
        Ok(self
            .state
            .read()
            .await
            .transfers
            .values()
            .find(|t| t.contract_id == contract_id && t.is_pending())
            .cloned())
    }

    async fn insert_transfer(&self, request: &TransferRequest) -> Result<bool> {
        let mut state = self.state.write().await;
        if state
            .transfers
            .values()
            .any(|t| t.contract_id == request.contract_id && t.is_pending())
        {
            return Ok(false);
        }
        state.transfers.insert(request.id, request.clone());
        Ok(true)
    }

    async fn find_transfer(&self, request_id: Uuid) -> Result<Option<TransferRequest>> {
        Ok(self.state.read().await.transfers.get(&request_id).cloned())
    }

    async fn list_transfers(&self, contract_id: Uuid) -> Result<Vec<TransferRequest>> {
        let state = self.state.read().await;
        let mut rows: Vec<TransferRequest> = state
            .transfers
            .values()
            .filter(|t| t.contract_id == contract_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(rows)
    }

    async fn apply_transfer_decision(
        &self,
        decision: &TransferDecision,
    ) -> Result<TransferRequest> {
        let mut state = self.state.write().await;
        state.check(FaultPoint::TransferDecision)?;

        match state.transfers.get(&decision.request_id) {
            None => return Err(ContractError::TransferRequestNotFound(decision.request_id)),
            Some(request) if !request.is_pending() => {
                return Err(ContractError::TransferAlreadyDecided(decision.request_id))
            }
            Some(_) => {}
        }

        if let Some(client) = &decision.new_client {
            let contract = state
                .contracts
                .get_mut(&decision.contract_id)
                .ok_or(ContractError::ContractNotFound(decision.contract_id))?;
            if contract.is_voided() {
                return Err(ContractError::ContractVoided(decision.contract_id));
            }
            contract.set_client(client);
            contract.updated_utc = decision.approved_at;
        }

        let request = state
            .transfers
            .get_mut(&decision.request_id)
            .ok_or(ContractError::TransferRequestNotFound(decision.request_id))?;
        request.request_status = if decision.is_approval() {
            TransferStatus::Approved
        } else {
            TransferStatus::Rejected
        };
        request.approved_by = Some(decision.approved_by.clone());
        request.approved_at = Some(decision.approved_at);
        request.approval_notes = Some(decision.approval_notes.clone());
        Ok(request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientIdentity, PaymentFrequency};
    use crate::services::contracts::{build_contract, CreateContract};

    async fn store_with_contract() -> (MemoryStore, Contract) {
        let store = MemoryStore::new();
        let reservation = Reservation {
            reservation_id: Uuid::new_v4(),
            tracking_number: Some("RES-7F3A9C21".to_string()),
            property_id: None,
            user_id: None,
            client_name: "Ana Cruz".to_string(),
            client_email: "ana@example.com".to_string(),
            client_phone: "555-0100".to_string(),
            client_address: "Lot 4, Block 2".to_string(),
            total_contract_price: Decimal::from(900_000),
            reservation_fee_paid: Decimal::ZERO,
            status: "approved".to_string(),
        };
        let input = CreateContract {
            reservation_id: reservation.reservation_id,
            payment_plan_months: 12,
            payment_frequency: PaymentFrequency::Monthly,
            allow_partial_payments: false,
        };
        let contract = build_contract(&reservation, &input, Utc::now()).unwrap();
        assert!(store.insert_contract(&contract).await.unwrap());
        (store, contract)
    }

    fn pending_request(contract: &Contract) -> TransferRequest {
        TransferRequest {
            id: Uuid::new_v4(),
            contract_id: contract.contract_id,
            original_client_name: contract.client_name.clone(),
            original_client_email: contract.client_email.clone(),
            original_client_phone: contract.client_phone.clone(),
            original_client_address: contract.client_address.clone(),
            new_client_name: "Ben Reyes".to_string(),
            new_client_email: "ben@example.com".to_string(),
            new_client_phone: "555-0199".to_string(),
            new_client_address: "Lot 9, Block 1".to_string(),
            relationship: "Sibling".to_string(),
            transfer_reason: "Relocation".to_string(),
            request_status: TransferStatus::Pending,
            requested_by_id: None,
            requested_by_name: "Ana Cruz".to_string(),
            approved_by: None,
            approved_at: None,
            approval_notes: None,
            created_utc: Utc::now(),
        }
    }

    #[tokio::test]
    async fn approval_after_void_leaves_holder_unchanged() {
        let (store, contract) = store_with_contract().await;
        let request = pending_request(&contract);
        assert!(store.insert_transfer(&request).await.unwrap());
        store
            .mark_voided(contract.contract_id, "Buyer withdrew", Utc::now())
            .await
            .unwrap();

        let decision = TransferDecision {
            request_id: request.id,
            contract_id: contract.contract_id,
            new_client: Some(request.new_client()),
            approved_by: "Admin Lee".to_string(),
            approved_at: Utc::now(),
            approval_notes: "Transfer approved".to_string(),
        };
        let result = store.apply_transfer_decision(&decision).await;

        assert!(matches!(result, Err(ContractError::ContractVoided(id)) if id == contract.contract_id));
        let stored = store.find_contract(contract.contract_id).await.unwrap().unwrap();
        assert_eq!(
            stored.client(),
            ClientIdentity {
                name: "Ana Cruz".to_string(),
                email: "ana@example.com".to_string(),
                phone: "555-0100".to_string(),
                address: "Lot 4, Block 2".to_string(),
            }
        );
        let still_pending = store.find_transfer(request.id).await.unwrap().unwrap();
        assert!(still_pending.is_pending());
    }

    #[tokio::test]
    async fn rebalance_credits_the_reservation_fee() {
        let (store, mut contract) = store_with_contract().await;
        contract.reservation_fee_paid = Decimal::from(10_000);
        let mut state = store.state.write().await;
        state.contracts.insert(contract.contract_id, contract.clone());

        let balance = state.rebalance(contract.contract_id, Utc::now()).unwrap();

        assert_eq!(balance.remaining_balance, Decimal::from(80_000));
        assert_eq!(balance.total_paid, Decimal::ZERO);
    }
}
