//! Services module for contract-service.

pub mod contracts;
pub mod database;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod notifier;
pub mod payments;
pub mod store;
pub mod transfers;

pub use contracts::{
    CleanupWarning, ContractFactory, ContractWithSchedules, CreateContract, VoidController,
    VoidOutcome,
};
pub use database::Database;
pub use memory::{FaultPoint, MemoryStore};
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{HttpNotifier, LogNotifier, Notification, NotificationDispatcher, Recipient};
pub use payments::{PaymentEngine, PaymentOutcome, RecordPayment, RevertOutcome};
pub use store::{ContractStore, PropertyRegistry, ReservationSource};
pub use transfers::{CreateTransfer, DecisionOutcome, TransferDecisionInput, TransferWorkflow};
