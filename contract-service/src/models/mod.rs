//! Domain models for contract-service.

mod contract;
mod reservation;
mod schedule;
mod transaction;
mod transfer;

pub use contract::{ClientIdentity, Contract, ContractStatus, DownpaymentStatus, PaymentFrequency};
pub use reservation::{PropertyAvailability, Reservation};
pub use schedule::{PaymentSchedule, PaymentStatus};
pub use transaction::{PaymentTransaction, TransactionStatus};
pub use transfer::{TransferRequest, TransferStatus};
