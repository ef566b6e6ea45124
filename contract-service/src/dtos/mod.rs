mod contracts;
mod payments;

pub use contracts::{CreateContractRequest, VoidContractRequest};
pub use payments::{RecordPaymentRequest, RevertPaymentRequest};
pub use crate::services::transfers::{
    CreateTransfer as CreateTransferRequest, TransferDecisionInput as TransferDecisionRequest,
};
