use crate::services::RecordPayment;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub penalty_amount: Option<Decimal>,
    #[validate(length(min = 1, max = 64, message = "receipt_number must be 1-64 characters"))]
    pub receipt_number: Option<String>,
    pub notes: Option<String>,
    pub processed_by_name: Option<String>,
}

impl From<RecordPaymentRequest> for RecordPayment {
    fn from(request: RecordPaymentRequest) -> Self {
        Self {
            amount: request.amount,
            penalty_amount: request.penalty_amount,
            receipt_number: request.receipt_number,
            notes: request.notes,
            processed_by_name: request.processed_by_name,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RevertPaymentRequest {
    #[validate(length(max = 200, message = "reverted_by_name must be at most 200 characters"))]
    pub reverted_by_name: Option<String>,
}
