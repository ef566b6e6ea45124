use crate::error::Result;
use crate::models::PaymentFrequency;
use crate::services::CreateContract;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContractRequest {
    pub reservation_id: Uuid,
    pub payment_plan_months: i32,
    #[validate(length(min = 1, message = "payment_frequency is required"))]
    pub payment_frequency: String,
    #[serde(default)]
    pub allow_partial_payments: bool,
}

impl CreateContractRequest {
    pub fn into_input(self) -> Result<CreateContract> {
        Ok(CreateContract {
            reservation_id: self.reservation_id,
            payment_plan_months: self.payment_plan_months,
            payment_frequency: self.payment_frequency.parse::<PaymentFrequency>()?,
            allow_partial_payments: self.allow_partial_payments,
        })
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct VoidContractRequest {
    #[validate(length(max = 500, message = "reason must be at most 500 characters"))]
    pub reason: Option<String>,
}
