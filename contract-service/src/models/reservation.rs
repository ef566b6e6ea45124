//! Read-side view of reservations and the property availability flag.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Reservation as exposed by the reservation source.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: Uuid,
    pub tracking_number: Option<String>,
    pub property_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub client_address: String,
    pub total_contract_price: Decimal,
    pub reservation_fee_paid: Decimal,
    pub status: String,
}

impl Reservation {
    /// Only approved reservations may become contracts.
    pub fn is_approved(&self) -> bool {
        self.status.eq_ignore_ascii_case("approved")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyAvailability {
    Available,
    Reserved,
    Sold,
}

impl PropertyAvailability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::Sold => "sold",
        }
    }
}
