use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Listing status of a property. Only `Active` properties accept bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyStatus {
    Draft,
    PendingReview,
    Active,
    Inactive,
    Rejected,
}

/// The subset of a property the reservation flow depends on.
///
/// Returned by `GET /properties/{property_id}/snapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySnapshot {
    pub property_id: i64,
    pub owner_id: i64,
    pub owner_wallet: Option<String>,
    /// Nightly rate in ETH.
    pub price_per_night: Decimal,
    /// Refundable deposit in ETH, paid together with the stay.
    pub security_deposit: Decimal,
    pub status: PropertyStatus,
    pub min_stay_nights: u32,
    pub max_guests: Option<u32>,
}
