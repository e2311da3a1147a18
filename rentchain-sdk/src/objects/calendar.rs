//! Property service calendar API request and response types.
//!
//! Dates travel as `YYYY-MM-DD` strings. A date range is always half-open:
//! the end date itself is not occupied.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

/// Availability of a single calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityStatus {
    Available,
    Locked,
    Booked,
}

/// Request body for `POST /properties/{property_id}/availability/lock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDatesRequest {
    pub check_in: Date,
    pub check_out: Date,
    pub tenant_id: i64,
}

/// Response of a successful lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockDatesResponse {
    pub lock_token: Uuid,
    /// Unix timestamp after which the lock may be swept.
    pub expires_at: i64,
}

/// Request body for `POST /properties/{property_id}/availability/commit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDatesRequest {
    pub start_date: Date,
    pub end_date: Date,
    pub lock_token: Uuid,
    /// Payment transaction, kept for the audit log only.
    #[serde(default)]
    pub tx_hash: Option<String>,
}

/// Request body for `POST /properties/{property_id}/availability/release`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDatesRequest {
    pub lock_token: Uuid,
}

/// Request body for `POST /properties/{property_id}/availability/unbook`.
///
/// Frees days that were committed for `holder_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbookDatesRequest {
    pub start_date: Date,
    pub end_date: Date,
    pub holder_id: i64,
}

/// Query string of `GET /properties/{property_id}/availability/booked-by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedByQuery {
    pub start_date: Date,
    pub end_date: Date,
    pub holder_id: i64,
}

/// Whether every day of the range is `BOOKED` for the holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedByResponse {
    pub property_id: i64,
    pub holder_id: i64,
    pub booked: bool,
}

/// Request body for the owner's manual block and unblock endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualBlockRequest {
    pub dates: Vec<Date>,
}

/// Query string carrying a half-open date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRangeQuery {
    pub start_date: Date,
    pub end_date: Date,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub property_id: i64,
    pub start_date: Date,
    pub end_date: Date,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableDatesResponse {
    pub property_id: i64,
    pub dates: Vec<Date>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateCalendarResponse {
    pub property_id: i64,
    pub days_created: u64,
}

/// Backend-computed price for a stay. Amounts are in ETH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub property_id: i64,
    pub start_date: Date,
    pub end_date: Date,
    pub number_of_nights: u32,
    pub price_per_night: Decimal,
    pub total_price: Decimal,
    pub security_deposit: Decimal,
    pub min_stay_nights: u32,
    pub available: bool,
}
