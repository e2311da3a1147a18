//! Booking service API request and response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::Date;
use uuid::Uuid;

/// Booking lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    PendingPayment,
    PaymentProcessing,
    Confirmed,
    Active,
    Completed,
    Cancelled,
    Disputed,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 7] = [
        BookingStatus::PendingPayment,
        BookingStatus::PaymentProcessing,
        BookingStatus::Confirmed,
        BookingStatus::Active,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::Disputed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::PendingPayment => "PENDING_PAYMENT",
            BookingStatus::PaymentProcessing => "PAYMENT_PROCESSING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Active => "ACTIVE",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Disputed => "DISPUTED",
        }
    }
}

/// Request body for `POST /bookings`.
///
/// There is deliberately no price field: the price is always computed
/// from the property snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub property_id: i64,
    pub check_in: Date,
    pub check_out: Date,
    #[serde(default)]
    pub number_of_guests: Option<u32>,
}

/// Request body for `POST /bookings/{booking_id}/confirm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmBookingRequest {
    pub tx_hash: String,
}

/// Request body for `POST /bookings/{booking_id}/cancel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelBookingRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Request body for `POST /bookings/link-rental`.
///
/// Sent by the dApp once the escrow contract has assigned a rental id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRentalRequest {
    pub property_id: i64,
    pub blockchain_rental_id: i64,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingRole {
    #[default]
    Tenant,
    Owner,
}

/// Query string for `GET /bookings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BookingListQuery {
    #[serde(default)]
    pub role: BookingRole,
    #[serde(default)]
    pub status: Option<BookingStatus>,
}

/// A booking as seen by API callers. Timestamps are unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingResponse {
    pub id: i64,
    pub property_id: i64,
    pub tenant_id: i64,
    pub tenant_wallet: String,
    pub owner_id: i64,
    pub owner_wallet: String,
    pub check_in: Date,
    pub check_out: Date,
    pub number_of_guests: Option<u32>,
    pub total_price: Decimal,
    pub security_deposit: Decimal,
    pub status: BookingStatus,
    pub lock_token: Uuid,
    pub payment_tx_hash: Option<String>,
    pub blockchain_rental_id: Option<i64>,
    pub cancellation_reason: Option<String>,
    pub created_at: i64,
    pub confirmed_at: Option<i64>,
    pub payment_confirmed_at: Option<i64>,
    pub cancelled_at: Option<i64>,
    pub completed_at: Option<i64>,
}

/// Response of `GET /bookings/owner/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerStats {
    pub total_bookings: u64,
    pub confirmed_bookings: u64,
    pub pending_bookings: u64,
    pub cancelled_bookings: u64,
    pub active_bookings: u64,
    /// Sum of `total_price` over confirmed, active and completed bookings, in ETH.
    pub total_revenue: Decimal,
    pub bookings_by_status: BTreeMap<String, u64>,
}
