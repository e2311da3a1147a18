pub mod availability_day;
pub mod booking;
pub mod property;

use rentchain_sdk::objects::{
    AvailabilityStatus as SdkAvailabilityStatus, BookingStatus as SdkBookingStatus,
    PropertyStatus as SdkPropertyStatus,
};

/// Calendar day status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `rentchain_sdk::objects::AvailabilityStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE", type_name = "availability_status")]
pub enum AvailabilityStatus {
    Available,
    Locked,
    Booked,
}

impl From<AvailabilityStatus> for SdkAvailabilityStatus {
    fn from(value: AvailabilityStatus) -> Self {
        match value {
            AvailabilityStatus::Available => SdkAvailabilityStatus::Available,
            AvailabilityStatus::Locked => SdkAvailabilityStatus::Locked,
            AvailabilityStatus::Booked => SdkAvailabilityStatus::Booked,
        }
    }
}

/// Booking status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `rentchain_sdk::objects::BookingStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE", type_name = "booking_status")]
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
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    /// Whether the booking still holds (or may still hold) its lock token.
    pub fn holds_lock(self) -> bool {
        matches!(
            self,
            BookingStatus::PendingPayment
                | BookingStatus::PaymentProcessing
                | BookingStatus::Disputed
        )
    }
}

impl From<BookingStatus> for SdkBookingStatus {
    fn from(value: BookingStatus) -> Self {
        match value {
            BookingStatus::PendingPayment => SdkBookingStatus::PendingPayment,
            BookingStatus::PaymentProcessing => SdkBookingStatus::PaymentProcessing,
            BookingStatus::Confirmed => SdkBookingStatus::Confirmed,
            BookingStatus::Active => SdkBookingStatus::Active,
            BookingStatus::Completed => SdkBookingStatus::Completed,
            BookingStatus::Cancelled => SdkBookingStatus::Cancelled,
            BookingStatus::Disputed => SdkBookingStatus::Disputed,
        }
    }
}

impl From<SdkBookingStatus> for BookingStatus {
    fn from(value: SdkBookingStatus) -> Self {
        match value {
            SdkBookingStatus::PendingPayment => BookingStatus::PendingPayment,
            SdkBookingStatus::PaymentProcessing => BookingStatus::PaymentProcessing,
            SdkBookingStatus::Confirmed => BookingStatus::Confirmed,
            SdkBookingStatus::Active => BookingStatus::Active,
            SdkBookingStatus::Completed => BookingStatus::Completed,
            SdkBookingStatus::Cancelled => BookingStatus::Cancelled,
            SdkBookingStatus::Disputed => BookingStatus::Disputed,
        }
    }
}

/// Listing status for database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE", type_name = "property_status")]
pub enum PropertyStatus {
    Draft,
    PendingReview,
    Active,
    Inactive,
    Rejected,
}

impl From<PropertyStatus> for SdkPropertyStatus {
    fn from(value: PropertyStatus) -> Self {
        match value {
            PropertyStatus::Draft => SdkPropertyStatus::Draft,
            PropertyStatus::PendingReview => SdkPropertyStatus::PendingReview,
            PropertyStatus::Active => SdkPropertyStatus::Active,
            PropertyStatus::Inactive => SdkPropertyStatus::Inactive,
            PropertyStatus::Rejected => SdkPropertyStatus::Rejected,
        }
    }
}

impl From<SdkPropertyStatus> for PropertyStatus {
    fn from(value: SdkPropertyStatus) -> Self {
        match value {
            SdkPropertyStatus::Draft => PropertyStatus::Draft,
            SdkPropertyStatus::PendingReview => PropertyStatus::PendingReview,
            SdkPropertyStatus::Active => PropertyStatus::Active,
            SdkPropertyStatus::Inactive => PropertyStatus::Inactive,
            SdkPropertyStatus::Rejected => PropertyStatus::Rejected,
        }
    }
}
