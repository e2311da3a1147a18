pub mod amount;
pub mod booking;
pub mod calendar;
pub mod messages;
pub mod property;
pub mod user;

pub use amount::{ParseWeiError, Wei};
pub use booking::{
    BookingListQuery, BookingResponse, BookingRole, BookingStatus, CancelBookingRequest,
    ConfirmBookingRequest, CreateBookingRequest, LinkRentalRequest, OwnerStats,
};
pub use calendar::{
    AvailabilityResponse, AvailabilityStatus, BookedByQuery, BookedByResponse, CommitDatesRequest,
    DateRangeQuery,
    GenerateCalendarResponse, LockDatesRequest, LockDatesResponse, ManualBlockRequest, PriceQuote,
    ReleaseDatesRequest, UnavailableDatesResponse, UnbookDatesRequest,
};
pub use messages::{
    BOOKING_EXCHANGE, BookingCancelled, BusMessage, RoutingKey, VerificationOutcome,
    VerificationRequest,
};
pub use property::{PropertySnapshot, PropertyStatus};
pub use user::TenantProfile;

/// Error body returned by every non-2xx response of the Rentchain HTTP APIs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error kind, e.g. `conflict` or `invalid_or_expired_lock`.
    pub error: String,
    pub message: String,
}
