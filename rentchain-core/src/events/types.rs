//! Queue names and the envelope carried through them.

use bytes::Bytes;
use rentchain_sdk::objects::RoutingKey;
use uuid::Uuid;

/// Bound to `TRANSACTION_VERIFICATION`.
pub const TRANSACTION_VERIFICATION_QUEUE: &str = "q.transaction-verification";
/// Bound to `PAYMENT_SUCCESS`, `PAYMENT_FAILED` and `PAYMENT_COMPLETED`.
pub const PAYMENT_STATUS_QUEUE: &str = "q.booking-payment-status";
/// Bound to `BOOKING_CANCELLED`.
pub const BOOKING_CANCELLED_QUEUE: &str = "q.property-booking-cancelled";

/// A published message as it sits in a queue.
///
/// The payload is the JSON encoding of a `BusMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub message_id: Uuid,
    pub routing_key: RoutingKey,
    pub payload: Bytes,
    /// Deliveries before this one.
    pub attempt: u32,
    pub redelivered: bool,
}

impl Envelope {
    pub fn new(routing_key: RoutingKey, payload: Bytes) -> Self {
        Self {
            message_id: Uuid::now_v7(),
            routing_key,
            payload,
            attempt: 0,
            redelivered: false,
        }
    }

    /// The same message, marked for another delivery.
    pub fn redeliver(mut self) -> Self {
        self.attempt = self.attempt.saturating_add(1);
        self.redelivered = true;
        self
    }
}
