//! Messages carried on the booking exchange.
//!
//! Every payload is a [`BusMessage`], an internally tagged enum whose `schema`
//! field names the message type and its version. Decoding ignores fields it
//! does not know, so a producer may add fields without breaking consumers.

use crate::objects::amount::Wei;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Name of the topic exchange every message is published on.
pub const BOOKING_EXCHANGE: &str = "booking.exchange";

/// Routing keys of the booking exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingKey {
    /// Booking service asks the verifier to check a payment.
    TransactionVerification,
    PaymentSuccess,
    PaymentFailed,
    /// Escrow funds were released to the owner; the stay is over.
    PaymentCompleted,
    BookingCancelled,
}

impl RoutingKey {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutingKey::TransactionVerification => "TRANSACTION_VERIFICATION",
            RoutingKey::PaymentSuccess => "PAYMENT_SUCCESS",
            RoutingKey::PaymentFailed => "PAYMENT_FAILED",
            RoutingKey::PaymentCompleted => "PAYMENT_COMPLETED",
            RoutingKey::BookingCancelled => "BOOKING_CANCELLED",
        }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to verify an on-chain payment for a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub booking_id: i64,
    #[serde(default)]
    pub tx_hash: String,
    /// Exact deposit the escrow event must carry. `None` skips the amount check.
    #[serde(default)]
    pub expected_amount: Option<Wei>,
    /// Id the escrow contract assigned to the rental, when it differs from the booking id.
    #[serde(default)]
    pub blockchain_rental_id: Option<i64>,
}

/// Result of a verification, or a lifecycle notice from the escrow watcher.
///
/// `(booking_id, tx_hash)` identifies the outcome for de-duplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub booking_id: i64,
    pub tx_hash: String,
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    /// Set when the producer only knows the escrow's rental id.
    #[serde(default)]
    pub blockchain_rental_id: Option<i64>,
}

impl VerificationOutcome {
    pub fn success(booking_id: i64, tx_hash: impl Into<String>) -> Self {
        Self {
            booking_id,
            tx_hash: tx_hash.into(),
            success: true,
            reason: None,
            blockchain_rental_id: None,
        }
    }

    pub fn failure(booking_id: i64, tx_hash: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            booking_id,
            tx_hash: tx_hash.into(),
            success: false,
            reason: Some(reason.into()),
            blockchain_rental_id: None,
        }
    }

    /// Routing key this outcome is published under.
    pub fn routing_key(&self) -> RoutingKey {
        if self.success {
            RoutingKey::PaymentSuccess
        } else {
            RoutingKey::PaymentFailed
        }
    }
}

/// Notice that a booking was cancelled, so its dates can be released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingCancelled {
    pub booking_id: i64,
    pub property_id: i64,
    pub lock_token: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Envelope of every payload on the booking exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "schema")]
pub enum BusMessage {
    #[serde(rename = "verification_request/v1")]
    VerificationRequest(VerificationRequest),
    #[serde(rename = "verification_outcome/v1")]
    VerificationOutcome(VerificationOutcome),
    #[serde(rename = "booking_cancelled/v1")]
    BookingCancelled(BookingCancelled),
}

impl BusMessage {
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
