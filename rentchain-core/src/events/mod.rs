//! In-process event bus between the booking, property and verifier sides.
//!
//! # Event Flow
//!
//! 1. Orchestrator publishes `TRANSACTION_VERIFICATION` -> `VerificationWorker`
//! 2. `VerificationWorker` publishes `PAYMENT_SUCCESS` / `PAYMENT_FAILED` -> `PaymentStatusListener`
//! 3. `EscrowWatcher` publishes `PAYMENT_COMPLETED` -> `PaymentStatusListener`
//! 4. Orchestrator publishes `BOOKING_CANCELLED` -> `CancellationListener`
//!
//! Delivery is at-least-once. Consumers ack only after the message was
//! handled, and every handler is idempotent. A nacked message comes back
//! after a wait that doubles per attempt; the payment status queue never
//! dead-letters.

pub mod bus;
pub mod channels;
pub mod types;

pub use bus::{
    BusError, DEFAULT_REDELIVERY_BACKOFF, Delivery, EventBus, EventPublisher,
    MAX_REDELIVERY_BACKOFF, QueueReceiver,
};
pub use channels::DEFAULT_CHANNEL_BUFFER;
pub use types::{
    BOOKING_CANCELLED_QUEUE, Envelope, PAYMENT_STATUS_QUEUE, TRANSACTION_VERIFICATION_QUEUE,
};
