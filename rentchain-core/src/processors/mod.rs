//! Long-running processors of the reservation saga.
//!
//! - `VerificationWorker`: Receives `TRANSACTION_VERIFICATION`, emits `PAYMENT_SUCCESS` / `PAYMENT_FAILED`
//! - `PaymentStatusListener`: Receives payment outcomes, drives the booking state machine
//! - `CancellationListener`: Receives `BOOKING_CANCELLED`, releases property locks
//! - `EscrowWatcher`: Polls the escrow contract, emits `PAYMENT_COMPLETED`
//! - `LockSweeper` / `BookingSweeper`: Periodic expiry and lifecycle sweeps

pub mod cancellation_listener;
pub mod escrow_watcher;
pub mod payment_status_listener;
pub mod sweepers;
pub mod verification_worker;

pub use cancellation_listener::CancellationListener;
pub use escrow_watcher::{EscrowWatcher, WatchError};
pub use payment_status_listener::{PaymentStatusEvent, PaymentStatusListener};
pub use sweepers::{BookingSweeper, LockSweeper};
pub use verification_worker::VerificationWorker;
