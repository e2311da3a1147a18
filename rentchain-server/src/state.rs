//! Application state shared across all request handlers.

use rentchain_core::calendar::LockManager;
use rentchain_core::reservation::orchestrator::ReservationOrchestrator;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Property side: calendar, locks and quotes.
    pub locks: LockManager,
    /// Booking side.
    pub bookings: ReservationOrchestrator,
}

impl AppState {
    pub fn new(locks: LockManager, bookings: ReservationOrchestrator) -> Self {
        Self { locks, bookings }
    }
}
