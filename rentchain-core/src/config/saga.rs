//! Timing of locks, sweeps and redeliveries.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SagaConfig {
    /// How long a provisional lock holds its days.
    pub lock_window: Duration,
    /// Age after which an unpaid booking is cancelled.
    pub pending_timeout: Duration,
    pub lock_sweep_interval: Duration,
    pub pending_sweep_interval: Duration,
    /// Interval of the CONFIRMED -> ACTIVE -> COMPLETED sweep.
    pub lifecycle_sweep_interval: Duration,
    /// Deliveries beyond this many redeliveries are dead-lettered.
    pub max_redeliveries: u32,
    /// Delay before the first redelivery, doubled on each further attempt.
    pub redelivery_backoff: Duration,
    /// Age after which a booking still in PAYMENT_PROCESSING is verified again.
    pub reverify_after: Duration,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            lock_window: Duration::from_secs(15 * 60),
            pending_timeout: Duration::from_secs(15 * 60),
            lock_sweep_interval: Duration::from_secs(60),
            pending_sweep_interval: Duration::from_secs(300),
            lifecycle_sweep_interval: Duration::from_secs(3600),
            max_redeliveries: 5,
            redelivery_backoff: Duration::from_millis(500),
            reverify_after: Duration::from_secs(300),
        }
    }
}
