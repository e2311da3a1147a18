use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};

/// Interval for periodic sweeps.
///
/// The first tick fires after one full `period` rather than immediately, and
/// ticks missed while a sweep runs long are delayed instead of bursting.
pub fn sweep_ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
