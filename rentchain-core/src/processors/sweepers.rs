//! Periodic sweeps.
//!
//! - `LockSweeper` frees expired provisional locks.
//! - `BookingSweeper` cancels unpaid bookings, asks again for verification of
//!   payments stuck in `PAYMENT_PROCESSING`, and moves paid bookings through
//!   `ACTIVE` to `COMPLETED` as their dates come and go.
//!
//! A failed sweep is logged and retried on the next tick.

use crate::calendar::LockManager;
use crate::reservation::orchestrator::ReservationOrchestrator;
use crate::utils::ticker::sweep_ticker;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

pub struct LockSweeper {
    locks: LockManager,
    interval: Duration,
}

impl LockSweeper {
    pub fn new(locks: LockManager, interval: Duration) -> Self {
        Self { locks, interval }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "LockSweeper started");
        let mut ticker = sweep_ticker(self.interval);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("LockSweeper received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match self.locks.sweep_expired().await {
                        Ok(0) => debug!("No expired locks"),
                        Ok(freed) => info!(freed, "Expired locks swept"),
                        Err(e) => error!(error = %e, "Lock sweep failed"),
                    }
                }
            }
        }

        info!("LockSweeper shutdown complete");
    }
}

pub struct BookingSweeper {
    orchestrator: ReservationOrchestrator,
    pending_interval: Duration,
    lifecycle_interval: Duration,
}

impl BookingSweeper {
    pub fn new(
        orchestrator: ReservationOrchestrator,
        pending_interval: Duration,
        lifecycle_interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            pending_interval,
            lifecycle_interval,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            pending_interval = ?self.pending_interval,
            lifecycle_interval = ?self.lifecycle_interval,
            "BookingSweeper started"
        );
        let mut pending_ticker = sweep_ticker(self.pending_interval);
        let mut lifecycle_ticker = sweep_ticker(self.lifecycle_interval);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("BookingSweeper received shutdown signal");
                        break;
                    }
                }

                _ = pending_ticker.tick() => {
                    match self.orchestrator.sweep_pending().await {
                        Ok(0) => debug!("No unpaid bookings past the timeout"),
                        Ok(cancelled) => info!(cancelled, "Unpaid bookings cancelled"),
                        Err(e) => error!(error = %e, "Pending booking sweep failed"),
                    }
                    match self.orchestrator.reverify_stale().await {
                        Ok(0) => debug!("No stuck payments"),
                        Ok(requested) => info!(requested, "Stuck payments sent for verification again"),
                        Err(e) => error!(error = %e, "Stuck payment sweep failed"),
                    }
                }

                _ = lifecycle_ticker.tick() => {
                    if let Err(e) = self.orchestrator.sweep_lifecycle().await {
                        error!(error = %e, "Lifecycle sweep failed");
                    }
                }
            }
        }

        info!("BookingSweeper shutdown complete");
    }
}
