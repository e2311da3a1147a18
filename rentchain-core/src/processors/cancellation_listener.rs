//! CancellationListener processor.
//!
//! The property side of `BOOKING_CANCELLED`: whatever lock the cancelled
//! booking still holds is released. Release is idempotent, so a lock the
//! orchestrator already gave back costs nothing.

use crate::calendar::{LockError, LockManager};
use crate::events::{Delivery, QueueReceiver};
use kanau::processor::Processor;
use rentchain_sdk::objects::{BookingCancelled, BusMessage};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct CancellationListener {
    locks: LockManager,
}

impl CancellationListener {
    pub fn new(locks: LockManager) -> Self {
        Self { locks }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, mut queue: QueueReceiver) {
        info!(queue = queue.name(), "CancellationListener started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("CancellationListener received shutdown signal");
                        break;
                    }
                }

                Some(delivery) = queue.recv() => {
                    self.handle(delivery).await;
                }

                else => {
                    info!("Cancellation queue closed");
                    break;
                }
            }
        }

        info!("CancellationListener shutdown complete");
    }

    async fn handle(&self, delivery: Delivery) {
        let notice = match delivery.decode() {
            Ok(BusMessage::BookingCancelled(notice)) => notice,
            Ok(other) => {
                warn!(message = ?other, "Unexpected message on cancellation queue, dropped");
                delivery.ack();
                return;
            }
            Err(e) => {
                warn!(error = %e, "Undecodable cancellation notice, dropped");
                delivery.ack();
                return;
            }
        };

        match self.process(notice).await {
            Ok(_) => delivery.ack(),
            Err(LockError::Store(e)) => {
                warn!(error = %e, "Lock release failed, requeueing");
                delivery.nack();
            }
            Err(e) => {
                error!(error = %e, "Cancellation notice rejected");
                delivery.ack();
            }
        }
    }
}

impl Processor<BookingCancelled> for CancellationListener {
    type Output = usize;
    type Error = LockError;

    async fn process(&self, notice: BookingCancelled) -> Result<usize, LockError> {
        let released = self
            .locks
            .release(notice.property_id, notice.lock_token)
            .await?;
        debug!(
            booking_id = notice.booking_id,
            property_id = notice.property_id,
            released,
            "Cancellation processed"
        );
        Ok(released)
    }
}
