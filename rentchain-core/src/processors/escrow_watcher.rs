//! EscrowWatcher processor.
//!
//! Polls the escrow contract for `FundsReleased` events and publishes each
//! one as `PAYMENT_COMPLETED`. The watcher only knows the escrow's rental id,
//! so the outcome carries `booking_id = 0` and the orchestrator resolves the
//! booking through `blockchain_rental_id`.
//!
//! The cursor starts at the chain head when the watcher starts. Releases that
//! happened while it was down are not replayed; the lifecycle sweep completes
//! those bookings from their dates instead.

use crate::events::{BusError, EventPublisher};
use crate::utils::evm::decode_word;
use crate::utils::ticker::sweep_ticker;
use crate::verification::{FUNDS_RELEASED_TOPIC, LedgerClient, LedgerError, LogFilter};
use alloy_primitives::Address;
use rentchain_sdk::objects::{BusMessage, RoutingKey, VerificationOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Widest block range asked for in one `eth_getLogs` call.
const MAX_BLOCK_SPAN: u64 = 2_000;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("publish error: {0}")]
    Publish(#[from] BusError),
}

pub struct EscrowWatcher {
    ledger: Arc<dyn LedgerClient>,
    publisher: Arc<dyn EventPublisher>,
    escrow_address: Address,
    interval: Duration,
    /// Last block whose logs were published.
    cursor: Option<u64>,
}

impl EscrowWatcher {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        publisher: Arc<dyn EventPublisher>,
        escrow_address: Address,
        interval: Duration,
    ) -> Self {
        Self {
            ledger,
            publisher,
            escrow_address,
            interval,
            cursor: None,
        }
    }

    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(escrow = %self.escrow_address, interval = ?self.interval, "EscrowWatcher started");
        let mut ticker = sweep_ticker(self.interval);

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("EscrowWatcher received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.poll().await {
                        error!(error = %e, cursor = ?self.cursor, "Escrow poll failed");
                    }
                }
            }
        }

        info!("EscrowWatcher shutdown complete");
    }

    /// Publish the releases in blocks after the cursor. Returns how many were published.
    ///
    /// The cursor only moves past a block range once all of its events are on
    /// the exchange, so a failed publish is retried on the next poll.
    pub async fn poll(&mut self) -> Result<usize, WatchError> {
        let head = self.ledger.block_number().await?;
        let Some(cursor) = self.cursor else {
            debug!(head, "Escrow cursor initialised at chain head");
            self.cursor = Some(head);
            return Ok(0);
        };
        if head <= cursor {
            return Ok(0);
        }

        let from_block = cursor + 1;
        let to_block = head.min(cursor + MAX_BLOCK_SPAN);
        let logs = self
            .ledger
            .logs(&LogFilter {
                address: self.escrow_address,
                topic0: FUNDS_RELEASED_TOPIC,
                from_block,
                to_block,
            })
            .await?;

        let mut published = 0;
        for log in logs {
            let Some(rental_id) = log
                .topics
                .get(1)
                .and_then(|t| decode_word(t))
                .and_then(|id| i64::try_from(id).ok())
            else {
                warn!(topics = ?log.topics, "FundsReleased log without a usable rental id");
                continue;
            };
            let mut outcome =
                VerificationOutcome::success(0, log.transaction_hash.unwrap_or_default());
            outcome.blockchain_rental_id = Some(rental_id);
            self.publisher
                .publish(
                    RoutingKey::PaymentCompleted,
                    &BusMessage::VerificationOutcome(outcome),
                )
                .await?;
            info!(rental_id, "Escrow funds released");
            published += 1;
        }

        self.cursor = Some(to_block);
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, PAYMENT_STATUS_QUEUE};
    use crate::verification::DEPOSIT_MADE_TOPIC;
    use crate::utils::evm::parse_address;
    use crate::verification::testing::{ScriptedLedger, event_log, wide_event_log};
    use alloy_primitives::U256;

    const ESCROW: &str = "0x00000000000000000000000000000000000000EE";

    fn escrow_watcher(ledger: Arc<ScriptedLedger>, bus: EventBus) -> EscrowWatcher {
        let escrow = parse_address(ESCROW).unwrap();
        EscrowWatcher::new(ledger, Arc::new(bus), escrow, Duration::from_secs(15))
    }

    #[tokio::test]
    async fn test_publishes_releases_after_cursor() {
        let ledger = Arc::new(ScriptedLedger::default());
        ledger.set_head(100);
        // before the watcher started
        ledger.push_log(90, event_log(ESCROW, FUNDS_RELEASED_TOPIC, 1000, 1));

        let mut bus = EventBus::new(3);
        let mut queue = bus.declare_queue(PAYMENT_STATUS_QUEUE, &[RoutingKey::PaymentCompleted]);
        let mut watcher = escrow_watcher(ledger.clone(), bus);

        assert_eq!(watcher.poll().await.unwrap(), 0);

        let mut released = event_log(ESCROW, FUNDS_RELEASED_TOPIC, 1001, 1);
        released.transaction_hash = Some("0xfeed".into());
        ledger.push_log(101, released);
        ledger.push_log(101, event_log(ESCROW, DEPOSIT_MADE_TOPIC, 1002, 1));
        ledger.set_head(102);

        assert_eq!(watcher.poll().await.unwrap(), 1);
        assert_eq!(watcher.cursor, Some(102));
        assert_eq!(watcher.poll().await.unwrap(), 0);

        let delivery = queue.recv().await.unwrap();
        assert_eq!(delivery.routing_key(), RoutingKey::PaymentCompleted);
        let BusMessage::VerificationOutcome(outcome) = delivery.decode().unwrap() else {
            panic!("expected an outcome");
        };
        delivery.ack();
        assert_eq!(outcome.booking_id, 0);
        assert_eq!(outcome.blockchain_rental_id, Some(1001));
        assert_eq!(outcome.tx_hash, "0xfeed");
    }

    #[tokio::test]
    async fn test_rental_id_beyond_i64_is_skipped() {
        let ledger = Arc::new(ScriptedLedger::default());
        ledger.set_head(10);

        let mut bus = EventBus::new(3);
        let mut queue = bus.declare_queue(PAYMENT_STATUS_QUEUE, &[RoutingKey::PaymentCompleted]);
        let mut watcher = escrow_watcher(ledger.clone(), bus);
        assert_eq!(watcher.poll().await.unwrap(), 0);

        let oversized = U256::from(i64::MAX) + U256::from(1u8);
        ledger.push_log(11, wide_event_log(ESCROW, FUNDS_RELEASED_TOPIC, oversized, U256::ZERO));
        ledger.push_log(11, event_log(ESCROW, FUNDS_RELEASED_TOPIC, 42, 1));
        ledger.set_head(11);

        assert_eq!(watcher.poll().await.unwrap(), 1);
        let delivery = queue.recv().await.unwrap();
        let BusMessage::VerificationOutcome(outcome) = delivery.decode().unwrap() else {
            panic!("expected an outcome");
        };
        delivery.ack();
        assert_eq!(outcome.blockchain_rental_id, Some(42));
    }
}
