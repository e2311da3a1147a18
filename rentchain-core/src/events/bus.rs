//! Topic exchange with named, bounded queues and explicit acknowledgement.

use super::channels::{QueueChannelReceiver, QueueSender, queue_channel};
use super::types::Envelope;
use bytes::Bytes;
use rentchain_sdk::objects::{BOOKING_EXCHANGE, BusMessage, RoutingKey};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// Wait before the first redelivery of a nacked message.
pub const DEFAULT_REDELIVERY_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound of the per-attempt redelivery wait.
pub const MAX_REDELIVERY_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("queue {0} is closed")]
    Closed(&'static str),
}

/// Anything that can put a message on the booking exchange.
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, routing_key: RoutingKey, message: &BusMessage) -> Result<(), BusError>;
}

#[derive(Debug, Clone)]
struct BoundQueue {
    name: &'static str,
    tx: QueueSender,
}

/// The booking exchange.
///
/// Queues are declared up front with [`EventBus::declare_queue`]; the bus is
/// then cloned into every publisher. A message published under a routing key
/// is copied into every queue bound to that key.
#[derive(Debug, Clone)]
pub struct EventBus {
    bindings: HashMap<RoutingKey, Vec<BoundQueue>>,
    max_redeliveries: u32,
    redelivery_backoff: Duration,
}

impl EventBus {
    pub fn new(max_redeliveries: u32) -> Self {
        Self {
            bindings: HashMap::new(),
            max_redeliveries,
            redelivery_backoff: DEFAULT_REDELIVERY_BACKOFF,
        }
    }

    /// Wait before the first redelivery. Each further attempt waits twice as
    /// long, up to [`MAX_REDELIVERY_BACKOFF`].
    pub fn with_redelivery_backoff(mut self, backoff: Duration) -> Self {
        self.redelivery_backoff = backoff;
        self
    }

    /// Declare a queue bound to `routing_keys` and return its consumer end.
    pub fn declare_queue(
        &mut self,
        name: &'static str,
        routing_keys: &[RoutingKey],
    ) -> QueueReceiver {
        let (tx, rx) = queue_channel();
        for key in routing_keys {
            self.bindings.entry(*key).or_default().push(BoundQueue {
                name,
                tx: tx.clone(),
            });
        }
        tracing::debug!(exchange = BOOKING_EXCHANGE, queue = name, ?routing_keys, "Queue declared");
        QueueReceiver {
            name,
            rx,
            requeue: tx.downgrade(),
            max_redeliveries: Some(self.max_redeliveries),
            backoff: self.redelivery_backoff,
        }
    }
}

#[async_trait::async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, routing_key: RoutingKey, message: &BusMessage) -> Result<(), BusError> {
        let payload = Bytes::from(message.to_json()?);
        let Some(queues) = self.bindings.get(&routing_key) else {
            tracing::debug!(%routing_key, "No queue bound, message dropped");
            return Ok(());
        };
        for queue in queues {
            queue
                .tx
                .send(Envelope::new(routing_key, payload.clone()))
                .await
                .map_err(|_| BusError::Closed(queue.name))?;
        }
        tracing::debug!(%routing_key, queues = queues.len(), "Message published");
        Ok(())
    }
}

/// Consumer end of a queue.
pub struct QueueReceiver {
    name: &'static str,
    rx: QueueChannelReceiver,
    requeue: mpsc::WeakSender<Envelope>,
    /// `None` keeps redelivering forever.
    max_redeliveries: Option<u32>,
    backoff: Duration,
}

impl QueueReceiver {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Never dead-letter: a nacked message keeps coming back, at most
    /// [`MAX_REDELIVERY_BACKOFF`] apart.
    pub fn without_dead_letter(mut self) -> Self {
        self.max_redeliveries = None;
        self
    }

    /// Wait for the next delivery. Returns `None` once every publisher is gone.
    ///
    /// Messages redelivered more than `max_redeliveries` times are
    /// dead-lettered here and never handed out again.
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            let envelope = self.rx.recv().await?;
            if let Some(max) = self.max_redeliveries
                && envelope.attempt > max
            {
                tracing::error!(
                    queue = self.name,
                    message_id = %envelope.message_id,
                    routing_key = %envelope.routing_key,
                    attempts = envelope.attempt,
                    payload = %String::from_utf8_lossy(&envelope.payload),
                    "Message dead-lettered after too many redeliveries"
                );
                continue;
            }
            return Some(Delivery {
                queue: self.name,
                envelope,
                requeue: self.requeue.clone(),
                backoff: self.backoff,
                settled: false,
            });
        }
    }
}

/// Wait before redelivery number `attempt` (1-based).
pub fn redelivery_delay(backoff: Duration, attempt: u32) -> Duration {
    let doublings = attempt.saturating_sub(1).min(16);
    backoff
        .saturating_mul(1u32 << doublings)
        .min(MAX_REDELIVERY_BACKOFF)
}

/// A message handed to a consumer.
///
/// It must be settled with [`Delivery::ack`] or [`Delivery::nack`]. A delivery
/// dropped unsettled goes back to its queue as if it had been nacked.
pub struct Delivery {
    queue: &'static str,
    envelope: Envelope,
    requeue: mpsc::WeakSender<Envelope>,
    backoff: Duration,
    settled: bool,
}

impl Delivery {
    pub fn routing_key(&self) -> RoutingKey {
        self.envelope.routing_key
    }

    pub fn redelivered(&self) -> bool {
        self.envelope.redelivered
    }

    pub fn attempt(&self) -> u32 {
        self.envelope.attempt
    }

    pub fn payload(&self) -> &[u8] {
        &self.envelope.payload
    }

    pub fn decode(&self) -> Result<BusMessage, serde_json::Error> {
        BusMessage::from_json(&self.envelope.payload)
    }

    pub fn ack(mut self) {
        self.settled = true;
    }

    /// Put the message back on its queue for another attempt.
    ///
    /// Returns at once. The message is requeued from a background task after
    /// a wait that doubles with every attempt, so a consumer never blocks on
    /// its own full queue.
    pub fn nack(mut self) {
        self.settled = true;
        self.schedule_requeue();
    }

    fn schedule_requeue(&self) {
        let envelope = self.envelope.clone().redeliver();
        let delay = redelivery_delay(self.backoff, envelope.attempt);
        let queue = self.queue;
        let requeue = self.requeue.clone();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(queue, message_id = %envelope.message_id, "No runtime to requeue on, message lost");
            return;
        };
        tracing::debug!(
            queue,
            message_id = %envelope.message_id,
            attempt = envelope.attempt,
            ?delay,
            "Redelivery scheduled"
        );
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            // upgraded only now, so a pending redelivery does not keep a drained queue open
            let Some(tx) = requeue.upgrade() else {
                tracing::warn!(queue, message_id = %envelope.message_id, "Queue gone, nacked message lost");
                return;
            };
            if tx.send(envelope).await.is_err() {
                tracing::warn!(queue, "Queue closed while requeueing");
            }
        });
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        tracing::warn!(
            queue = self.queue,
            message_id = %self.envelope.message_id,
            "Delivery dropped without ack, requeueing"
        );
        self.schedule_requeue();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::channels::DEFAULT_CHANNEL_BUFFER;
    use crate::events::types::{PAYMENT_STATUS_QUEUE, TRANSACTION_VERIFICATION_QUEUE};
    use rentchain_sdk::objects::{VerificationOutcome, VerificationRequest};
    use tokio::time::Instant;

    fn request(booking_id: i64) -> BusMessage {
        BusMessage::VerificationRequest(VerificationRequest {
            booking_id,
            tx_hash: "0xabc".into(),
            expected_amount: None,
            blockchain_rental_id: None,
        })
    }

    #[tokio::test]
    async fn test_routing_by_key() {
        let mut bus = EventBus::new(3);
        let mut verification =
            bus.declare_queue(TRANSACTION_VERIFICATION_QUEUE, &[RoutingKey::TransactionVerification]);
        let mut status = bus.declare_queue(
            PAYMENT_STATUS_QUEUE,
            &[RoutingKey::PaymentSuccess, RoutingKey::PaymentFailed],
        );

        bus.publish(RoutingKey::TransactionVerification, &request(1))
            .await
            .unwrap();
        let outcome = BusMessage::VerificationOutcome(VerificationOutcome::success(1, "0xabc"));
        bus.publish(RoutingKey::PaymentSuccess, &outcome).await.unwrap();
        // unbound key is dropped
        bus.publish(RoutingKey::BookingCancelled, &outcome).await.unwrap();

        let delivery = verification.recv().await.unwrap();
        assert_eq!(delivery.routing_key(), RoutingKey::TransactionVerification);
        assert_eq!(delivery.decode().unwrap(), request(1));
        delivery.ack();

        let delivery = status.recv().await.unwrap();
        assert_eq!(delivery.decode().unwrap(), outcome);
        delivery.ack();
        assert!(status.rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nack_redelivers_then_dead_letters() {
        let mut bus = EventBus::new(2);
        let mut queue =
            bus.declare_queue(TRANSACTION_VERIFICATION_QUEUE, &[RoutingKey::TransactionVerification]);
        bus.publish(RoutingKey::TransactionVerification, &request(9))
            .await
            .unwrap();

        for attempt in 0..=2 {
            let delivery = queue.recv().await.unwrap();
            assert_eq!(delivery.attempt(), attempt);
            assert_eq!(delivery.redelivered(), attempt > 0);
            delivery.nack();
        }

        // the fourth delivery would exceed two redeliveries
        tokio::time::sleep(MAX_REDELIVERY_BACKOFF).await;
        bus.publish(RoutingKey::TransactionVerification, &request(10))
            .await
            .unwrap();
        let next = queue.recv().await.unwrap();
        assert_eq!(next.decode().unwrap(), request(10));
        next.ack();
    }

    #[tokio::test(start_paused = true)]
    async fn test_redelivery_waits_longer_each_attempt() {
        let backoff = Duration::from_millis(100);
        let mut bus = EventBus::new(5).with_redelivery_backoff(backoff);
        let mut queue =
            bus.declare_queue(TRANSACTION_VERIFICATION_QUEUE, &[RoutingKey::TransactionVerification]);
        bus.publish(RoutingKey::TransactionVerification, &request(4))
            .await
            .unwrap();

        let mut delivery = queue.recv().await.unwrap();
        for expected_ms in [100, 200, 400] {
            let nacked_at = Instant::now();
            delivery.nack();
            delivery = queue.recv().await.unwrap();
            assert!(nacked_at.elapsed() >= Duration::from_millis(expected_ms));
        }
        assert_eq!(delivery.attempt(), 3);
        delivery.ack();

        assert_eq!(redelivery_delay(backoff, 1), backoff);
        assert_eq!(redelivery_delay(backoff, 40), MAX_REDELIVERY_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nack_on_full_queue_does_not_block() {
        let mut bus = EventBus::new(3);
        let mut queue =
            bus.declare_queue(TRANSACTION_VERIFICATION_QUEUE, &[RoutingKey::TransactionVerification]);
        bus.publish(RoutingKey::TransactionVerification, &request(0))
            .await
            .unwrap();
        let first = queue.recv().await.unwrap();

        for id in 1..=DEFAULT_CHANNEL_BUFFER as i64 {
            bus.publish(RoutingKey::TransactionVerification, &request(id))
                .await
                .unwrap();
        }
        // the queue is full and only this task drains it
        first.nack();

        let mut seen = Vec::new();
        for _ in 0..=DEFAULT_CHANNEL_BUFFER {
            let delivery = queue.recv().await.unwrap();
            let BusMessage::VerificationRequest(request) = delivery.decode().unwrap() else {
                panic!("expected a verification request");
            };
            seen.push((request.booking_id, delivery.attempt()));
            delivery.ack();
        }
        assert_eq!(seen.len(), DEFAULT_CHANNEL_BUFFER + 1);
        assert!(seen.contains(&(0, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_without_dead_letter_keeps_redelivering() {
        let mut bus = EventBus::new(1);
        let mut queue = bus
            .declare_queue(PAYMENT_STATUS_QUEUE, &[RoutingKey::PaymentSuccess])
            .without_dead_letter();
        let outcome = BusMessage::VerificationOutcome(VerificationOutcome::success(1, "0xabc"));
        bus.publish(RoutingKey::PaymentSuccess, &outcome).await.unwrap();

        for attempt in 0..10 {
            let delivery = queue.recv().await.unwrap();
            assert_eq!(delivery.attempt(), attempt);
            delivery.nack();
        }
        let last = queue.recv().await.unwrap();
        assert_eq!(last.decode().unwrap(), outcome);
        last.ack();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsettled_delivery_is_requeued() {
        let mut bus = EventBus::new(5);
        let mut queue =
            bus.declare_queue(TRANSACTION_VERIFICATION_QUEUE, &[RoutingKey::TransactionVerification]);
        bus.publish(RoutingKey::TransactionVerification, &request(3))
            .await
            .unwrap();

        drop(queue.recv().await.unwrap());

        let again = queue.recv().await.unwrap();
        assert!(again.redelivered());
        assert_eq!(again.decode().unwrap(), request(3));
        again.ack();
    }

    #[tokio::test]
    async fn test_publish_to_closed_queue_fails() {
        let mut bus = EventBus::new(5);
        drop(bus.declare_queue(TRANSACTION_VERIFICATION_QUEUE, &[RoutingKey::TransactionVerification]));
        assert!(matches!(
            bus.publish(RoutingKey::TransactionVerification, &request(1)).await,
            Err(BusError::Closed(TRANSACTION_VERIFICATION_QUEUE))
        ));
    }
}
