//! PaymentStatusListener processor.
//!
//! Feeds `PAYMENT_SUCCESS`, `PAYMENT_FAILED` and `PAYMENT_COMPLETED` into the
//! orchestrator. Outcomes are handled one at a time, so two deliveries of the
//! same outcome can never race each other into a double commit.

use crate::events::{Delivery, QueueReceiver};
use crate::reservation::BookingError;
use crate::reservation::orchestrator::{OutcomeEffect, ReservationOrchestrator};
use kanau::processor::Processor;
use rentchain_sdk::objects::{BusMessage, RoutingKey, VerificationOutcome};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// A payment status event as it came off the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentStatusEvent {
    pub routing_key: RoutingKey,
    pub outcome: VerificationOutcome,
}

pub struct PaymentStatusListener {
    orchestrator: ReservationOrchestrator,
}

impl PaymentStatusListener {
    pub fn new(orchestrator: ReservationOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, mut queue: QueueReceiver) {
        info!(queue = queue.name(), "PaymentStatusListener started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("PaymentStatusListener received shutdown signal");
                        break;
                    }
                }

                Some(delivery) = queue.recv() => {
                    self.handle(delivery).await;
                }

                else => {
                    info!("Payment status queue closed");
                    break;
                }
            }
        }

        info!("PaymentStatusListener shutdown complete");
    }

    async fn handle(&self, delivery: Delivery) {
        let outcome = match delivery.decode() {
            Ok(BusMessage::VerificationOutcome(outcome)) => outcome,
            Ok(other) => {
                warn!(message = ?other, "Unexpected message on payment status queue, dropped");
                delivery.ack();
                return;
            }
            Err(e) => {
                warn!(error = %e, "Undecodable payment status, dropped");
                delivery.ack();
                return;
            }
        };
        let event = PaymentStatusEvent {
            routing_key: delivery.routing_key(),
            outcome,
        };

        match self.process(event).await {
            Ok(effect) => {
                debug!(?effect, "Payment status handled");
                delivery.ack();
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, attempt = delivery.attempt(), "Payment status handling failed, requeueing");
                delivery.nack();
            }
            Err(e) => {
                error!(error = %e, "Payment status rejected");
                delivery.ack();
            }
        }
    }
}

impl Processor<PaymentStatusEvent> for PaymentStatusListener {
    type Output = OutcomeEffect;
    type Error = BookingError;

    async fn process(&self, event: PaymentStatusEvent) -> Result<OutcomeEffect, BookingError> {
        self.orchestrator
            .handle_outcome(event.routing_key, &event.outcome)
            .await
    }
}
