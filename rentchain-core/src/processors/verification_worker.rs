//! VerificationWorker processor.
//!
//! Consumes `TRANSACTION_VERIFICATION`, checks the payment on chain and
//! publishes the result as `PAYMENT_SUCCESS` or `PAYMENT_FAILED`. The request
//! is acked only after the outcome is on the exchange.

use crate::events::{BusError, Delivery, EventPublisher, QueueReceiver};
use crate::verification::PaymentVerifier;
use kanau::processor::Processor;
use rentchain_sdk::objects::{BusMessage, VerificationOutcome, VerificationRequest};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct VerificationWorker {
    verifier: PaymentVerifier,
    publisher: Arc<dyn EventPublisher>,
}

impl VerificationWorker {
    pub fn new(verifier: PaymentVerifier, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            verifier,
            publisher,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, mut queue: QueueReceiver) {
        info!(queue = queue.name(), "VerificationWorker started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("VerificationWorker received shutdown signal");
                        break;
                    }
                }

                Some(delivery) = queue.recv() => {
                    self.handle(delivery).await;
                }

                else => {
                    info!("Verification queue closed");
                    break;
                }
            }
        }

        info!("VerificationWorker shutdown complete");
    }

    async fn handle(&self, delivery: Delivery) {
        let request = match delivery.decode() {
            Ok(BusMessage::VerificationRequest(request)) => request,
            Ok(other) => {
                warn!(message = ?other, "Unexpected message on verification queue, dropped");
                delivery.ack();
                return;
            }
            Err(e) => {
                warn!(error = %e, "Undecodable verification request, dropped");
                delivery.ack();
                return;
            }
        };
        debug!(
            booking_id = request.booking_id,
            redelivered = delivery.redelivered(),
            "Received verification request"
        );

        match self.process(request).await {
            Ok(_) => delivery.ack(),
            Err(e) => {
                error!(error = %e, "Failed to publish verification outcome");
                delivery.nack();
            }
        }
    }
}

impl Processor<VerificationRequest> for VerificationWorker {
    type Output = VerificationOutcome;
    type Error = BusError;

    async fn process(&self, request: VerificationRequest) -> Result<VerificationOutcome, BusError> {
        let outcome = self.verifier.outcome(&request).await;
        self.publisher
            .publish(
                outcome.routing_key(),
                &BusMessage::VerificationOutcome(outcome.clone()),
            )
            .await?;
        info!(
            booking_id = outcome.booking_id,
            success = outcome.success,
            reason = outcome.reason.as_deref().unwrap_or_default(),
            "Verification outcome published"
        );
        Ok(outcome)
    }
}
