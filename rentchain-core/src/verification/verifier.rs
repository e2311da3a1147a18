//! Checks a transaction receipt against the booking it claims to pay for.

use super::DEPOSIT_MADE_TOPIC;
use super::ledger::{LedgerClient, LogEntry};
use crate::utils::evm::{decode_word, first_data_word, is_address, parse_word};
use alloy_primitives::{Address, U256};
use rentchain_sdk::objects::{VerificationOutcome, VerificationRequest, Wei};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a payment failed verification. The `Display` text is the outcome reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationFailure {
    #[error("invalid request: {0}")]
    Invalid(&'static str),

    #[error("transaction receipt not found")]
    NotFound,

    #[error("transaction reverted")]
    Reverted,

    #[error("wrong contract: transaction sent to {actual}, expected escrow {expected}")]
    WrongContract { expected: Address, actual: String },

    #[error("deposit event not found")]
    EventNotFound,

    #[error("amount mismatch: expected {expected} wei, found {found} wei")]
    AmountMismatch { expected: Wei, found: Wei },
}

#[derive(Clone)]
pub struct PaymentVerifier {
    ledger: Arc<dyn LedgerClient>,
    escrow_address: Address,
}

impl PaymentVerifier {
    pub fn new(ledger: Arc<dyn LedgerClient>, escrow_address: Address) -> Self {
        Self {
            ledger,
            escrow_address,
        }
    }

    /// Verify and turn the result into the outcome to publish.
    pub async fn outcome(&self, request: &VerificationRequest) -> VerificationOutcome {
        let mut outcome = match self.verify(request).await {
            Ok(()) => VerificationOutcome::success(request.booking_id, &request.tx_hash),
            Err(failure) => {
                VerificationOutcome::failure(request.booking_id, &request.tx_hash, failure.to_string())
            }
        };
        outcome.blockchain_rental_id = request.blockchain_rental_id;
        outcome
    }

    pub async fn verify(&self, request: &VerificationRequest) -> Result<(), VerificationFailure> {
        if request.booking_id <= 0 {
            return Err(VerificationFailure::Invalid("booking id missing"));
        }
        let tx_hash = request.tx_hash.trim();
        if tx_hash.is_empty() {
            return Err(VerificationFailure::Invalid("tx hash missing"));
        }

        let receipt = match self.ledger.transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => return Err(VerificationFailure::NotFound),
            Err(e) => {
                warn!(booking_id = request.booking_id, tx_hash, error = %e, "Receipt fetch failed");
                return Err(VerificationFailure::NotFound);
            }
        };

        if !receipt.succeeded() {
            return Err(VerificationFailure::Reverted);
        }

        // a receipt without a recipient still has to carry the escrow's deposit log
        if let Some(to) = receipt.to.as_deref()
            && !is_address(to, self.escrow_address)
        {
            return Err(VerificationFailure::WrongContract {
                expected: self.escrow_address,
                actual: to.to_string(),
            });
        }

        let expected_id = request.blockchain_rental_id.unwrap_or(request.booking_id);
        let expected_rental = u64::try_from(expected_id)
            .map(U256::from)
            .map_err(|_| VerificationFailure::Invalid("rental id negative"))?;
        let mut mismatched_amount = None;
        for log in receipt.logs.iter().filter(|log| self.is_deposit_log(log)) {
            let Some((rental_id, amount)) = decode_deposit(log) else {
                debug!(tx_hash, "Undecodable deposit log skipped");
                continue;
            };
            if rental_id != expected_rental {
                debug!(tx_hash, rental_id = %rental_id, expected_id, "Deposit for another rental skipped");
                continue;
            }
            if let Some(expected) = request.expected_amount
                && expected != amount
            {
                warn!(
                    booking_id = request.booking_id,
                    tx_hash,
                    expected = %expected,
                    found = %amount,
                    "Deposit amount mismatch"
                );
                mismatched_amount = Some(VerificationFailure::AmountMismatch {
                    expected,
                    found: amount,
                });
                continue;
            }

            info!(booking_id = request.booking_id, tx_hash, amount = %amount, "Payment verified");
            return Ok(());
        }

        Err(mismatched_amount.unwrap_or(VerificationFailure::EventNotFound))
    }

    fn is_deposit_log(&self, log: &LogEntry) -> bool {
        is_address(&log.address, self.escrow_address)
            && log.topics.first().and_then(|t| parse_word(t)) == Some(DEPOSIT_MADE_TOPIC)
    }
}

/// `(rental_id, amount)` of a deposit log.
fn decode_deposit(log: &LogEntry) -> Option<(U256, Wei)> {
    let rental_id = decode_word(log.topics.get(1)?)?;
    let amount = first_data_word(&log.data)?;
    Some((rental_id, Wei(amount)))
}
