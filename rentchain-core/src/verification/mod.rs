//! Structural verification of escrow payments.

pub mod ledger;
pub mod verifier;

pub use ledger::{JsonRpcLedger, LedgerClient, LedgerError, LogEntry, LogFilter, TransactionReceipt};
pub use verifier::{PaymentVerifier, VerificationFailure};

use alloy_primitives::{B256, b256};

/// topic0 of `DepositMade(uint256 indexed rentalId, uint256 amount)`.
pub const DEPOSIT_MADE_TOPIC: B256 =
    b256!("0793979a87d9a8a3698d9afc4736042bcc2a41b10151127638dcdef36ede4ce1");

/// topic0 of `FundsReleased(uint256 indexed rentalId, address recipient, uint256 amount)`.
pub const FUNDS_RELEASED_TOPIC: B256 =
    b256!("6e3c6096795c8298a218b2cfb8bde42726ff7c9a3d27b4d3ba41ab7f74feb5fb");
