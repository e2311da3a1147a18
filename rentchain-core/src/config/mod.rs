//! Configuration types for the reservation saga.
//!
//! These are the validated runtime values shared across crates. Loading and
//! parsing the TOML file is handled by the server crate.

mod ledger;
mod saga;

pub use ledger::LedgerConfig;
pub use saga::SagaConfig;
