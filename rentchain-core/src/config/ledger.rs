//! Blockchain node and escrow contract settings.

use alloy_primitives::Address;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of an Ethereum node.
    pub rpc_url: Url,
    pub escrow_address: Address,
    /// Poll interval of the escrow event watcher.
    pub watch_interval: Duration,
    pub watch_enabled: bool,
}
