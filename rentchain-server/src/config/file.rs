//! TOML file configuration structures.
//!
//! These structs directly map to the `rentchain.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub saga: SagaConfig,
    pub ledger: LedgerConfig,
    pub services: ServicesConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Saga timing, in seconds unless the name says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaConfig {
    #[serde(default = "default_lock_window")]
    pub lock_window_secs: u64,
    #[serde(default = "default_pending_timeout")]
    pub pending_timeout_secs: u64,
    #[serde(default = "default_lock_sweep_interval")]
    pub lock_sweep_interval_secs: u64,
    #[serde(default = "default_pending_sweep_interval")]
    pub pending_sweep_interval_secs: u64,
    #[serde(default = "default_lifecycle_sweep_interval")]
    pub lifecycle_sweep_interval_secs: u64,
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u32,
    /// Delay before the first redelivery, doubled on each further attempt.
    #[serde(default = "default_redelivery_backoff")]
    pub redelivery_backoff_ms: u64,
    #[serde(default = "default_reverify_after")]
    pub reverify_after_secs: u64,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            lock_window_secs: default_lock_window(),
            pending_timeout_secs: default_pending_timeout(),
            lock_sweep_interval_secs: default_lock_sweep_interval(),
            pending_sweep_interval_secs: default_pending_sweep_interval(),
            lifecycle_sweep_interval_secs: default_lifecycle_sweep_interval(),
            max_redeliveries: default_max_redeliveries(),
            redelivery_backoff_ms: default_redelivery_backoff(),
            reverify_after_secs: default_reverify_after(),
        }
    }
}

fn default_lock_window() -> u64 {
    900
}

fn default_pending_timeout() -> u64 {
    900
}

fn default_lock_sweep_interval() -> u64 {
    60
}

fn default_pending_sweep_interval() -> u64 {
    300
}

fn default_lifecycle_sweep_interval() -> u64 {
    3600
}

fn default_max_redeliveries() -> u32 {
    5
}

fn default_redelivery_backoff() -> u64 {
    500
}

fn default_reverify_after() -> u64 {
    300
}

/// Blockchain node and escrow contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: Url,
    pub escrow_address: String,
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
    #[serde(default = "default_watch_enabled")]
    pub watch_enabled: bool,
}

fn default_watch_interval() -> u64 {
    15
}

fn default_watch_enabled() -> bool {
    true
}

/// Collaborating services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Remote property service. When absent the in-process lock manager is used.
    #[serde(default)]
    pub property_url: Option<Url>,
    pub user_url: Url,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parsing() {
        let toml_str = r#"
[ledger]
rpc_url = "http://127.0.0.1:8545"
escrow_address = "0x00000000000000000000000000000000000000ee"

[services]
user_url = "http://users.internal:8080"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.saga.lock_window_secs, 900);
        assert_eq!(config.saga.max_redeliveries, 5);
        assert!(config.ledger.watch_enabled);
        assert!(config.services.property_url.is_none());
    }

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[saga]
lock_window_secs = 1200
pending_timeout_secs = 600
lock_sweep_interval_secs = 30
pending_sweep_interval_secs = 120
lifecycle_sweep_interval_secs = 1800
max_redeliveries = 2

[ledger]
rpc_url = "https://sepolia.example.org"
escrow_address = "0x00000000000000000000000000000000000000ee"
watch_interval_secs = 5
watch_enabled = false

[services]
property_url = "http://properties.internal:8080"
user_url = "http://users.internal:8080"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.saga.pending_timeout_secs, 600);
        assert_eq!(config.saga.max_redeliveries, 2);
        assert!(!config.ledger.watch_enabled);
        assert_eq!(
            config.services.property_url.unwrap().host_str(),
            Some("properties.internal")
        );
    }

    #[test]
    fn test_ledger_section_is_required() {
        let toml_str = r#"
[services]
user_url = "http://users.internal:8080"
"#;
        assert!(toml::from_str::<FileConfig>(toml_str).is_err());
    }
}
