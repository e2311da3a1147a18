//! Configuration module for rentchain-server.
//!
//! Loads the TOML file, applies CLI overrides and validates the result into
//! the runtime configuration types of `rentchain-core`.

pub mod file;

use crate::config::file::FileConfig;
use rentchain_core::config::{LedgerConfig, SagaConfig};
use rentchain_core::utils::evm::parse_address;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicesConfig {
    pub property_url: Option<Url>,
    pub user_url: Url,
}

impl ServicesConfig {
    /// Whether the calendar lives in this process rather than a property service.
    pub fn local_calendar(&self) -> bool {
        self.property_url.is_none()
    }
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub saga: SagaConfig,
    pub ledger: LedgerConfig,
    pub services: ServicesConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides and validate.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    fn load_str(&self, config_content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;
        build_loaded_config(file_config)
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let saga = &config.saga;
    let intervals = [
        ("saga.lock_window_secs", saga.lock_window_secs),
        ("saga.pending_timeout_secs", saga.pending_timeout_secs),
        ("saga.lock_sweep_interval_secs", saga.lock_sweep_interval_secs),
        ("saga.pending_sweep_interval_secs", saga.pending_sweep_interval_secs),
        ("saga.lifecycle_sweep_interval_secs", saga.lifecycle_sweep_interval_secs),
        ("saga.redelivery_backoff_ms", saga.redelivery_backoff_ms),
        ("saga.reverify_after_secs", saga.reverify_after_secs),
        ("ledger.watch_interval_secs", config.ledger.watch_interval_secs),
    ];
    if let Some((name, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
        return Err(ConfigError::ValidationError(format!("{name} must be positive")));
    }

    // an unpaid booking must be cancelled before its lock can be swept
    if saga.lock_window_secs < saga.pending_timeout_secs {
        return Err(ConfigError::ValidationError(
            "saga.lock_window_secs must be at least saga.pending_timeout_secs".into(),
        ));
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
    let saga = file_config.saga;
    let ledger = file_config.ledger;
    let escrow_address = parse_address(&ledger.escrow_address).ok_or_else(|| {
        ConfigError::ValidationError(format!(
            "ledger.escrow_address {} is not a 0x-prefixed 20-byte address",
            ledger.escrow_address
        ))
    })?;
    Ok(LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        saga: SagaConfig {
            lock_window: Duration::from_secs(saga.lock_window_secs),
            pending_timeout: Duration::from_secs(saga.pending_timeout_secs),
            lock_sweep_interval: Duration::from_secs(saga.lock_sweep_interval_secs),
            pending_sweep_interval: Duration::from_secs(saga.pending_sweep_interval_secs),
            lifecycle_sweep_interval: Duration::from_secs(saga.lifecycle_sweep_interval_secs),
            max_redeliveries: saga.max_redeliveries,
            redelivery_backoff: Duration::from_millis(saga.redelivery_backoff_ms),
            reverify_after: Duration::from_secs(saga.reverify_after_secs),
        },
        ledger: LedgerConfig {
            rpc_url: ledger.rpc_url,
            escrow_address,
            watch_interval: Duration::from_secs(ledger.watch_interval_secs),
            watch_enabled: ledger.watch_enabled,
        },
        services: ServicesConfig {
            property_url: file_config.services.property_url,
            user_url: file_config.services.user_url,
        },
    })
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
