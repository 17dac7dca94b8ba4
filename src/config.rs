//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (node API key, wallet key) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`. Ether amounts are
//! written as decimal strings and converted to wei once, in `policy()`.

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::ledger::alloy_ledger::alchemy_ws_url;
use crate::storage::DEFAULT_DATABASE_PATH;
use crate::types::{parse_eth, SniperError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub node: NodeConfig,
    pub wallet: WalletConfig,
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    /// Alchemy network slug, e.g. "base-mainnet".
    pub network: String,
    pub api_key_env: String,
    /// Full WebSocket URL; overrides the Alchemy URL when set.
    #[serde(default)]
    pub ws_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WalletConfig {
    pub private_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Factory/router contract whose inbound transactions are watched.
    pub tracked_contract: Address,
    /// Minimum inbound value (ETH) for a transaction to qualify.
    pub min_value_eth: String,
    /// Fixed amount (ETH) spent on every buy.
    pub buy_value_eth: String,
    #[serde(default = "default_true")]
    pub buy_enabled: bool,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Most heights filled in when the feed skips ahead.
    #[serde(default = "default_max_backfill")]
    pub max_backfill: u64,
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PortfolioConfig {
    /// Token contracts reported by `info --all`.
    #[serde(default)]
    pub contracts: Vec<Address>,
    /// First block scanned for our own buys.
    #[serde(default = "default_spend_from_block")]
    pub spend_from_block: u64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            contracts: Vec::new(),
            spend_from_block: default_spend_from_block(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8088,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Also write plain-text logs to this file.
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub json: bool,
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    64
}

fn default_max_backfill() -> u64 {
    16
}

fn default_confirmation_timeout() -> u64 {
    120
}

fn default_spend_from_block() -> u64 {
    22_119_142
}

/// Thresholds and switches the monitor runs with. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub tracked_contract: Address,
    pub min_value: U256,
    pub buy_value: U256,
    pub buy_enabled: bool,
    pub max_backfill: u64,
    pub confirmation_timeout: Duration,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the monitor cannot run with.
    pub fn validate(&self) -> Result<(), SniperError> {
        self.policy().map(|_| ())
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Build the monitor policy, converting ether strings to wei.
    pub fn policy(&self) -> Result<Policy, SniperError> {
        let min_value = parse_eth(&self.monitor.min_value_eth)?;
        let buy_value = parse_eth(&self.monitor.buy_value_eth)?;
        if buy_value.is_zero() {
            return Err(SniperError::Config("buy_value_eth must be greater than zero".into()));
        }
        if self.monitor.queue_capacity == 0 {
            return Err(SniperError::Config("queue_capacity must be at least 1".into()));
        }
        Ok(Policy {
            tracked_contract: self.monitor.tracked_contract,
            min_value,
            buy_value,
            buy_enabled: self.monitor.buy_enabled,
            max_backfill: self.monitor.max_backfill,
            confirmation_timeout: Duration::from_secs(self.monitor.confirmation_timeout_secs),
        })
    }

    /// WebSocket endpoint of the node, resolving the API key from the env.
    pub fn ws_url(&self) -> Result<SecretString> {
        if let Some(url) = &self.node.ws_url {
            return Ok(SecretString::new(url.clone()));
        }
        let key = SecretString::new(Self::resolve_env(&self.node.api_key_env)?);
        Ok(SecretString::new(alchemy_ws_url(&self.node.network, key.expose_secret())))
    }

    /// Wallet signing key from the env.
    pub fn private_key(&self) -> Result<SecretString> {
        Ok(SecretString::new(Self::resolve_env(&self.wallet.private_key_env)?))
    }
}
