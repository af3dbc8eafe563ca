//! Configuration for the back-office daemon.
//!
//! Loaded from TOML. Both processors carry their own daemon endpoint and
//! timeout so an operator can point the unlocker and the payer at different
//! nodes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Platform data directory for the pool (`~/.sero-pool`).
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sero-pool")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    pub storage: StorageConfig,
    pub unlocker: UnlockerConfig,
    pub payouts: PayoutsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sled" or "memory" (memory is for tests and dry runs).
    pub backend: String,
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockerConfig {
    pub enabled: bool,
    /// Percent of block revenue kept by the pool, 0..=100.
    pub pool_fee: f64,
    /// Optional base58 address credited with the pool's share.
    #[serde(default)]
    pub pool_fee_address: String,
    /// Maturity depth for final crediting. Must be at least twice the
    /// candidate search half-window.
    pub depth: u64,
    /// Depth at which candidates are promoted to immature.
    pub immature_depth: u64,
    /// Keep tx-fee revenue for the pool instead of sharing it.
    #[serde(default)]
    pub keep_tx_fees: bool,
    pub interval_secs: u64,
    pub daemon: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayoutsConfig {
    pub enabled: bool,
    pub require_peers: u64,
    pub interval_secs: u64,
    pub daemon: String,
    pub timeout_secs: u64,
    /// Pool's own base58 address payouts are sent from.
    pub address: String,
    pub gas: u64,
    pub gas_price: u64,
    #[serde(default)]
    pub auto_gas: bool,
    /// Batched two-phase exchange mode instead of one tx per payee.
    #[serde(default)]
    pub exchange: bool,
    /// Minimum balance in Shannon; a payee is swept only when strictly above.
    pub threshold: u64,
    #[serde(default)]
    pub bgsave: bool,
}

impl PayoutsConfig {
    pub fn gas_hex(&self) -> String {
        format!("0x{:x}", self.gas)
    }

    pub fn gas_price_hex(&self) -> String {
        format!("0x{:x}", self.gas_price)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_daemon() -> String {
    "http://127.0.0.1:8545".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                name: "sero-pool".to_string(),
            },
            storage: StorageConfig {
                backend: "sled".to_string(),
                data_dir: String::new(),
            },
            unlocker: UnlockerConfig {
                enabled: true,
                pool_fee: 1.0,
                pool_fee_address: String::new(),
                depth: 120,
                immature_depth: 30,
                keep_tx_fees: false,
                interval_secs: 600,
                daemon: default_daemon(),
                timeout_secs: 10,
            },
            payouts: PayoutsConfig {
                enabled: false,
                require_peers: 5,
                interval_secs: 7200,
                daemon: default_daemon(),
                timeout_secs: 10,
                address: String::new(),
                gas: 25_000,
                gas_price: 1_000_000_000,
                auto_gas: true,
                exchange: false,
                threshold: 500_000_000,
                bgsave: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        if config.storage.data_dir.is_empty() {
            config.storage.data_dir = default_data_dir().to_string_lossy().to_string();
        }
        Ok(config)
    }

    pub fn save_to_file(&self, path: &str) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.payouts.threshold, config.payouts.threshold);
        assert_eq!(parsed.unlocker.depth, 120);
        assert!(!parsed.payouts.exchange);
    }

    #[test]
    fn gas_fields_render_as_hex_quantities() {
        let payouts = Config::default().payouts;
        assert_eq!(payouts.gas_hex(), "0x61a8");
        assert_eq!(payouts.gas_price_hex(), "0x3b9aca00");
    }
}
