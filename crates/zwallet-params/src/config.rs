//! Session configuration
//!
//! Everything a wallet session needs to decide policy: fees, memo limits,
//! confirmation thresholds, progress weighting and logging. Loaded from JSON;
//! every field has a default so partial files are accepted.

use crate::consensus::{MAX_MEMO_SIZE, MINERS_FEE};
use crate::network::{Network, NetworkType};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of confirmations before a mined transaction is settled
pub const DEFAULT_REQUIRED_CONFIRMATIONS: u32 = 10;

/// Default age, in blocks, after which a mined transaction is assumed
/// confirmed when the chain height is unknown
pub const DEFAULT_FALLBACK_BLOCKS: u32 = 25;

/// Default transparent balance that makes auto-shielding available (zatoshi)
pub const DEFAULT_AUTOSHIELD_THRESHOLD: u64 = 100_000;

/// Top-level session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Network the session runs against
    pub network: NetworkType,
    /// Fixed miners fee (zatoshi)
    pub miners_fee: u64,
    /// Smallest amount accepted for a send; defaults to the miners fee
    pub dust_threshold: Option<u64>,
    /// Maximum memo size in bytes
    pub max_memo_size: usize,
    /// Transparent balance at which auto-shielding is offered (zatoshi)
    pub autoshield_threshold: u64,
    /// Confirmation policy
    pub confirmations: ConfirmationConfig,
    /// Sync progress weighting
    pub progress: ProgressWeights,
    /// Capacity of the lifecycle transition broadcast channel
    pub transition_capacity: usize,
    /// Logging
    pub logging: LogConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            network: NetworkType::Mainnet,
            miners_fee: MINERS_FEE,
            dust_threshold: None,
            max_memo_size: MAX_MEMO_SIZE,
            autoshield_threshold: DEFAULT_AUTOSHIELD_THRESHOLD,
            confirmations: ConfirmationConfig::default(),
            progress: ProgressWeights::default(),
            transition_capacity: 64,
            logging: LogConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Config for the given network with all other values defaulted
    pub fn for_network(network: NetworkType) -> Self {
        Self {
            network,
            ..Default::default()
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Network parameters for the configured network
    pub fn network_params(&self) -> Network {
        Network::from_type(self.network)
    }

    /// Smallest sendable amount
    pub fn effective_dust_threshold(&self) -> u64 {
        self.dust_threshold.unwrap_or(self.miners_fee)
    }

    /// Age after which a mined transaction is treated as confirmed when the
    /// chain height is unknown
    pub fn confirmation_fallback_age(&self) -> Duration {
        let interval = self
            .confirmations
            .block_interval_secs
            .unwrap_or(self.network_params().expected_block_interval_secs);
        Duration::from_secs(interval.saturating_mul(self.confirmations.fallback_blocks as u64))
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.miners_fee == 0 {
            return Err(Error::InvalidConfig("miners_fee must be non-zero".to_string()));
        }
        if self.max_memo_size == 0 {
            return Err(Error::InvalidConfig("max_memo_size must be non-zero".to_string()));
        }
        if self.transition_capacity == 0 {
            return Err(Error::InvalidConfig(
                "transition_capacity must be non-zero".to_string(),
            ));
        }
        self.confirmations.validate()?;
        self.progress.validate()?;
        Ok(())
    }
}

/// Confirmation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// Confirmations required before a mined transaction is settled
    pub required: u32,
    /// Confirmations the engine must report before Submitted becomes Mined
    pub min_mined: u32,
    /// Blocks of wall-clock age used by the unknown-height fallback
    pub fallback_blocks: u32,
    /// Override for the expected block interval (seconds)
    pub block_interval_secs: Option<u64>,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            required: DEFAULT_REQUIRED_CONFIRMATIONS,
            min_mined: 1,
            fallback_blocks: DEFAULT_FALLBACK_BLOCKS,
            block_interval_secs: None,
        }
    }
}

impl ConfirmationConfig {
    fn validate(&self) -> Result<()> {
        if self.required == 0 {
            return Err(Error::InvalidConfig(
                "confirmations.required must be at least 1".to_string(),
            ));
        }
        if self.min_mined == 0 {
            return Err(Error::InvalidConfig(
                "confirmations.min_mined must be at least 1".to_string(),
            ));
        }
        if self.min_mined > self.required {
            return Err(Error::InvalidConfig(format!(
                "confirmations.min_mined ({}) exceeds confirmations.required ({})",
                self.min_mined, self.required
            )));
        }
        Ok(())
    }
}

/// Relative weight of download and scan progress in the total
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressWeights {
    /// Download weight
    pub download: f32,
    /// Scan weight
    pub scan: f32,
}

impl Default for ProgressWeights {
    fn default() -> Self {
        Self {
            download: 0.4,
            scan: 0.6,
        }
    }
}

impl ProgressWeights {
    fn validate(&self) -> Result<()> {
        let in_range = |w: f32| (0.0..=1.0).contains(&w);
        if !in_range(self.download) || !in_range(self.scan) {
            return Err(Error::InvalidConfig(
                "progress weights must be within [0, 1]".to_string(),
            ));
        }
        if ((self.download + self.scan) - 1.0).abs() > 0.001 {
            return Err(Error::InvalidConfig(format!(
                "progress weights must sum to 1 (got {})",
                self.download + self.scan
            )));
        }
        Ok(())
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Include thread ids
    pub thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            thread_ids: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.miners_fee, 10_000);
        assert_eq!(config.confirmations.required, 10);
        assert_eq!(config.effective_dust_threshold(), config.miners_fee);
    }

    #[test]
    fn test_fallback_age_uses_network_interval() {
        let config = SessionConfig::default();
        assert_eq!(config.confirmation_fallback_age(), Duration::from_secs(25 * 75));

        let mut custom = SessionConfig::default();
        custom.confirmations.block_interval_secs = Some(60);
        custom.confirmations.fallback_blocks = 10;
        assert_eq!(custom.confirmation_fallback_age(), Duration::from_secs(600));
    }

    #[test]
    fn test_partial_json() {
        let config = SessionConfig::from_json_str(
            r#"{ "network": "testnet", "confirmations": { "required": 3 } }"#,
        )
        .unwrap();
        assert_eq!(config.network, NetworkType::Testnet);
        assert_eq!(config.confirmations.required, 3);
        assert_eq!(config.confirmations.fallback_blocks, DEFAULT_FALLBACK_BLOCKS);
        assert_eq!(config.max_memo_size, MAX_MEMO_SIZE);
    }

    #[test]
    fn test_rejects_inconsistent_values() {
        assert!(SessionConfig::from_json_str(r#"{ "miners_fee": 0 }"#).is_err());
        assert!(SessionConfig::from_json_str(
            r#"{ "progress": { "download": 0.5, "scan": 0.6 } }"#
        )
        .is_err());
        assert!(SessionConfig::from_json_str(
            r#"{ "confirmations": { "required": 2, "min_mined": 3 } }"#
        )
        .is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "autoshield_threshold": 5000, "logging": {{ "json": true }} }}"#)
            .unwrap();

        let config = SessionConfig::load(file.path()).unwrap();
        assert_eq!(config.autoshield_threshold, 5000);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_missing_file() {
        let err = SessionConfig::load("/nonexistent/zwallet.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
