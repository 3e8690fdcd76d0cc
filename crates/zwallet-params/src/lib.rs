//! Zcash wallet-client network parameters and session configuration
//!
//! This crate provides network-specific constants, consensus values the
//! client relies on (fees, memo size, block interval) and the serializable
//! configuration consumed by a wallet session.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod consensus;
pub mod network;

pub use config::{ConfirmationConfig, LogConfig, ProgressWeights, SessionConfig};
pub use consensus::{
    ConsensusParams, MAX_MEMO_SIZE, MAX_MONEY, MINERS_FEE, ZATOSHI_PER_ZEC,
};
pub use network::{Network, NetworkType};

/// Error types for parameter and configuration operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid network specified
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    /// Configuration value out of range or inconsistent
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;
