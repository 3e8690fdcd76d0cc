//! Consensus values the wallet client depends on

use crate::network::{Network, NetworkType};

/// Zatoshi per ZEC
pub const ZATOSHI_PER_ZEC: u64 = 100_000_000;

/// Default fixed miners fee (in zatoshi)
pub const MINERS_FEE: u64 = 10_000;

/// Maximum memo size in bytes
pub const MAX_MEMO_SIZE: usize = 512;

/// Maximum supply (zatoshi)
pub const MAX_MONEY: u64 = 21_000_000 * ZATOSHI_PER_ZEC;

/// Consensus parameters
#[derive(Debug, Clone)]
pub struct ConsensusParams {
    /// Network configuration
    pub network: Network,
    /// Target block time in seconds
    pub block_time_target: u64,
    /// Maximum supply (zatoshi)
    pub max_money: u64,
    /// Fixed miners fee (zatoshi)
    pub miners_fee: u64,
}

impl ConsensusParams {
    /// Get consensus params by network type
    pub fn from_network(network_type: NetworkType) -> Self {
        let network = Network::from_type(network_type);
        Self {
            block_time_target: network.expected_block_interval_secs,
            network,
            max_money: MAX_MONEY,
            miners_fee: MINERS_FEE,
        }
    }

    /// Check if amount is valid (within max supply)
    pub fn is_valid_amount(&self, amount: u64) -> bool {
        amount <= self.max_money
    }

    /// Wall-clock seconds covered by `blocks` blocks at the target interval
    pub fn blocks_to_secs(&self, blocks: u64) -> u64 {
        blocks.saturating_mul(self.block_time_target)
    }
}
