//! Zcash network definitions

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Network type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Mainnet
    Mainnet,
    /// Testnet
    Testnet,
    /// Regtest (local development)
    Regtest,
}

impl FromStr for NetworkType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Self::Mainnet),
            "testnet" | "test" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            other => Err(crate::Error::InvalidNetwork(other.to_string())),
        }
    }
}

/// Network configuration
#[derive(Debug, Clone)]
pub struct Network {
    /// Network type
    pub network_type: NetworkType,
    /// Human-readable name
    pub name: &'static str,
    /// Sapling activation height
    pub sapling_activation_height: u64,
    /// Expected seconds between blocks
    pub expected_block_interval_secs: u64,
    /// Bech32 HRP of Sapling payment addresses
    pub sapling_hrp: &'static str,
    /// Bech32m HRP of unified addresses
    pub unified_hrp: &'static str,
    /// Base58Check version bytes of transparent addresses (P2PKH, P2SH)
    pub transparent_versions: [[u8; 2]; 2],
}

impl Network {
    /// Get mainnet parameters
    pub const fn mainnet() -> Self {
        Self {
            network_type: NetworkType::Mainnet,
            name: "mainnet",
            sapling_activation_height: 419_200,
            expected_block_interval_secs: 75,
            sapling_hrp: "zs",
            unified_hrp: "u",
            transparent_versions: [[0x1c, 0xb8], [0x1c, 0xbd]],
        }
    }

    /// Get testnet parameters
    pub const fn testnet() -> Self {
        Self {
            network_type: NetworkType::Testnet,
            name: "testnet",
            sapling_activation_height: 280_000,
            expected_block_interval_secs: 75,
            sapling_hrp: "ztestsapling",
            unified_hrp: "utest",
            transparent_versions: [[0x1d, 0x25], [0x1c, 0xba]],
        }
    }

    /// Get regtest parameters
    pub const fn regtest() -> Self {
        Self {
            network_type: NetworkType::Regtest,
            name: "regtest",
            sapling_activation_height: 1,
            expected_block_interval_secs: 1,
            sapling_hrp: "zregtestsapling",
            unified_hrp: "uregtest",
            transparent_versions: [[0x1d, 0x25], [0x1c, 0xba]],
        }
    }

    /// Get network by type
    pub const fn from_type(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::Mainnet => Self::mainnet(),
            NetworkType::Testnet => Self::testnet(),
            NetworkType::Regtest => Self::regtest(),
        }
    }

    /// Check if a height is past Sapling activation, i.e. a plausible mined height
    pub const fn is_sapling_active(&self, height: u64) -> bool {
        height >= self.sapling_activation_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_params() {
        let net = Network::mainnet();
        assert_eq!(net.network_type, NetworkType::Mainnet);
        assert_eq!(net.expected_block_interval_secs, 75);
        assert!(net.is_sapling_active(419_200));
        assert!(!net.is_sapling_active(419_199));
    }

    #[test]
    fn test_network_from_type() {
        let net = Network::from_type(NetworkType::Testnet);
        assert_eq!(net.name, "testnet");
        assert_eq!(net.sapling_hrp, "ztestsapling");
        assert_eq!(net.transparent_versions[0], [0x1d, 0x25]);
    }

    #[test]
    fn test_network_type_parse() {
        assert_eq!("Mainnet".parse::<NetworkType>().unwrap(), NetworkType::Mainnet);
        assert_eq!("test".parse::<NetworkType>().unwrap(), NetworkType::Testnet);
        assert!("signet".parse::<NetworkType>().is_err());
    }
}
