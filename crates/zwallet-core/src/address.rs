//! Address classification
//!
//! Spending to an address belongs to the wallet engine. The core only needs
//! to know whether a string is a shielded address, a transparent address, or
//! junk, and asks through [`AddressValidator`]. [`NetworkAddressValidator`]
//! answers offline by decoding the string: bech32 with the network's HRP for
//! Sapling and unified addresses, Base58Check with the network's version
//! bytes for transparent ones.

use crate::{Error, Result};
use async_trait::async_trait;
use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;
use zwallet_params::{Network, NetworkType};

/// Raw Sapling payment address: 11-byte diversifier and 32-byte pk_d
pub const SAPLING_ADDRESS_LEN: usize = 43;

/// Shortest unified address payload after F4Jumble
const UNIFIED_MIN_LEN: usize = 48;

/// Transparent payload: 2 version bytes and a 20-byte hash
const TRANSPARENT_PAYLOAD_LEN: usize = 22;

/// What kind of address a string is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    /// Sapling or unified address
    Shielded,
    /// Transparent address
    Transparent,
    /// Not an address on this network
    Invalid,
}

impl AddressKind {
    /// Usable as a send destination
    pub fn is_valid(&self) -> bool {
        !matches!(self, AddressKind::Invalid)
    }
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressKind::Shielded => write!(f, "shielded"),
            AddressKind::Transparent => write!(f, "transparent"),
            AddressKind::Invalid => write!(f, "invalid"),
        }
    }
}

/// Address classification provided by the wallet engine
#[async_trait]
pub trait AddressValidator: Send + Sync {
    /// Classify `address`
    async fn classify(&self, address: &str) -> AddressKind;
}

/// Offline classifier for one network
#[derive(Debug, Clone)]
pub struct NetworkAddressValidator {
    network: Network,
}

impl NetworkAddressValidator {
    /// Validator for the given network
    pub fn new(network: NetworkType) -> Self {
        Self {
            network: Network::from_type(network),
        }
    }

    /// Synchronous classification
    pub fn classify_sync(&self, address: &str) -> AddressKind {
        let address = address.trim();
        if address.is_empty() {
            return AddressKind::Invalid;
        }

        if let Ok((hrp, data)) = bech32::decode(address) {
            let hrp = hrp.as_str();
            if hrp.eq_ignore_ascii_case(self.network.sapling_hrp)
                && data.len() == SAPLING_ADDRESS_LEN
            {
                return AddressKind::Shielded;
            }
            if hrp.eq_ignore_ascii_case(self.network.unified_hrp) && data.len() >= UNIFIED_MIN_LEN {
                return AddressKind::Shielded;
            }
            return AddressKind::Invalid;
        }

        match bs58::decode(address).with_check(None).into_vec() {
            Ok(payload)
                if payload.len() == TRANSPARENT_PAYLOAD_LEN
                    && self
                        .network
                        .transparent_versions
                        .iter()
                        .any(|version| payload.starts_with(version)) =>
            {
                AddressKind::Transparent
            }
            _ => AddressKind::Invalid,
        }
    }
}

#[async_trait]
impl AddressValidator for NetworkAddressValidator {
    async fn classify(&self, address: &str) -> AddressKind {
        self.classify_sync(address)
    }
}

/// Encode a raw Sapling payment address for `network`
pub fn encode_sapling_address(
    network: NetworkType,
    raw: &[u8; SAPLING_ADDRESS_LEN],
) -> Result<String> {
    let hrp = Hrp::parse(Network::from_type(network).sapling_hrp)
        .map_err(|e| Error::InvalidAddress(format!("Invalid Sapling HRP: {e}")))?;
    bech32::encode::<Bech32>(hrp, raw)
        .map_err(|e| Error::InvalidAddress(format!("Sapling bech32 encode failed: {e}")))
}

/// Encode a P2PKH transparent address for `network` from its key hash
pub fn encode_transparent_address(network: NetworkType, key_hash: &[u8; 20]) -> String {
    let version = Network::from_type(network).transparent_versions[0];
    let mut payload = Vec::with_capacity(TRANSPARENT_PAYLOAD_LEN);
    payload.extend_from_slice(&version);
    payload.extend_from_slice(key_hash);
    bs58::encode(payload).with_check().into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bech32::Bech32m;

    fn sapling(network: NetworkType) -> String {
        encode_sapling_address(network, &[7u8; SAPLING_ADDRESS_LEN]).unwrap()
    }

    #[test]
    fn test_sapling_address() {
        let validator = NetworkAddressValidator::new(NetworkType::Mainnet);
        let address = sapling(NetworkType::Mainnet);
        assert!(address.starts_with("zs1"));
        assert_eq!(validator.classify_sync(&address), AddressKind::Shielded);
        assert_eq!(
            validator.classify_sync(&format!("  {address}\n")),
            AddressKind::Shielded
        );
    }

    #[test]
    fn test_bad_checksum_is_invalid() {
        let validator = NetworkAddressValidator::new(NetworkType::Mainnet);
        // Right alphabet and length, no valid checksum
        let fake = format!("zs1{}", "q".repeat(75));
        assert_eq!(validator.classify_sync(&fake), AddressKind::Invalid);

        let mut address = sapling(NetworkType::Mainnet);
        let last = address.pop().unwrap();
        address.push(if last == 'q' { 'p' } else { 'q' });
        assert_eq!(validator.classify_sync(&address), AddressKind::Invalid);

        let fake_t = format!("t1{}", "1".repeat(33));
        assert_eq!(validator.classify_sync(&fake_t), AddressKind::Invalid);
    }

    #[test]
    fn test_wrong_payload_length_is_invalid() {
        let validator = NetworkAddressValidator::new(NetworkType::Mainnet);
        let hrp = Hrp::parse("zs").unwrap();
        let short = bech32::encode::<Bech32>(hrp, &[1u8; 42]).unwrap();
        assert_eq!(validator.classify_sync(&short), AddressKind::Invalid);
    }

    #[test]
    fn test_transparent_address() {
        let validator = NetworkAddressValidator::new(NetworkType::Mainnet);
        let address = encode_transparent_address(NetworkType::Mainnet, &[9u8; 20]);
        assert!(address.starts_with("t1"));
        assert_eq!(validator.classify_sync(&address), AddressKind::Transparent);

        let testnet = NetworkAddressValidator::new(NetworkType::Testnet);
        assert_eq!(testnet.classify_sync(&address), AddressKind::Invalid);
        let tm = encode_transparent_address(NetworkType::Testnet, &[9u8; 20]);
        assert!(tm.starts_with("tm"));
        assert_eq!(testnet.classify_sync(&tm), AddressKind::Transparent);
    }

    #[test]
    fn test_network_mismatch() {
        let validator = NetworkAddressValidator::new(NetworkType::Testnet);
        assert_eq!(
            validator.classify_sync(&sapling(NetworkType::Mainnet)),
            AddressKind::Invalid
        );
        assert_eq!(
            validator.classify_sync(&sapling(NetworkType::Testnet)),
            AddressKind::Shielded
        );
    }

    #[test]
    fn test_unified_address() {
        let validator = NetworkAddressValidator::new(NetworkType::Mainnet);
        let hrp = Hrp::parse("u").unwrap();
        let address = bech32::encode::<Bech32m>(hrp, &[3u8; 64]).unwrap();
        assert_eq!(validator.classify_sync(&address), AddressKind::Shielded);

        let short = bech32::encode::<Bech32m>(hrp, &[3u8; 20]).unwrap();
        assert!(!validator.classify_sync(&short).is_valid());
    }

    #[tokio::test]
    async fn test_async_classify() {
        let validator = NetworkAddressValidator::new(NetworkType::Mainnet);
        assert_eq!(validator.classify("hello").await, AddressKind::Invalid);
    }
}
