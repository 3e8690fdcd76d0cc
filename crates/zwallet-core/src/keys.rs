//! Spending key handle
//!
//! The session never derives or interprets keys. It only carries the
//! encoded key from the caller to the engine, so the wrapper's job is to keep
//! it out of logs and wipe it when dropped.

use std::fmt;
use zeroize::Zeroizing;

/// Encoded spending key, zeroized on drop
#[derive(Clone)]
pub struct SpendingKey {
    encoded: Zeroizing<String>,
    /// Account the key belongs to
    pub account: u32,
}

impl SpendingKey {
    /// Wrap an encoded key
    pub fn new(encoded: String, account: u32) -> Self {
        Self {
            encoded: Zeroizing::new(encoded),
            account,
        }
    }

    /// Encoded key for the engine
    pub fn expose(&self) -> &str {
        &self.encoded
    }

    /// Empty key material
    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }
}

impl fmt::Debug for SpendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpendingKey")
            .field("encoded", &"<redacted>")
            .field("account", &self.account)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_is_redacted() {
        let key = SpendingKey::new("secret-extended-key-main1abc".to_string(), 0);
        let debug = format!("{:?}", key);
        assert!(!debug.contains("secret-extended-key"));
        assert!(debug.contains("redacted"));
        assert_eq!(key.expose(), "secret-extended-key-main1abc");
        assert!(!key.is_empty());
    }
}
