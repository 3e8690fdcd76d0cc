//! Memo composition and inspection
//!
//! Outgoing memos may carry the sender's address after a `Reply-To:` line.
//! Incoming memos are scanned for an address following any of the prefixes
//! other wallets are known to use. That lookup is a convenience for the UI
//! and is never used to validate anything.

use crate::address::{AddressKind, AddressValidator};
use crate::{Error, Result};
use tracing::debug;

/// Prefix written in front of the sender's address
pub const INCLUDE_MEMO_PREFIX_STANDARD: &str = "Reply-To:";

/// Prefixes accepted when looking for an address in a received memo
pub const INCLUDE_MEMO_PREFIXES_RECOGNIZED: [&str; 6] = [
    INCLUDE_MEMO_PREFIX_STANDARD,
    "reply-to",
    "reply to:",
    "reply to",
    "sent from:",
    "sent from",
];

/// Shortest memo worth scanning (a transparent address alone is 35 chars)
pub const MIN_ADDRESS_MEMO_LENGTH: usize = 35;

/// Share of the memo limit above which a memo is reported as large
pub const LARGE_MEMO_RATIO: f64 = 0.96;

/// Build the memo text that will be encoded.
///
/// With `include_from` set, the sender address is appended on its own line
/// after [`INCLUDE_MEMO_PREFIX_STANDARD`]. Asking for that with an empty
/// address is a caller bug.
pub fn compose_memo(memo: &str, include_from: bool, from_address: &str) -> Result<String> {
    if !include_from {
        return Ok(memo.to_string());
    }
    if from_address.trim().is_empty() {
        return Err(Error::Precondition(
            "reply-to requested but the sender address is empty".to_string(),
        ));
    }
    Ok(format!(
        "{}\n{}\n{}",
        memo, INCLUDE_MEMO_PREFIX_STANDARD, from_address
    ))
}

/// Memo length in encoded bytes
pub fn memo_byte_len(memo: &str) -> usize {
    memo.len()
}

/// Whether a memo of `len` bytes is close enough to `max` to be flagged
pub fn is_large_memo(len: usize, max: usize) -> bool {
    len as f64 > max as f64 * LARGE_MEMO_RATIO
}

/// Text after the last case-insensitive occurrence of `prefix`, trimmed at
/// the start and cut at the first whitespace
fn token_after_last(memo: &str, prefix: &str) -> Option<String> {
    // ASCII lowering keeps byte offsets aligned with the original
    let haystack = memo.to_ascii_lowercase();
    let needle = prefix.to_ascii_lowercase();
    let index = haystack.rfind(&needle)?;
    let rest = memo[index + needle.len()..].trim_start();
    let token = rest.split_whitespace().next()?;
    Some(token.to_string())
}

/// Look for a reply address in a received memo.
///
/// Prefixes are tried in order; the first candidate the validator accepts
/// as a shielded or transparent address wins.
pub async fn find_address_in_memo(
    memo: &str,
    validator: &dyn AddressValidator,
) -> Option<String> {
    if memo.len() < MIN_ADDRESS_MEMO_LENGTH {
        return None;
    }
    for prefix in INCLUDE_MEMO_PREFIXES_RECOGNIZED {
        let Some(candidate) = token_after_last(memo, prefix) else {
            continue;
        };
        if validator.classify(&candidate).await != AddressKind::Invalid {
            return Some(candidate);
        }
        debug!(
            event = "memo_address_rejected",
            prefix,
            "Memo candidate is not an address"
        );
    }
    None
}
