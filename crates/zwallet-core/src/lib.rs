//! Zcash wallet-client core model
//!
//! Value types shared by the wallet session: balances, sync progress,
//! outbound transaction states, confirmation policy, memo handling, address
//! classification, send validation and keypad amount entry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod amount_entry;
pub mod balance;
pub mod confirmation;
pub mod error;
pub mod keys;
pub mod memo;
pub mod send;
pub mod sync;
pub mod transaction;

pub use address::{
    encode_sapling_address, encode_transparent_address, AddressKind, AddressValidator,
    NetworkAddressValidator, SAPLING_ADDRESS_LEN,
};
pub use amount_entry::{AmountEntry, Key, MAX_FRACTION_DIGITS};
pub use balance::{format_zec, Balance, BalanceSummary, Pool};
pub use confirmation::{ConfirmationPolicy, ConfirmationStatus};
pub use error::{Error, ErrorCategory, Result, SendError};
pub use keys::SpendingKey;
pub use memo::{
    compose_memo, find_address_in_memo, INCLUDE_MEMO_PREFIXES_RECOGNIZED,
    INCLUDE_MEMO_PREFIX_STANDARD,
};
pub use send::{detect_issues, validate_send, SendLimits, SendRequest, UserInputIssue};
pub use sync::{ProcessorInfo, ScanProgress, SyncStatus};
pub use transaction::{
    EncodedTransaction, PendingTransaction, Recipient, TxId, TxState, TxUpdate,
};
