//! Send request validation and user-input issue detection

use crate::address::AddressValidator;
use crate::error::SendError;
use crate::memo::{compose_memo, is_large_memo, memo_byte_len};
use crate::transaction::Recipient;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use zwallet_params::SessionConfig;

/// Amounts below this are reported as micro amounts (zatoshi)
pub const MICRO_AMOUNT: u64 = 100;

/// What the user asked to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    /// Destination
    pub recipient: Recipient,
    /// Amount in zatoshi
    pub amount: u64,
    /// Memo text as typed
    pub memo: String,
    /// Append the sender address after a `Reply-To:` line
    pub include_reply_to: bool,
    /// Sender address; required when `include_reply_to` is set
    pub from_address: String,
}

impl SendRequest {
    /// Request to an external address with no memo
    pub fn to_address(address: impl Into<String>, amount: u64) -> Self {
        Self {
            recipient: Recipient::Address(address.into()),
            amount,
            memo: String::new(),
            include_reply_to: false,
            from_address: String::new(),
        }
    }

    /// Set the memo text
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = memo.into();
        self
    }

    /// Ask for the sender address to be appended to the memo
    pub fn with_reply_to(mut self, from_address: impl Into<String>) -> Self {
        self.include_reply_to = true;
        self.from_address = from_address.into();
        self
    }

    /// The memo as it will be encoded
    pub fn memo_to_send(&self) -> Result<String> {
        compose_memo(&self.memo, self.include_reply_to, &self.from_address)
    }
}

/// Amount, fee and memo limits a send is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendLimits {
    /// Fixed fee added to every send
    pub miners_fee: u64,
    /// Smallest accepted amount
    pub dust_threshold: u64,
    /// Maximum memo size in bytes
    pub max_memo_size: usize,
}

impl SendLimits {
    /// Limits from session config
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            miners_fee: config.miners_fee,
            dust_threshold: config.effective_dust_threshold(),
            max_memo_size: config.max_memo_size,
        }
    }

    /// Smallest amount that passes validation
    pub fn minimum_amount(&self) -> u64 {
        self.dust_threshold.max(1)
    }
}

/// Check a send before handing it to the engine.
///
/// `memo` is the composed memo (see [`SendRequest::memo_to_send`]) and
/// `available` the spendable balance of the source pool, if known.
pub async fn validate_send(
    request: &SendRequest,
    memo: &str,
    available: Option<u64>,
    limits: &SendLimits,
    validator: &dyn AddressValidator,
) -> std::result::Result<(), SendError> {
    if let Recipient::Address(address) = &request.recipient {
        if !validator.classify(address).await.is_valid() {
            return Err(SendError::InvalidRecipient {
                address: address.clone(),
            });
        }
    }

    let minimum = limits.minimum_amount();
    if request.amount < minimum {
        return Err(SendError::AmountBelowDust {
            amount: request.amount,
            minimum,
        });
    }

    let length = memo_byte_len(memo);
    if length > limits.max_memo_size {
        return Err(SendError::MemoTooLong {
            length,
            max: limits.max_memo_size,
        });
    }

    let required = request.amount.saturating_add(limits.miners_fee);
    match available {
        Some(available) if available >= required => Ok(()),
        available => Err(SendError::InsufficientFunds {
            required,
            available,
        }),
    }
}

/// Suspicious but allowed input, reported to telemetry before a send
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserInputIssue {
    /// Sending to the wallet's own address
    SelfSend,
    /// Amount below the miners fee
    TinyAmount,
    /// Amount below 100 zatoshi
    MicroAmount,
    /// Amount of exactly one zatoshi
    MinimumAmount,
    /// Memo longer than the limit; carries its length
    TruncatedMemo(usize),
    /// Memo close to the limit; carries its length
    LargeMemo(usize),
}

impl UserInputIssue {
    /// Stable key for telemetry
    pub fn key(&self) -> &'static str {
        match self {
            UserInputIssue::SelfSend => "issue.self.send",
            UserInputIssue::TinyAmount => "issue.tiny.amount",
            UserInputIssue::MicroAmount => "issue.micro.amount",
            UserInputIssue::MinimumAmount => "issue.minimum.amount",
            UserInputIssue::TruncatedMemo(_) => "issue.truncated.memo",
            UserInputIssue::LargeMemo(_) => "issue.large.memo",
        }
    }
}

impl fmt::Display for UserInputIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserInputIssue::TruncatedMemo(len) | UserInputIssue::LargeMemo(len) => {
                write!(f, "{} ({} bytes)", self.key(), len)
            }
            _ => f.write_str(self.key()),
        }
    }
}

/// Issues worth reporting for this request. At most one amount issue is
/// returned, the most specific that applies.
pub fn detect_issues(request: &SendRequest, memo: &str, limits: &SendLimits) -> Vec<UserInputIssue> {
    let mut issues = Vec::new();

    if let Recipient::Address(address) = &request.recipient {
        if !request.from_address.is_empty() && *address == request.from_address {
            issues.push(UserInputIssue::SelfSend);
        }
    }

    if request.amount == 1 {
        issues.push(UserInputIssue::MinimumAmount);
    } else if request.amount < MICRO_AMOUNT {
        issues.push(UserInputIssue::MicroAmount);
    } else if request.amount < limits.miners_fee {
        issues.push(UserInputIssue::TinyAmount);
    }

    let length = memo_byte_len(memo);
    if length > limits.max_memo_size {
        issues.push(UserInputIssue::TruncatedMemo(length));
    } else if is_large_memo(length, limits.max_memo_size) {
        issues.push(UserInputIssue::LargeMemo(length));
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::NetworkAddressValidator;
    use crate::balance::Pool;
    use zwallet_params::NetworkType;

    fn zaddr() -> String {
        crate::address::encode_sapling_address(NetworkType::Mainnet, &[7u8; 43]).unwrap()
    }

    fn limits() -> SendLimits {
        SendLimits::from_config(&SessionConfig::default())
    }

    async fn validate(request: &SendRequest, available: Option<u64>) -> std::result::Result<(), SendError> {
        let validator = NetworkAddressValidator::new(NetworkType::Mainnet);
        let memo = request.memo_to_send().unwrap();
        validate_send(request, &memo, available, &limits(), &validator).await
    }

    #[tokio::test]
    async fn test_amount_below_dust() {
        let request = SendRequest::to_address(zaddr(), 5_000);
        assert_eq!(
            validate(&request, Some(1_000_000)).await,
            Err(SendError::AmountBelowDust {
                amount: 5_000,
                minimum: 10_000
            })
        );
    }

    #[tokio::test]
    async fn test_invalid_recipient_checked_first() {
        let request = SendRequest::to_address("not-an-address", 0);
        assert!(matches!(
            validate(&request, None).await,
            Err(SendError::InvalidRecipient { .. })
        ));
    }

    #[tokio::test]
    async fn test_insufficient_funds_includes_fee() {
        let request = SendRequest::to_address(zaddr(), 50_000);
        assert_eq!(
            validate(&request, Some(59_999)).await,
            Err(SendError::InsufficientFunds {
                required: 60_000,
                available: Some(59_999)
            })
        );
        assert_eq!(validate(&request, Some(60_000)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_unknown_balance_is_insufficient() {
        let request = SendRequest::to_address(zaddr(), 50_000);
        assert_eq!(
            validate(&request, None).await,
            Err(SendError::InsufficientFunds {
                required: 60_000,
                available: None
            })
        );
    }

    #[tokio::test]
    async fn test_memo_too_long() {
        let request = SendRequest::to_address(zaddr(), 50_000).with_memo("x".repeat(513));
        assert_eq!(
            validate(&request, Some(1_000_000)).await,
            Err(SendError::MemoTooLong {
                length: 513,
                max: 512
            })
        );
    }

    #[tokio::test]
    async fn test_shielding_skips_address_check() {
        let request = SendRequest {
            recipient: Recipient::InternalPool(Pool::Sapling),
            amount: 200_000,
            memo: String::new(),
            include_reply_to: false,
            from_address: String::new(),
        };
        assert_eq!(validate(&request, Some(300_000)).await, Ok(()));
    }

    #[test]
    fn test_reply_to_without_address_is_misuse() {
        let mut request = SendRequest::to_address(zaddr(), 50_000);
        request.include_reply_to = true;
        assert!(request.memo_to_send().is_err());
    }

    #[test]
    fn test_issue_detection() {
        let limits = limits();

        let self_send = SendRequest::to_address(zaddr(), 1).with_reply_to(zaddr());
        let memo = self_send.memo_to_send().unwrap();
        assert_eq!(
            detect_issues(&self_send, &memo, &limits),
            vec![UserInputIssue::SelfSend, UserInputIssue::MinimumAmount]
        );

        let micro = SendRequest::to_address(zaddr(), 99);
        assert_eq!(
            detect_issues(&micro, "", &limits),
            vec![UserInputIssue::MicroAmount]
        );

        let tiny = SendRequest::to_address(zaddr(), 9_999);
        assert_eq!(
            detect_issues(&tiny, "", &limits),
            vec![UserInputIssue::TinyAmount]
        );

        let fine = SendRequest::to_address(zaddr(), 10_000);
        assert!(detect_issues(&fine, "hello", &limits).is_empty());
    }

    #[test]
    fn test_memo_issues() {
        let limits = limits();
        let request = SendRequest::to_address(zaddr(), 50_000);
        assert_eq!(
            detect_issues(&request, &"m".repeat(500), &limits),
            vec![UserInputIssue::LargeMemo(500)]
        );
        assert_eq!(
            detect_issues(&request, &"m".repeat(600), &limits),
            vec![UserInputIssue::TruncatedMemo(600)]
        );
        assert_eq!(UserInputIssue::LargeMemo(500).to_string(), "issue.large.memo (500 bytes)");
    }
}
