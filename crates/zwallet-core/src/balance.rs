//! Per-pool balances and zatoshi formatting

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use zwallet_params::ZATOSHI_PER_ZEC;

/// Value pool a balance belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Pool {
    /// Orchard shielded pool
    Orchard,
    /// Sapling shielded pool
    Sapling,
    /// Transparent pool
    Transparent,
}

impl Pool {
    /// All pools, in display order
    pub const ALL: [Pool; 3] = [Pool::Orchard, Pool::Sapling, Pool::Transparent];

    /// Whether funds in this pool are shielded
    pub fn is_shielded(&self) -> bool {
        !matches!(self, Pool::Transparent)
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pool::Orchard => write!(f, "orchard"),
            Pool::Sapling => write!(f, "sapling"),
            Pool::Transparent => write!(f, "transparent"),
        }
    }
}

/// Funds snapshot for one pool, in zatoshi
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BalanceFields")]
pub struct Balance {
    available: u64,
    total: u64,
}

/// Wire shape of [`Balance`], checked through [`Balance::new`]
#[derive(Deserialize)]
struct BalanceFields {
    available: u64,
    total: u64,
}

impl TryFrom<BalanceFields> for Balance {
    type Error = Error;

    fn try_from(fields: BalanceFields) -> Result<Self> {
        Balance::new(fields.available, fields.total)
    }
}

impl Balance {
    /// Create a balance; `total` must cover `available`
    pub fn new(available: u64, total: u64) -> Result<Self> {
        if total < available {
            return Err(Error::InvalidBalance(format!(
                "total {} is less than available {}",
                total, available
            )));
        }
        Ok(Self { available, total })
    }

    /// Fully spendable balance with nothing pending
    pub fn spendable(amount: u64) -> Self {
        Self {
            available: amount,
            total: amount,
        }
    }

    /// Spendable amount
    pub fn available(&self) -> u64 {
        self.available
    }

    /// Available plus pending
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Amount awaiting confirmation
    pub fn pending(&self) -> u64 {
        self.total - self.available
    }
}

/// Format zatoshi as a ZEC decimal string, keeping between `min_decimals`
/// and `max_decimals` fractional digits (extra digits are truncated).
pub fn format_zec(zatoshi: u64, min_decimals: usize, max_decimals: usize) -> String {
    let max_decimals = max_decimals.min(8);
    let min_decimals = min_decimals.min(max_decimals);

    let whole = zatoshi / ZATOSHI_PER_ZEC;
    let fraction = format!("{:08}", zatoshi % ZATOSHI_PER_ZEC);
    let mut fraction = fraction[..max_decimals].to_string();
    while fraction.len() > min_decimals && fraction.ends_with('0') {
        fraction.pop();
    }

    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Display model for the auto-shield screen: shielded, transparent and total
/// available funds, left-padded to a common width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSummary {
    /// Shielded (sapling) available, formatted
    pub shielded: String,
    /// Transparent available, formatted
    pub transparent: String,
    /// Sum of both, formatted
    pub total: String,
    /// Transparent funds exist that could be shielded
    pub can_autoshield: bool,
}

impl BalanceSummary {
    /// Build the summary from the latest sapling and transparent balances
    pub fn new(sapling: Option<&Balance>, transparent: Option<&Balance>) -> Self {
        let shielded = sapling.map(Balance::available).unwrap_or(0);
        let transparent_available = transparent.map(Balance::available).unwrap_or(0);

        Self {
            shielded: format_zec(shielded, 8, 8),
            transparent: format_zec(transparent_available, 8, 8),
            total: format_zec(shielded.saturating_add(transparent_available), 8, 8),
            can_autoshield: transparent_available > 0,
        }
    }

    fn width(&self) -> usize {
        self.shielded
            .len()
            .max(self.transparent.len())
            .max(self.total.len())
    }

    /// Shielded amount padded to the common width
    pub fn padded_shielded(&self) -> String {
        format!("{:>width$}", self.shielded, width = self.width())
    }

    /// Transparent amount padded to the common width
    pub fn padded_transparent(&self) -> String {
        format!("{:>width$}", self.transparent, width = self.width())
    }

    /// Total padded to the common width
    pub fn padded_total(&self) -> String {
        format!("{:>width$}", self.total, width = self.width())
    }
}
