//! Confirmation-count policy for mined transactions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use zwallet_params::SessionConfig;

/// Where a transaction stands with respect to the confirmation threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    /// Not mined yet
    Pending,
    /// Mined, below the threshold
    Confirming {
        /// Blocks on top of (and including) the mining block
        confirmations: u32,
        /// Confirmations still needed
        remaining: u32,
    },
    /// Mined with at least the required confirmations
    Confirmed {
        /// Blocks on top of (and including) the mining block
        confirmations: u32,
    },
    /// Chain height unknown, but the block is old enough to assume
    /// confirmation. A best-effort guess, reported separately to telemetry.
    ConfirmedByAge,
    /// Mined, but neither the chain height nor the block age settle it
    Unknown,
}

impl ConfirmationStatus {
    /// Confirmed by count or by age
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self,
            ConfirmationStatus::Confirmed { .. } | ConfirmationStatus::ConfirmedByAge
        )
    }

    /// Confirmations still needed, when known
    pub fn remaining(&self) -> Option<u32> {
        match self {
            ConfirmationStatus::Confirming { remaining, .. } => Some(*remaining),
            ConfirmationStatus::Confirmed { .. } | ConfirmationStatus::ConfirmedByAge => Some(0),
            _ => None,
        }
    }
}

impl fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmationStatus::Pending => write!(f, "Pending"),
            ConfirmationStatus::Confirming {
                confirmations,
                remaining,
            } => write!(
                f,
                "{} confirmations ({} remaining)",
                confirmations, remaining
            ),
            ConfirmationStatus::Confirmed { .. } | ConfirmationStatus::ConfirmedByAge => {
                write!(f, "Confirmed")
            }
            ConfirmationStatus::Unknown => write!(f, "Confirmation count unavailable"),
        }
    }
}

/// Confirmation thresholds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// Confirmations required to settle
    pub required: u32,
    /// Minimum block age for the unknown-height fallback
    pub fallback_age: Duration,
    /// Heights below this are not plausible chain tips or mining heights
    pub activation_height: u64,
}

impl ConfirmationPolicy {
    /// Policy with no activation-height sanity check
    pub fn new(required: u32, fallback_age: Duration) -> Self {
        Self {
            required,
            fallback_age,
            activation_height: 0,
        }
    }

    /// Policy derived from session config and its network
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            required: config.confirmations.required,
            fallback_age: config.confirmation_fallback_age(),
            activation_height: config.network_params().sapling_activation_height,
        }
    }

    /// Blocks on top of (and including) the mining block
    pub fn confirmations(mined_height: u64, chain_height: u64) -> u32 {
        if chain_height < mined_height {
            return 0;
        }
        let count = chain_height - mined_height + 1;
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Classify a transaction mined at `mined_height` (block time `mined_at`)
    /// given the chain height, if known, and the current time
    pub fn evaluate(
        &self,
        mined_height: Option<u64>,
        mined_at: Option<DateTime<Utc>>,
        chain_height: Option<u64>,
        now: DateTime<Utc>,
    ) -> ConfirmationStatus {
        let mined_height = match mined_height {
            Some(h) if h > 0 => h,
            _ => return ConfirmationStatus::Pending,
        };

        let chain_height = chain_height.filter(|h| *h >= self.activation_height);
        if let Some(chain_height) = chain_height {
            let confirmations = Self::confirmations(mined_height, chain_height);
            return if confirmations >= self.required {
                ConfirmationStatus::Confirmed { confirmations }
            } else {
                ConfirmationStatus::Confirming {
                    confirmations,
                    remaining: self.required - confirmations,
                }
            };
        }

        let old_enough = mined_at
            .and_then(|at| (now - at).to_std().ok())
            .map_or(false, |age| age >= self.fallback_age);
        if old_enough && mined_height >= self.activation_height {
            ConfirmationStatus::ConfirmedByAge
        } else {
            ConfirmationStatus::Unknown
        }
    }
}
