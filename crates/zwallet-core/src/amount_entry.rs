//! Keypad amount entry
//!
//! The amount the user types is kept as the exact string shown on screen and
//! folded one key at a time.

use crate::balance::format_zec;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use zwallet_params::ZATOSHI_PER_ZEC;

/// Most fractional digits a ZEC amount can carry
pub const MAX_FRACTION_DIGITS: usize = 8;

/// One keypad press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    /// Digit 0-9
    Digit(u8),
    /// Decimal separator
    Decimal,
    /// Delete the last character
    Backspace,
}

impl Key {
    /// Map a typed character; unknown characters yield `None`
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0'..='9' => Some(Key::Digit(c as u8 - b'0')),
            '.' => Some(Key::Decimal),
            '\u{8}' | '<' => Some(Key::Backspace),
            _ => None,
        }
    }
}

/// Typed amount, e.g. `"0"`, `"12."`, `"0.0001"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountEntry {
    text: String,
}

impl Default for AmountEntry {
    fn default() -> Self {
        Self {
            text: "0".to_string(),
        }
    }
}

impl AmountEntry {
    /// Start from previously typed text (e.g. a pending send)
    pub fn with_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Self::default();
        }
        Self { text }
    }

    /// Text as displayed
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Apply one key press
    pub fn apply(&mut self, key: Key) {
        let acc = self.text.as_str();
        let has_decimal = acc.contains('.');
        let next = match key {
            Key::Digit(0) if acc == "0" => return,
            Key::Backspace if acc == "0" => return,
            Key::Decimal if has_decimal => return,
            Key::Backspace if acc.chars().count() <= 1 => "0".to_string(),
            Key::Backspace => {
                let mut text = acc.to_string();
                text.pop();
                text
            }
            Key::Digit(d) if acc == "0" => d.min(9).to_string(),
            Key::Digit(_) if has_decimal && fraction_len(acc) >= MAX_FRACTION_DIGITS => return,
            Key::Digit(d) => format!("{}{}", acc, d.min(9)),
            Key::Decimal => format!("{}.", acc),
        };
        self.text = next;
    }

    /// Apply a typed character; characters that are not keys are ignored
    pub fn type_char(&mut self, c: char) {
        if let Some(key) = Key::from_char(c) {
            self.apply(key);
        }
    }

    /// Amount in zatoshi
    pub fn zatoshi(&self) -> Result<u64> {
        let (whole, fraction) = match self.text.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (self.text.as_str(), ""),
        };
        if fraction.len() > MAX_FRACTION_DIGITS {
            return Err(Error::InvalidAmount(format!(
                "more than {} decimal places in {}",
                MAX_FRACTION_DIGITS, self.text
            )));
        }
        let parse = |s: &str| -> Result<u64> {
            if s.is_empty() {
                return Ok(0);
            }
            s.parse::<u64>()
                .map_err(|_| Error::InvalidAmount(format!("not a number: {}", self.text)))
        };
        let whole = parse(whole)?;
        let padded = format!("{:0<width$}", fraction, width = MAX_FRACTION_DIGITS);
        let fraction = parse(&padded)?;
        whole
            .checked_mul(ZATOSHI_PER_ZEC)
            .and_then(|z| z.checked_add(fraction))
            .ok_or_else(|| Error::InvalidAmount(format!("amount overflows: {}", self.text)))
    }

    /// Normalized display of the parsed amount
    pub fn formatted(&self) -> Option<String> {
        self.zatoshi().ok().map(|z| format_zec(z, 1, MAX_FRACTION_DIGITS))
    }
}

fn fraction_len(text: &str) -> usize {
    text.split_once('.').map_or(0, |(_, fraction)| fraction.len())
}
