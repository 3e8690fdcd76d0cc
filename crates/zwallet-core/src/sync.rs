//! Sync status and block-range progress

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Wallet engine synchronization status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Not connected to a server
    #[default]
    Disconnected,
    /// Downloading compact blocks
    Downloading,
    /// Validating downloaded blocks
    Validating,
    /// Scanning blocks for wallet notes
    Scanning,
    /// Caught up with the chain tip
    Synced,
    /// Engine reported an error
    Error,
}

impl SyncStatus {
    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Downloading => "Downloading",
            Self::Validating => "Validating",
            Self::Scanning => "Scanning",
            Self::Synced => "Synced",
            Self::Error => "Error",
        }
    }

    /// Spends are only allowed once synced
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced)
    }
}

/// Progress through a half-open block range `[start, end)`.
///
/// `processed` is the last height handled; it may sit below `start` when
/// nothing has been processed yet, but never above `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScanProgressFields")]
pub struct ScanProgress {
    start: u64,
    end: u64,
    processed: u64,
}

#[derive(Deserialize)]
struct ScanProgressFields {
    start: u64,
    end: u64,
    processed: u64,
}

impl TryFrom<ScanProgressFields> for ScanProgress {
    type Error = Error;

    fn try_from(fields: ScanProgressFields) -> Result<Self> {
        ScanProgress::new(fields.start, fields.end, fields.processed)
    }
}

impl ScanProgress {
    /// Create a progress marker, checking `start <= end` and `processed <= end`
    pub fn new(start: u64, end: u64, processed: u64) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidRange(format!(
                "range start {} is after end {}",
                start, end
            )));
        }
        if processed > end {
            return Err(Error::InvalidRange(format!(
                "processed height {} is past range end {}",
                processed, end
            )));
        }
        Ok(Self {
            start,
            end,
            processed,
        })
    }

    /// Range start (inclusive)
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Range end (exclusive)
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Last processed height
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// No work in the range
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Completed fraction in `[0, 1]`; an empty range is complete
    pub fn fraction(&self) -> f64 {
        if self.is_empty() {
            return 1.0;
        }
        let done = self.processed as f64 - self.start as f64 + 1.0;
        let total = (self.end - self.start) as f64;
        (done / total).clamp(0.0, 1.0)
    }

    /// Completed percentage in `[0, 100]`, rounded
    pub fn percent(&self) -> u8 {
        (self.fraction() * 100.0).round() as u8
    }
}

/// Block processor state reported alongside [`SyncStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProcessorInfo {
    /// Current download range, if known
    pub download: Option<ScanProgress>,
    /// Current scan range, if known
    pub scan: Option<ScanProgress>,
    /// Chain tip as reported by the server
    pub network_height: Option<u64>,
}

impl ProcessorInfo {
    /// Download percentage; unknown range reports 0
    pub fn download_percent(&self) -> u8 {
        self.download.map(|p| p.percent()).unwrap_or(0)
    }

    /// Scan percentage; unknown range reports 0
    pub fn scan_percent(&self) -> u8 {
        self.scan.map(|p| p.percent()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_validation() {
        assert!(ScanProgress::new(10, 5, 5).is_err());
        assert!(ScanProgress::new(10, 20, 21).is_err());
        assert!(ScanProgress::new(10, 20, 3).is_ok());
    }

    #[test]
    fn test_percent() {
        let progress = ScanProgress::new(100, 200, 149).unwrap();
        assert_eq!(progress.percent(), 50);

        let done = ScanProgress::new(100, 200, 200).unwrap();
        assert_eq!(done.percent(), 100);

        let not_started = ScanProgress::new(100, 200, 0).unwrap();
        assert_eq!(not_started.percent(), 0);
    }

    #[test]
    fn test_empty_range_is_complete() {
        let empty = ScanProgress::new(500, 500, 0).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.percent(), 100);
    }

    #[test]
    fn test_processor_info_unknown_ranges() {
        let info = ProcessorInfo::default();
        assert_eq!(info.download_percent(), 0);
        assert_eq!(info.scan_percent(), 0);
    }

    #[test]
    fn test_status_names() {
        assert_eq!(SyncStatus::default(), SyncStatus::Disconnected);
        assert_eq!(SyncStatus::Synced.name(), "Synced");
        assert!(SyncStatus::Synced.is_synced());
        assert!(!SyncStatus::Scanning.is_synced());
    }

    #[test]
    fn test_deserialize_checks_range() {
        let progress: ScanProgress =
            serde_json::from_str(r#"{"start":10,"end":20,"processed":14}"#).unwrap();
        assert_eq!(progress.percent(), 50);

        let backwards = r#"{"start":20,"end":10,"processed":10}"#;
        assert!(serde_json::from_str::<ScanProgress>(backwards).is_err());
        let overrun = r#"{"start":0,"end":10,"processed":11}"#;
        assert!(serde_json::from_str::<ScanProgress>(overrun).is_err());
        let info: std::result::Result<ProcessorInfo, _> = serde_json::from_str(
            r#"{"download":{"start":5,"end":1,"processed":1},"scan":null,"network_height":null}"#,
        );
        assert!(info.is_err());
    }
}
