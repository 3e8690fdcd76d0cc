//! Telemetry reports and sinks
//!
//! Everything the session wants to tell the outside world about a send goes
//! through a [`MetricsSink`] as a [`Report`]: paired interval metrics, send
//! funnel steps, suspicious input and non-fatal transaction errors. Sinks are
//! fire-and-forget and must not block.

use crate::correlator::IntervalMetric;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};
use zwallet_core::{TxId, UserInputIssue};

/// Send funnel step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FunnelStep {
    /// User picked send
    SendSelected,
    /// Spending key loaded
    SpendingKeyFound,
    /// No spending key for the account
    ErrorNotFound,
    /// Encoding started
    Creating,
    /// Cancelled before submission
    Cancelled,
    /// Transaction encoded
    Created {
        /// Transaction id
        id: TxId,
    },
    /// Engine failed to encode
    ErrorEncoding {
        /// Engine error code, if any
        code: Option<i32>,
        /// Engine error message
        message: String,
    },
    /// Accepted by lightwalletd
    Submitted,
    /// Engine failed to submit
    ErrorSubmitting {
        /// Engine error code, if any
        code: Option<i32>,
        /// Engine error message
        message: String,
    },
    /// Seen in a block
    Mined {
        /// Block height
        height: u64,
    },
}

impl FunnelStep {
    /// Step name within the send funnel
    pub fn name(&self) -> &'static str {
        match self {
            FunnelStep::SendSelected => "sendselected",
            FunnelStep::SpendingKeyFound => "keyfound",
            FunnelStep::ErrorNotFound => "error.notfound",
            FunnelStep::Creating => "creating",
            FunnelStep::Cancelled => "cancelled",
            FunnelStep::Created { .. } => "created",
            FunnelStep::ErrorEncoding { .. } => "error.encode",
            FunnelStep::Submitted => "submitted",
            FunnelStep::ErrorSubmitting { .. } => "error.submit",
            FunnelStep::Mined { .. } => "mined",
        }
    }

    /// Position in the funnel; error steps sit just after the step that failed
    pub fn step(&self) -> u32 {
        match self {
            FunnelStep::SendSelected => 50,
            FunnelStep::ErrorNotFound => 51,
            FunnelStep::SpendingKeyFound => 60,
            FunnelStep::Creating => 70,
            FunnelStep::ErrorEncoding { .. } => 71,
            FunnelStep::Cancelled => 72,
            FunnelStep::Created { .. } => 80,
            FunnelStep::ErrorSubmitting { .. } => 81,
            FunnelStep::Submitted => 90,
            FunnelStep::Mined { .. } => 100,
        }
    }

    /// Telemetry key
    pub fn key(&self) -> String {
        format!("funnel.send.{}", self.name())
    }

    /// Whether the step records a failure
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            FunnelStep::ErrorNotFound
                | FunnelStep::ErrorEncoding { .. }
                | FunnelStep::ErrorSubmitting { .. }
        )
    }
}

/// Something odd worth counting, but not an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Issue {
    /// Suspicious send input
    UserInput(UserInputIssue),
    /// Mined transaction settled by block age because the chain height was unknown
    ConfirmedByAge {
        /// Transaction id
        id: TxId,
        /// Height it was mined at
        mined_height: u64,
    },
}

impl Issue {
    /// Telemetry key
    pub fn key(&self) -> &'static str {
        match self {
            Issue::UserInput(issue) => issue.key(),
            Issue::ConfirmedByAge { .. } => "issue.confirmed.by.age",
        }
    }
}

/// Engine action that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TxAction {
    /// Building the transaction
    Encode,
    /// Broadcasting it
    Submit,
}

impl fmt::Display for TxAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxAction::Encode => write!(f, "encode"),
            TxAction::Submit => write!(f, "submit"),
        }
    }
}

/// Telemetry record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Report {
    /// Paired interval between two events
    Metric(IntervalMetric),
    /// Send funnel progress
    Funnel(FunnelStep),
    /// Odd but non-fatal condition
    Issue(Issue),
    /// Non-fatal transaction error
    TxError {
        /// Failed action
        action: TxAction,
        /// Engine error code, if any
        code: Option<i32>,
        /// Engine error message
        message: String,
    },
}

impl Report {
    /// Telemetry key
    pub fn key(&self) -> String {
        match self {
            Report::Metric(metric) => metric.end.key().to_string(),
            Report::Funnel(step) => step.key(),
            Report::Issue(issue) => issue.key().to_string(),
            Report::TxError { action, .. } => format!("tx.{}", action),
        }
    }
}

/// Telemetry destination
pub trait MetricsSink: Send + Sync {
    /// Record a report. Must not block.
    fn report(&self, report: Report);
}

/// Sink that writes reports as structured log events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn report(&self, report: Report) {
        match &report {
            Report::Metric(metric) => info!(
                event = "metric",
                key = %metric.end.key(),
                tx_id = %metric.tx,
                elapsed_ms = metric.elapsed_ms(),
                "{}",
                metric.end.description()
            ),
            Report::Funnel(step) => info!(
                event = "funnel",
                key = %step.key(),
                step = step.step(),
                is_error = step.is_error(),
                "Send funnel step"
            ),
            Report::Issue(issue) => info!(
                event = "issue",
                key = %issue.key(),
                detail = %serde_json::to_string(issue).unwrap_or_default(),
                "Issue observed"
            ),
            Report::TxError {
                action,
                code,
                message,
            } => warn!(
                event = "tx_error",
                action = %action,
                code = code.unwrap_or(-1),
                message = %message,
                "Failed to {} transaction",
                action
            ),
        }
    }
}

/// Sink that keeps every report in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<Report>>,
}

impl RecordingSink {
    /// Empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    /// Interval metrics reported so far
    pub fn metrics(&self) -> Vec<IntervalMetric> {
        self.reports
            .lock()
            .iter()
            .filter_map(|r| match r {
                Report::Metric(metric) => Some(metric.clone()),
                _ => None,
            })
            .collect()
    }

    /// Funnel steps reported so far
    pub fn funnel(&self) -> Vec<FunnelStep> {
        self.reports
            .lock()
            .iter()
            .filter_map(|r| match r {
                Report::Funnel(step) => Some(step.clone()),
                _ => None,
            })
            .collect()
    }

    /// Issues reported so far
    pub fn issues(&self) -> Vec<Issue> {
        self.reports
            .lock()
            .iter()
            .filter_map(|r| match r {
                Report::Issue(issue) => Some(issue.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget everything reported
    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl MetricsSink for RecordingSink {
    fn report(&self, report: Report) {
        self.reports.lock().push(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_funnel_keys_and_order() {
        assert_eq!(FunnelStep::SendSelected.key(), "funnel.send.sendselected");
        assert_eq!(
            FunnelStep::ErrorEncoding {
                code: Some(3),
                message: "x".to_string()
            }
            .key(),
            "funnel.send.error.encode"
        );
        assert!(FunnelStep::Creating.step() < FunnelStep::Created { id: TxId(1) }.step());
        assert!(FunnelStep::Submitted.step() < FunnelStep::Mined { height: 1 }.step());
    }

    #[test]
    fn test_error_steps_and_issue_keys() {
        assert!(FunnelStep::ErrorNotFound.is_error());
        assert!(FunnelStep::ErrorSubmitting {
            code: None,
            message: "rejected".to_string()
        }
        .is_error());
        assert!(!FunnelStep::Cancelled.is_error());
        assert!(!FunnelStep::Mined { height: 1 }.is_error());
        assert_eq!(
            Issue::ConfirmedByAge {
                id: TxId(1),
                mined_height: 10
            }
            .key(),
            "issue.confirmed.by.age"
        );
    }

    #[test]
    fn test_recording_sink_filters() {
        let sink = RecordingSink::new();
        sink.report(Report::Funnel(FunnelStep::Creating));
        sink.report(Report::Issue(Issue::UserInput(UserInputIssue::SelfSend)));
        sink.report(Report::TxError {
            action: TxAction::Submit,
            code: None,
            message: "rejected".to_string(),
        });

        assert_eq!(sink.reports().len(), 3);
        assert_eq!(sink.funnel(), vec![FunnelStep::Creating]);
        assert_eq!(sink.issues().len(), 1);
        assert!(sink.metrics().is_empty());
        assert_eq!(sink.reports()[2].key(), "tx.submit");

        sink.clear();
        assert!(sink.reports().is_empty());
    }
}
