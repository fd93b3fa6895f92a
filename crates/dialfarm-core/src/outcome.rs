//! Session outcomes and aggregate statistics.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::DeviceId;

/// Classified result of one device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Code injected in full and committed (dial-style flows).
    Dialed,
    /// Committed, but some code characters had no coordinate.
    PartialInjection,
    /// Target app was alive and focused before anything was sent.
    AlreadyRunning,
    /// App was alive but hidden; one invocation brought it forward.
    BroughtToForeground,
    /// App was alive but hidden and stayed hidden after one invocation.
    ForegroundFailed,
    /// App was not running; the first invocation focused it.
    Launched,
    /// App was not running; the second invocation focused it.
    LaunchedAfterRetry,
    /// App was not running and neither invocation focused it.
    Failed,
    /// A device command failed and the session was aborted.
    Error,
}

impl Status {
    /// Label written to the outcome log.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Status::Dialed => "Dialed",
            Status::PartialInjection => "Partial Injection",
            Status::AlreadyRunning => "Already Running",
            Status::BroughtToForeground => "Brought to Foreground",
            Status::ForegroundFailed => "Foreground Failed",
            Status::Launched => "Launched",
            Status::LaunchedAfterRetry => "Launched After Retry",
            Status::Failed => "Failed",
            Status::Error => "Error",
        }
    }

    /// Whether the session achieved what it set out to do.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Status::Dialed
                | Status::AlreadyRunning
                | Status::BroughtToForeground
                | Status::Launched
                | Status::LaunchedAfterRetry
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// CSV header matching [`OutcomeRecord::to_csv_line`].
pub const CSV_HEADER: &str = "Device,Status,Duration (s),Timestamp,Detail";

/// One line of the outcome log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub device: DeviceId,
    pub status: Status,
    /// Wall-clock seconds from session start to classification.
    pub duration_secs: f64,
    /// Local wall-clock time, `%Y-%m-%d %H:%M:%S`.
    pub timestamp: String,
    /// Error text or skipped characters, when there is something to say.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl OutcomeRecord {
    /// Format as one complete CSV line, newline included.
    #[must_use]
    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{:.2},{},{}\n",
            csv_field(self.device.as_str()),
            csv_field(self.status.label()),
            self.duration_secs,
            csv_field(&self.timestamp),
            csv_field(self.detail.as_deref().unwrap_or_default()),
        )
    }
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\"").replace(['\n', '\r'], " "))
    } else {
        value.to_string()
    }
}

/// Running totals across all finished sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FarmStats {
    pub processed: u64,
    pub succeeded: u64,
    pub total: Duration,
}

impl FarmStats {
    pub fn record(&mut self, status: Status, duration: Duration) {
        self.processed += 1;
        if status.is_success() {
            self.succeeded += 1;
        }
        self.total += duration;
    }

    /// Mean session duration, zero before the first session.
    #[must_use]
    pub fn average(&self) -> Duration {
        match u32::try_from(self.processed) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total / n,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.processed as f64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(detail: Option<&str>) -> OutcomeRecord {
        OutcomeRecord {
            device: DeviceId::from("R58M123ABC"),
            status: Status::LaunchedAfterRetry,
            duration_secs: 12.5,
            timestamp: "2026-10-16 15:04:05".to_string(),
            detail: detail.map(str::to_string),
        }
    }

    #[test]
    fn csv_line_format() {
        assert_eq!(
            record(None).to_csv_line(),
            "R58M123ABC,Launched After Retry,12.50,2026-10-16 15:04:05,\n"
        );
    }

    #[test]
    fn csv_line_quotes_detail() {
        let line = record(Some("missing '5', \"6\"\nand 7")).to_csv_line();
        assert!(line.ends_with(",\"missing '5', \"\"6\"\" and 7\"\n"));
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn status_labels_match_log_vocabulary() {
        assert_eq!(Status::AlreadyRunning.to_string(), "Already Running");
        assert_eq!(Status::BroughtToForeground.to_string(), "Brought to Foreground");
        assert_eq!(Status::ForegroundFailed.to_string(), "Foreground Failed");
        assert_eq!(Status::Failed.to_string(), "Failed");
    }

    #[test]
    fn header_has_one_column_per_field() {
        let columns = CSV_HEADER.split(',').count();
        assert_eq!(record(None).to_csv_line().trim_end().split(',').count(), columns);
    }

    #[test]
    fn stats_average() {
        let mut stats = FarmStats::default();
        assert_eq!(stats.average(), Duration::ZERO);
        stats.record(Status::Launched, Duration::from_secs(10));
        stats.record(Status::Failed, Duration::from_secs(20));
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.average(), Duration::from_secs(15));
    }
}
