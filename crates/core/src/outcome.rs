use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one backup attempt. History entries are append-only and never
/// mutated; `error_detail` is present iff the attempt failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupOutcome {
    pub artifact_name: Option<String>,
    pub duration_ms: i64,
    pub occurred_at: DateTime<Utc>,
    pub succeeded: bool,
    pub error_detail: Option<String>,
}

impl BackupOutcome {
    pub fn success(artifact_name: String, duration_ms: i64, occurred_at: DateTime<Utc>) -> Self {
        Self {
            artifact_name: Some(artifact_name),
            duration_ms,
            occurred_at,
            succeeded: true,
            error_detail: None,
        }
    }

    pub fn failure(error_detail: String, duration_ms: i64, occurred_at: DateTime<Utc>) -> Self {
        Self {
            artifact_name: None,
            duration_ms,
            occurred_at,
            succeeded: false,
            error_detail: Some(error_detail),
        }
    }
}

/// Aggregate over the concatenated histories of every schedule, computed for
/// each reporting trigger. Reporting only reads history, it never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub attempts: usize,
    pub successes: usize,
    pub failures: usize,
    pub mean_duration_ms: f64,
}

impl ReportSummary {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a BackupOutcome>) -> Self {
        let mut attempts = 0usize;
        let mut successes = 0usize;
        let mut total_duration_ms = 0i64;
        for outcome in outcomes {
            attempts += 1;
            if outcome.succeeded {
                successes += 1;
            }
            total_duration_ms += outcome.duration_ms;
        }
        let mean_duration_ms = if attempts == 0 {
            0.0
        } else {
            total_duration_ms as f64 / attempts as f64
        };
        Self {
            attempts,
            successes,
            failures: attempts - successes,
            mean_duration_ms,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{} backup attempts across all schedules: {} succeeded, {} failed, mean duration {:.0} ms",
            self.attempts, self.successes, self.failures, self.mean_duration_ms
        )
    }
}
