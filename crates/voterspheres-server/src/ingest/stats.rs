//! Import statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{BatchOutcome, RowSkip};

/// Skip reasons kept per import; later skips are only counted
pub const MAX_SKIP_REASONS: usize = 100;

/// How an import ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportOutcome {
    Success,
    /// Finished, but at least one record was skipped
    Partial,
    /// Aborted: source unreachable past the retry ceiling, or the store failed
    Fatal,
    /// Stopped by shutdown between batches
    Cancelled,
}

impl ImportOutcome {
    /// Process exit code for the admin CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            ImportOutcome::Success => 0,
            ImportOutcome::Fatal => 1,
            ImportOutcome::Partial => 2,
            ImportOutcome::Cancelled => 130,
        }
    }
}

impl std::fmt::Display for ImportOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ImportOutcome::Success => "success",
            ImportOutcome::Partial => "partial",
            ImportOutcome::Fatal => "fatal",
            ImportOutcome::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Statistics collected during one import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportStats {
    pub source: String,
    pub pages_fetched: u64,
    /// Rows seen, malformed ones included
    pub rows_read: u64,
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
    /// First [`MAX_SKIP_REASONS`] skips
    pub skip_reasons: Vec<RowSkip>,
    pub outcome: ImportOutcome,
    /// Why a fatal import stopped
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
}

impl ImportStats {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            pages_fetched: 0,
            rows_read: 0,
            inserted: 0,
            updated: 0,
            skipped: 0,
            skip_reasons: Vec::new(),
            outcome: ImportOutcome::Success,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_secs: 0.0,
        }
    }

    pub fn record_skip(&mut self, reference: impl Into<String>, reason: impl Into<String>) {
        self.skipped += 1;
        if self.skip_reasons.len() < MAX_SKIP_REASONS {
            self.skip_reasons.push(RowSkip {
                reference: reference.into(),
                reason: reason.into(),
            });
        }
    }

    /// Fold one batch result into the totals
    pub fn absorb(&mut self, outcome: BatchOutcome) {
        self.inserted += outcome.inserted;
        self.updated += outcome.updated;
        for skip in outcome.skipped {
            self.record_skip(skip.reference, skip.reason);
        }
    }

    /// Records written (inserted or updated)
    pub fn imported(&self) -> u64 {
        self.inserted + self.updated
    }

    /// Stamp the end time. A `Success` with skips is reported as `Partial`.
    pub fn finish(mut self, outcome: ImportOutcome) -> Self {
        self.outcome = match outcome {
            ImportOutcome::Success if self.skipped > 0 => ImportOutcome::Partial,
            other => other,
        };
        let end = Utc::now();
        self.completed_at = Some(end);
        self.duration_secs = (end - self.started_at).num_milliseconds() as f64 / 1000.0;
        self
    }

    pub fn fail(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.finish(ImportOutcome::Fatal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ImportOutcome::Success.exit_code(), 0);
        assert_eq!(ImportOutcome::Fatal.exit_code(), 1);
        assert_eq!(ImportOutcome::Partial.exit_code(), 2);
    }

    #[test]
    fn test_skips_turn_success_into_partial() {
        let mut stats = ImportStats::new("file");
        stats.absorb(BatchOutcome {
            inserted: 3,
            updated: 1,
            skipped: vec![RowSkip {
                reference: "file:7".into(),
                reason: "missing name".into(),
            }],
            ..Default::default()
        });

        let stats = stats.finish(ImportOutcome::Success);
        assert_eq!(stats.outcome, ImportOutcome::Partial);
        assert_eq!(stats.imported(), 4);
        assert!(stats.completed_at.is_some());
    }

    #[test]
    fn test_skip_reasons_are_bounded() {
        let mut stats = ImportStats::new("api");
        for i in 0..(MAX_SKIP_REASONS + 20) {
            stats.record_skip(format!("api:{}", i), "bad");
        }
        assert_eq!(stats.skipped, (MAX_SKIP_REASONS + 20) as u64);
        assert_eq!(stats.skip_reasons.len(), MAX_SKIP_REASONS);
    }

    #[test]
    fn test_fail_keeps_error() {
        let stats = ImportStats::new("api").fail("page 3 unreachable");
        assert_eq!(stats.outcome, ImportOutcome::Fatal);
        assert_eq!(stats.error.as_deref(), Some("page 3 unreachable"));
    }
}
