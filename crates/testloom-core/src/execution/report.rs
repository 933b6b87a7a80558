//! Run statistics handed back to the host.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::id::{path_from_token, TestId};
use crate::model::{TestExecutionResult, TestStatus};

/// Pass/fail/skip counters plus summed duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

impl RunStats {
    pub fn record(&mut self, status: TestStatus, duration_ms: u64) {
        match status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::Skipped => self.skipped += 1,
        }
        self.duration_ms += duration_ms;
    }

    pub fn merge(&mut self, other: &RunStats) {
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.duration_ms += other.duration_ms;
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

/// Statistics for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStats {
    pub file_token: String,
    /// Decoded from the token; `None` if the token is malformed.
    pub file: Option<PathBuf>,
    #[serde(flatten)]
    pub stats: RunStats,
}

impl FileStats {
    pub fn new(file_token: impl Into<String>) -> Self {
        let file_token = file_token.into();
        Self {
            file: path_from_token(&file_token),
            file_token,
            stats: RunStats::default(),
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    /// One entry per file among the requested tests, first-seen order.
    pub per_file: Vec<FileStats>,
    /// Cross-file totals; `None` when the run touched a single file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<RunStats>,
    /// Reconciled results, identifiers rewritten to the tree's own.
    pub results: Vec<TestExecutionResult>,
    /// Result identifiers that matched no tree node.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unmatched: Vec<TestId>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn is_single_file(&self) -> bool {
        self.aggregate.is_none()
    }

    /// Totals over all files, whether or not `aggregate` is reported.
    pub fn totals(&self) -> RunStats {
        let mut totals = RunStats::default();
        for file in &self.per_file {
            totals.merge(&file.stats);
        }
        totals
    }
}
