//! Data model shared by adapters and orchestrators.
//!
//! Suites and cases are produced fresh by every discovery pass. Execution
//! results are produced only by an adapter's run step.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::id::TestId;

/// Source position of a suite or case (1-based line and column).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestLocation {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl TestLocation {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

/// A leaf test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: TestId,
    pub name: String,
    /// Name as the framework reports it (ancestors included).
    pub full_name: String,
    pub location: TestLocation,
    /// `None` only for a root-level case with no enclosing suite.
    pub parent_id: Option<TestId>,
}

/// A grouping node: a file, a `describe` block or a test class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSuite {
    pub id: TestId,
    pub name: String,
    pub location: TestLocation,
    /// Source order.
    pub children: Vec<TestItem>,
    pub parent_id: Option<TestId>,
}

/// A child of a suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TestItem {
    Suite(TestSuite),
    Case(TestCase),
}

impl TestItem {
    pub fn id(&self) -> &TestId {
        match self {
            TestItem::Suite(suite) => &suite.id,
            TestItem::Case(case) => &case.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            TestItem::Suite(suite) => &suite.name,
            TestItem::Case(case) => &case.name,
        }
    }
}

impl TestSuite {
    /// Creates an empty suite.
    pub fn new(
        id: TestId,
        name: impl Into<String>,
        location: TestLocation,
        parent_id: Option<TestId>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            location,
            children: Vec::new(),
            parent_id,
        }
    }

    /// Number of cases in this suite and all nested suites.
    pub fn test_count(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                TestItem::Suite(suite) => suite.test_count(),
                TestItem::Case(_) => 1,
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Outcome of discovering one project root.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutput {
    /// One root suite per file that contained tests.
    pub suites: Vec<TestSuite>,
    pub test_count: usize,
}

/// Three-valued execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result for one executed leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestExecutionResult {
    pub test_id: TestId,
    pub status: TestStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_stack: Option<String>,
}

impl TestExecutionResult {
    pub fn new(test_id: TestId, status: TestStatus, duration_ms: u64) -> Self {
        Self {
            test_id,
            status,
            duration_ms,
            error_message: None,
            error_stack: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>, stack: Option<String>) -> Self {
        self.error_message = Some(message.into());
        self.error_stack = stack;
        self
    }
}

/// Aggregate outcome of one adapter run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestRunResult {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<TestExecutionResult>,
}

impl TestRunResult {
    /// The result of a cancelled or failed run.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the counters from `results`.
    pub fn from_results(results: Vec<TestExecutionResult>, duration_ms: u64) -> Self {
        let mut run = Self {
            duration_ms,
            ..Self::default()
        };
        for result in &results {
            match result.status {
                TestStatus::Passed => run.passed += 1,
                TestStatus::Failed => run.failed += 1,
                TestStatus::Skipped => run.skipped += 1,
            }
        }
        run.results = results;
        run
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.passed == 0 && self.failed == 0 && self.skipped == 0
    }
}
