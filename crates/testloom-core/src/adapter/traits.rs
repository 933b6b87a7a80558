//! The capability surface every framework adapter implements.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use super::scan::collect_test_files;
use crate::cancel::CancelSignal;
use crate::id::TestId;
use crate::model::{DiscoveryOutput, TestRunResult, TestSuite};

/// Uniform interface over one external test framework.
///
/// Each capability is independently callable. Concrete adapters differ only
/// in how they build the framework's filter expression and how they read
/// its output; orchestration code never branches on the framework.
#[async_trait]
pub trait TestAdapter: Send + Sync {
    /// Stable framework identity (registry key).
    fn framework(&self) -> &'static str;

    /// Human-readable framework name.
    fn display_name(&self) -> &'static str;

    /// Cheap, read-only probe of `project_root`.
    ///
    /// Never fails: any I/O problem means "not detected".
    fn detect(&self, project_root: &Path) -> bool;

    /// Glob patterns (relative to the project root) of candidate sources.
    fn test_patterns(&self) -> Vec<String>;

    /// Directory names never descended into.
    fn excluded_dirs(&self) -> Vec<String>;

    /// Parses one source file into its root suite.
    ///
    /// Returns `None` when the file holds no recognizable test constructs.
    fn parse_one(&self, file: &Path, content: &str) -> Option<TestSuite>;

    /// Enumerates candidate files and parses each of them.
    ///
    /// A file that cannot be read or parsed is skipped; it never fails the
    /// pass.
    async fn discover(&self, project_root: &Path) -> DiscoveryOutput {
        let files = match collect_test_files(
            project_root,
            &self.test_patterns(),
            &self.excluded_dirs(),
        ) {
            Ok(files) => files,
            Err(e) => {
                debug!(framework = self.framework(), error = %e, "test file scan failed");
                return DiscoveryOutput::default();
            }
        };

        let mut output = DiscoveryOutput::default();
        for file in files {
            let content = match tokio::fs::read_to_string(&file).await {
                Ok(content) => content,
                Err(e) => {
                    debug!(file = %file.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            match self.parse_one(&file, &content) {
                Some(suite) => {
                    output.test_count += suite.test_count();
                    output.suites.push(suite);
                }
                None => debug!(file = %file.display(), "no tests recognized"),
            }
        }
        output
    }

    /// Runs `test_ids` (leaf identifiers, in order) under `project_root`.
    ///
    /// Never fails: spawn errors, unreadable output and cancellation all
    /// resolve to an empty or degraded result.
    async fn run(
        &self,
        project_root: &Path,
        test_ids: &[TestId],
        cancel: &CancelSignal,
    ) -> TestRunResult;
}
