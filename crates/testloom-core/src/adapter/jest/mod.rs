//! Jest adapter.
//!
//! Runs `jest --json` with a `--testNamePattern` alternation built from the
//! requested identifiers and reads results back from the JSON report.

mod parser;
mod report;

pub use parser::JestParser;
pub use report::{map_status, parse_report, JestOutcome};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use super::error::AdapterError;
use super::process::{resolve_executable, run_process, Candidate, Invocation, ProcessOutcome};
use super::traits::TestAdapter;
use crate::cancel::CancelSignal;
use crate::config::{JestConfig, JEST_CONFIG_FILES};
use crate::id::TestId;
use crate::model::{TestExecutionResult, TestRunResult, TestStatus, TestSuite};

/// Executable preference order.
const CANDIDATES: &[Candidate] = &[
    Candidate::Local("node_modules/.bin/jest"),
    Candidate::Interpreted {
        interpreter: "node",
        script: "node_modules/jest/bin/jest.js",
    },
    Candidate::Fallback {
        program: "npx",
        args: &["jest"],
    },
];

/// Adapter for the Jest test runner.
pub struct JestAdapter {
    config: JestConfig,
    exclude_dirs: Vec<String>,
    parser: JestParser,
}

impl JestAdapter {
    pub fn new(config: JestConfig, exclude_dirs: Vec<String>) -> Self {
        Self {
            config,
            exclude_dirs,
            parser: JestParser::new(),
        }
    }

    /// Arguments for running `test_ids`, after the executable's own.
    pub fn build_args(&self, test_ids: &[TestId]) -> Vec<String> {
        let mut args = vec!["--json".to_string(), "--testLocationInResults".to_string()];

        if let Some(pattern) = name_filter(test_ids) {
            args.push(format!("--testNamePattern={pattern}"));
        }
        args.extend(self.config.extra_args.iter().cloned());

        let files = distinct_files(test_ids);
        if !files.is_empty() {
            args.push("--runTestsByPath".to_string());
            args.extend(files.iter().map(|f| f.to_string_lossy().into_owned()));
        }
        args
    }

    async fn execute(
        &self,
        project_root: &Path,
        test_ids: &[TestId],
        cancel: &CancelSignal,
    ) -> Result<TestRunResult, AdapterError> {
        let mut invocation: Invocation = resolve_executable(
            project_root,
            self.config.executable.as_deref(),
            CANDIDATES,
        )
        .ok_or_else(|| AdapterError::ExecutableNotFound {
            framework: self.display_name().to_string(),
            root: project_root.to_path_buf(),
        })?;
        invocation.args.extend(self.build_args(test_ids));

        let output = match run_process(&invocation, project_root, cancel).await? {
            ProcessOutcome::Completed(output) => output,
            ProcessOutcome::Cancelled => {
                info!(framework = "jest", "run cancelled");
                return Ok(TestRunResult::empty());
            }
        };

        let outcome = parse_report(&output.stdout)?;
        let results = select_results(outcome, test_ids);
        Ok(TestRunResult::from_results(results, output.duration_ms))
    }
}

#[async_trait]
impl TestAdapter for JestAdapter {
    fn framework(&self) -> &'static str {
        "jest"
    }

    fn display_name(&self) -> &'static str {
        "Jest"
    }

    fn detect(&self, project_root: &Path) -> bool {
        if JEST_CONFIG_FILES
            .iter()
            .any(|name| project_root.join(name).is_file())
        {
            return true;
        }

        let Ok(raw) = std::fs::read_to_string(project_root.join("package.json")) else {
            return false;
        };
        let Ok(manifest) = serde_json::from_str::<Value>(&raw) else {
            return false;
        };

        manifest.get("jest").is_some()
            || ["dependencies", "devDependencies"]
                .iter()
                .any(|section| manifest.get(section).and_then(|deps| deps.get("jest")).is_some())
    }

    fn test_patterns(&self) -> Vec<String> {
        self.config.patterns.clone()
    }

    fn excluded_dirs(&self) -> Vec<String> {
        self.exclude_dirs.clone()
    }

    fn parse_one(&self, file: &Path, content: &str) -> Option<TestSuite> {
        match self.parser.parse(file, content) {
            Ok(suite) => suite,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "jest parse failed");
                None
            }
        }
    }

    async fn run(
        &self,
        project_root: &Path,
        test_ids: &[TestId],
        cancel: &CancelSignal,
    ) -> TestRunResult {
        match self.execute(project_root, test_ids, cancel).await {
            Ok(result) => result,
            Err(e) => {
                warn!(framework = "jest", root = %project_root.display(), error = %e, "run failed");
                TestRunResult::empty()
            }
        }
    }
}

/// Anchored alternation of the escaped name patterns.
///
/// `None` when any id is file-level: an empty pattern means "no filter".
fn name_filter(test_ids: &[TestId]) -> Option<String> {
    let patterns: Vec<String> = test_ids.iter().map(TestId::to_name_pattern).collect();
    if patterns.is_empty() || patterns.iter().any(String::is_empty) {
        return None;
    }
    let escaped: Vec<String> = patterns.iter().map(|p| regex::escape(p)).collect();
    Some(format!("^(?:{})$", escaped.join("|")))
}

/// Source files behind `test_ids`, first-seen order.
fn distinct_files(test_ids: &[TestId]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    for id in test_ids {
        match id.file_path() {
            Some(path) if !files.contains(&path) => files.push(path),
            Some(_) => {}
            None => return Vec::new(),
        }
    }
    files
}

/// Drops tests Jest skipped only because the name filter excluded them, and
/// fails requested tests whose whole file failed to load.
fn select_results(outcome: JestOutcome, test_ids: &[TestId]) -> Vec<TestExecutionResult> {
    let mut results: Vec<TestExecutionResult> = outcome
        .results
        .into_iter()
        .filter(|r| r.status != TestStatus::Skipped || test_ids.iter().any(|id| id.matches(&r.test_id)))
        .collect();

    for (token, message) in outcome.file_failures {
        let token = token.to_lowercase();
        for id in test_ids {
            let covered = results.iter().any(|r| r.test_id.matches(id));
            if !covered && id.file_token().to_lowercase() == token {
                results.push(
                    TestExecutionResult::new(id.clone(), TestStatus::Failed, 0)
                        .with_error(message.lines().next().unwrap_or_default(), Some(message.clone())),
                );
            }
        }
    }
    results
}
