//! Reading Jest's `--json` report.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::adapter::error::AdapterError;
use crate::id::{file_token, TestId};
use crate::model::{TestExecutionResult, TestStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JestReport {
    #[serde(default)]
    test_results: Vec<JestFileResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JestFileResult {
    /// Absolute path of the test file.
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    assertion_results: Vec<JestAssertion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JestAssertion {
    #[serde(default)]
    ancestor_titles: Vec<String>,
    title: String,
    status: String,
    duration: Option<f64>,
    #[serde(default)]
    failure_messages: Vec<String>,
}

/// Per-test results plus files that failed before any test ran.
#[derive(Debug, Default)]
pub struct JestOutcome {
    pub results: Vec<TestExecutionResult>,
    /// `(file token, message)` for suites that failed to load.
    pub file_failures: Vec<(String, String)>,
}

/// Maps Jest's status vocabulary onto the three-valued status.
pub fn map_status(status: &str) -> TestStatus {
    match status {
        "passed" => TestStatus::Passed,
        "failed" => TestStatus::Failed,
        // "pending", "skipped", "todo", "disabled" and anything new.
        _ => TestStatus::Skipped,
    }
}

/// Parses the JSON report printed on stdout.
///
/// Non-JSON noise printed before or after the report is skipped.
pub fn parse_report(stdout: &str) -> Result<JestOutcome, AdapterError> {
    let json = extract_json(stdout)
        .ok_or_else(|| AdapterError::parse("jest report", "no JSON object in output"))?;
    // Only the first value counts; anything printed after it is noise.
    let report: JestReport = serde_json::Deserializer::from_str(json)
        .into_iter::<JestReport>()
        .next()
        .ok_or_else(|| AdapterError::parse("jest report", "empty JSON report"))?
        .map_err(|e| AdapterError::parse("jest report", e.to_string()))?;

    let mut outcome = JestOutcome::default();
    for file in report.test_results {
        let token = file_token(Path::new(&file.name));

        if file.assertion_results.is_empty() && file.status == "failed" {
            outcome
                .file_failures
                .push((token.clone(), strip_ansi(&file.message)));
        }

        for assertion in file.assertion_results {
            let mut names = assertion.ancestor_titles;
            names.push(assertion.title);

            let mut result = TestExecutionResult::new(
                TestId::encode(&names, &token),
                map_status(&assertion.status),
                assertion.duration.map(|d| d.max(0.0) as u64).unwrap_or(0),
            );
            if !assertion.failure_messages.is_empty() {
                let stack = strip_ansi(&assertion.failure_messages.join("\n"));
                let message = stack.lines().next().unwrap_or_default().to_string();
                result = result.with_error(message, Some(stack));
            }
            outcome.results.push(result);
        }
    }

    Ok(outcome)
}

/// The JSON object in `output`, starting at the first line opening with `{`.
fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if trimmed.starts_with('{') {
        return Some(trimmed);
    }

    let mut offset = 0;
    for line in output.split_inclusive('\n') {
        if line.trim_start().starts_with('{') {
            return Some(output[offset..].trim());
        }
        offset += line.len();
    }
    None
}

fn strip_ansi(text: &str) -> String {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let ansi = ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid regex"));
    ansi.replace_all(text, "").into_owned()
}
