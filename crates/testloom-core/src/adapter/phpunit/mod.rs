//! PHPUnit adapter.
//!
//! Runs `phpunit --log-junit <report> --testdox` with a `--filter`
//! alternation of `Class::method` tokens. Results come from the JUnit report
//! when one was written, otherwise from the console output.

mod console;
mod junit;
mod parser;

pub use console::{humanize, parse_console, ConsoleOutcome};
pub use junit::{parse_junit, JunitCase};
pub use parser::parse_php;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::AdapterError;
use super::process::{resolve_executable, run_process, Candidate, Invocation, ProcessOutcome};
use super::traits::TestAdapter;
use crate::cancel::CancelSignal;
use crate::config::{PhpUnitConfig, PHPUNIT_MARKER_FILES, PHPUNIT_PACKAGE};
use crate::id::{file_token, TestId};
use crate::model::{TestExecutionResult, TestRunResult, TestStatus, TestSuite};

/// Executable preference order.
const CANDIDATES: &[Candidate] = &[
    Candidate::Local("vendor/bin/phpunit"),
    Candidate::Interpreted {
        interpreter: "php",
        script: "vendor/phpunit/phpunit/phpunit",
    },
    Candidate::Fallback {
        program: "phpunit",
        args: &[],
    },
];

/// Message attached to requested tests the console output says nothing about.
const NO_CONSOLE_STATUS: &str = "no per-test status in console output";

/// Adapter for the PHPUnit test runner.
pub struct PhpUnitAdapter {
    config: PhpUnitConfig,
    exclude_dirs: Vec<String>,
    report_prefix: String,
}

impl PhpUnitAdapter {
    pub fn new(config: PhpUnitConfig, exclude_dirs: Vec<String>, report_prefix: String) -> Self {
        Self {
            config,
            exclude_dirs,
            report_prefix,
        }
    }

    /// Arguments for running `test_ids`, after the executable's own.
    pub fn build_args(&self, test_ids: &[TestId], report: &Path) -> Vec<String> {
        let mut args = vec![
            "--log-junit".to_string(),
            report.to_string_lossy().into_owned(),
            "--testdox".to_string(),
        ];

        if let Some(filter) = filter_expression(test_ids) {
            args.push("--filter".to_string());
            args.push(filter);
        }
        args.extend(self.config.extra_args.iter().cloned());

        if let [file] = distinct_files(test_ids).as_slice() {
            args.push(file.to_string_lossy().into_owned());
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

        // Removed on every return path below, including `?` and cancellation.
        let report = ReportFile::new(project_root, &self.report_prefix);
        invocation.args.extend(self.build_args(test_ids, report.path()));

        let output = match run_process(&invocation, project_root, cancel).await? {
            ProcessOutcome::Completed(output) => output,
            ProcessOutcome::Cancelled => {
                info!(framework = "phpunit", "run cancelled");
                return Ok(TestRunResult::empty());
            }
        };

        let structured = match report.read().await {
            Ok(xml) => match parse_junit(&xml) {
                Ok(cases) if !cases.is_empty() => Some(junit_results(cases, test_ids)),
                Ok(_) => None,
                Err(e) => {
                    debug!(error = %e, "unusable junit report");
                    None
                }
            },
            Err(e) => {
                debug!(error = %e, "no junit report written");
                None
            }
        };

        let results = match structured {
            Some(results) => results,
            None => {
                debug!(framework = "phpunit", "falling back to console output");
                let text = output.combined();
                console_results(&parse_console(&text), test_ids, output.exit_code, &text)
            }
        };
        Ok(TestRunResult::from_results(results, output.duration_ms))
    }
}

#[async_trait]
impl TestAdapter for PhpUnitAdapter {
    fn framework(&self) -> &'static str {
        "phpunit"
    }

    fn display_name(&self) -> &'static str {
        "PHPUnit"
    }

    fn detect(&self, project_root: &Path) -> bool {
        if PHPUNIT_MARKER_FILES
            .iter()
            .any(|name| project_root.join(name).is_file())
        {
            return true;
        }

        let Ok(raw) = std::fs::read_to_string(project_root.join("composer.json")) else {
            return false;
        };
        let Ok(manifest) = serde_json::from_str::<Value>(&raw) else {
            return false;
        };

        ["require", "require-dev"].iter().any(|section| {
            manifest
                .get(section)
                .and_then(|deps| deps.get(PHPUNIT_PACKAGE))
                .is_some()
        })
    }

    fn test_patterns(&self) -> Vec<String> {
        self.config.patterns.clone()
    }

    fn excluded_dirs(&self) -> Vec<String> {
        self.exclude_dirs.clone()
    }

    fn parse_one(&self, file: &Path, content: &str) -> Option<TestSuite> {
        parse_php(file, content)
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
                warn!(framework = "phpunit", root = %project_root.display(), error = %e, "run failed");
                TestRunResult::empty()
            }
        }
    }
}

/// Temporary JUnit report path, deleted when dropped.
struct ReportFile {
    path: PathBuf,
}

impl ReportFile {
    fn new(root: &Path, prefix: &str) -> Self {
        Self {
            path: root.join(format!("{}-{}.xml", prefix, Uuid::new_v4())),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<String, AdapterError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| AdapterError::io(&self.path, e))
    }
}

impl Drop for ReportFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed junit report"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove junit report"),
        }
    }
}

/// `(class, method)` named by an identifier's last two segments.
fn class_and_method(id: &TestId) -> Option<(String, String)> {
    let mut segments = id.decode().segments;
    let method = segments.pop()?;
    let class = segments.pop()?;
    Some((class, method))
}

/// `/\b(?:Class::method|…)\b/`, or `None` when any id is file-level.
fn filter_expression(test_ids: &[TestId]) -> Option<String> {
    let mut tokens = Vec::new();
    for id in test_ids {
        let segments = id.decode().segments;
        let token = match segments.as_slice() {
            [] => return None,
            [class] => format!("{}::", regex::escape(class)),
            [.., class, method] => format!("{}::{}", regex::escape(class), regex::escape(method)),
        };
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    if tokens.is_empty() {
        return None;
    }
    Some(format!(r"/\b(?:{})\b/", tokens.join("|")))
}

/// Source files behind `test_ids`, first-seen order.
fn distinct_files(test_ids: &[TestId]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    for id in test_ids {
        if let Some(path) = id.file_path() {
            if !files.contains(&path) {
                files.push(path);
            }
        }
    }
    files
}

fn status_rank(status: TestStatus) -> u8 {
    match status {
        TestStatus::Failed => 2,
        TestStatus::Passed => 1,
        TestStatus::Skipped => 0,
    }
}

/// Converts JUnit cases into results keyed by rebuilt identifiers.
///
/// Data-provider rows collapse into their method: durations add up and the
/// worst status wins.
fn junit_results(cases: Vec<JunitCase>, test_ids: &[TestId]) -> Vec<TestExecutionResult> {
    let mut results: Vec<TestExecutionResult> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for case in cases {
        let id = match &case.file {
            Some(file) => TestId::encode(
                &[case.short_class(), case.method()],
                &file_token(Path::new(file)),
            ),
            None => match requested_by_name(test_ids, case.short_class(), case.method()) {
                Some(id) => id.clone(),
                None => {
                    debug!(class = %case.class, name = %case.name, "junit case without file");
                    continue;
                }
            },
        };

        let duration_ms = (case.time_secs * 1000.0).round().max(0.0) as u64;
        match index.get(&id.key()) {
            Some(&i) => {
                let merged = &mut results[i];
                merged.duration_ms += duration_ms;
                if status_rank(case.status) > status_rank(merged.status) {
                    merged.status = case.status;
                    merged.error_message = case.message;
                    merged.error_stack = case.detail;
                }
            }
            None => {
                let mut result = TestExecutionResult::new(id.clone(), case.status, duration_ms);
                if let Some(message) = case.message {
                    result = result.with_error(message, case.detail);
                }
                index.insert(id.key(), results.len());
                results.push(result);
            }
        }
    }
    results
}

fn requested_by_name<'a>(test_ids: &'a [TestId], class: &str, method: &str) -> Option<&'a TestId> {
    test_ids.iter().find(|id| {
        class_and_method(id).is_some_and(|(c, m)| {
            c.eq_ignore_ascii_case(class) && m.eq_ignore_ascii_case(method)
        })
    })
}

/// Per-test statuses for `test_ids` inferred from console output.
///
/// A failure heading wins over a testdox glyph. Tests the output is silent
/// about pass when the run passed as a whole; a run that printed no summary
/// and exited non-zero fails every requested test.
fn console_results(
    outcome: &ConsoleOutcome,
    test_ids: &[TestId],
    exit_code: Option<i32>,
    raw_output: &str,
) -> Vec<TestExecutionResult> {
    let exit_ok = exit_code == Some(0);
    let crashed = !outcome.summary.found && !exit_ok;
    let crash_message = raw_output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| match exit_code {
            Some(code) => format!("phpunit exited with status {code}"),
            None => "phpunit was terminated".to_string(),
        });

    let mut results = Vec::new();
    for id in test_ids {
        let Some((class, method)) = class_and_method(id) else {
            continue;
        };

        let failure = outcome.failures.iter().find(|f| {
            f.short_class().eq_ignore_ascii_case(&class) && f.method.eq_ignore_ascii_case(&method)
        });
        if let Some(failure) = failure {
            let message = failure
                .message
                .clone()
                .unwrap_or_else(|| format!("{}::{} failed", class, method));
            results.push(
                TestExecutionResult::new(id.clone(), TestStatus::Failed, 0).with_error(message, None),
            );
            continue;
        }

        let label = humanize(&method);
        let title = class.strip_suffix("Test").unwrap_or(&class);
        let dox = outcome.dox.iter().find(|d| {
            d.label.eq_ignore_ascii_case(&label)
                && d.class.as_deref().map_or(true, |c| {
                    c.eq_ignore_ascii_case(title) || c.eq_ignore_ascii_case(&class)
                })
        });
        if let Some(dox) = dox {
            results.push(TestExecutionResult::new(id.clone(), dox.status, 0));
            continue;
        }

        let result = if crashed {
            TestExecutionResult::new(id.clone(), TestStatus::Failed, 0)
                .with_error(crash_message.clone(), Some(raw_output.to_string()))
        } else if outcome.summary.found && exit_ok && !outcome.summary.has_failures() {
            TestExecutionResult::new(id.clone(), TestStatus::Passed, 0)
        } else {
            TestExecutionResult::new(id.clone(), TestStatus::Skipped, 0)
                .with_error(NO_CONSOLE_STATUS, None)
        };
        results.push(result);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn adapter() -> PhpUnitAdapter {
        PhpUnitAdapter::new(
            PhpUnitConfig::default(),
            vec!["vendor".to_string()],
            ".testloom-report".to_string(),
        )
    }

    fn math_id(method: &str) -> TestId {
        TestId::encode(
            &["MathTest", method],
            &file_token(Path::new("/proj/tests/MathTest.php")),
        )
    }

    fn leftover_reports(root: &Path) -> usize {
        fs::read_dir(root)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".testloom-report"))
            .count()
    }

    #[test]
    fn test_detect_from_composer() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        assert!(!adapter().detect(root));

        fs::write(
            root.join("composer.json"),
            r#"{"require-dev": {"phpunit/phpunit": "^10.5"}}"#,
        )
        .unwrap();
        assert!(adapter().detect(root));
    }

    #[test]
    fn test_detect_from_marker_file() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("phpunit.xml.dist"), "<phpunit/>").unwrap();
        assert!(adapter().detect(temp_dir.path()));
    }

    #[test]
    fn test_filter_expression() {
        let ids = vec![math_id("testAdds"), math_id("testSubtracts"), math_id("testAdds")];
        assert_eq!(
            filter_expression(&ids).unwrap(),
            r"/\b(?:MathTest::testAdds|MathTest::testSubtracts)\b/"
        );

        let file_level = TestId::for_file(Path::new("/proj/tests/MathTest.php"));
        assert!(filter_expression(&[math_id("testAdds"), file_level]).is_none());
    }

    #[test]
    fn test_build_args_single_file() {
        let report = Path::new("/proj/.testloom-report-x.xml");
        let args = adapter().build_args(&[math_id("testAdds")], report);
        assert_eq!(
            args,
            vec![
                "--log-junit",
                "/proj/.testloom-report-x.xml",
                "--testdox",
                "--filter",
                r"/\b(?:MathTest::testAdds)\b/",
                "/proj/tests/MathTest.php",
            ]
        );
    }

    #[test]
    fn test_build_args_two_files_omit_path() {
        let other = TestId::encode(
            &["StrTest", "testUpper"],
            &file_token(Path::new("/proj/tests/StrTest.php")),
        );
        let args = adapter().build_args(&[math_id("testAdds"), other], Path::new("/r.xml"));
        assert!(!args.iter().any(|a| a.ends_with(".php")));
    }

    #[test]
    fn test_junit_results_merge_data_sets() {
        let case = |name: &str, status, time| JunitCase {
            name: name.to_string(),
            class: "Tests\\MathTest".to_string(),
            file: Some("/proj/tests/MathTest.php".to_string()),
            line: None,
            time_secs: time,
            status,
            message: (status == TestStatus::Failed).then(|| "boom".to_string()),
            detail: None,
        };
        let cases = vec![
            case("testPow with data set #0", TestStatus::Passed, 0.010),
            case("testPow with data set #1", TestStatus::Failed, 0.005),
            case("testAdds", TestStatus::Passed, 0.001),
        ];

        let results = junit_results(cases, &[]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].test_id, math_id("testPow"));
        assert_eq!(results[0].status, TestStatus::Failed);
        assert_eq!(results[0].duration_ms, 15);
        assert_eq!(results[0].error_message.as_deref(), Some("boom"));
        assert_eq!(results[1].status, TestStatus::Passed);
    }

    #[test]
    fn test_junit_case_without_file_matches_request() {
        let case = JunitCase {
            name: "testadds".to_string(),
            class: "MATHTEST".to_string(),
            file: None,
            line: None,
            time_secs: 0.0,
            status: TestStatus::Passed,
            message: None,
            detail: None,
        };
        let results = junit_results(vec![case.clone()], &[math_id("testAdds")]);
        assert_eq!(results[0].test_id, math_id("testAdds"));

        assert!(junit_results(vec![case], &[]).is_empty());
    }

    #[test]
    fn test_console_results() {
        let output = "Math (Tests\\MathTest)\n ✔ Adds\n\n1) Tests\\MathTest::testSubtracts\nnope\n\nFAILURES!\nTests: 3, Assertions: 3, Failures: 1.\n";
        let outcome = parse_console(output);
        let ids = vec![math_id("testAdds"), math_id("testSubtracts"), math_id("testDivides")];

        let results = console_results(&outcome, &ids, Some(1), output);
        assert_eq!(results[0].status, TestStatus::Passed);
        assert_eq!(results[1].status, TestStatus::Failed);
        assert_eq!(results[1].error_message.as_deref(), Some("nope"));
        assert_eq!(results[2].status, TestStatus::Skipped);
        assert_eq!(results[2].error_message.as_deref(), Some(NO_CONSOLE_STATUS));
    }

    #[test]
    fn test_console_results_green_run_passes_silent_tests() {
        let output = "OK (2 tests, 2 assertions)\n";
        let results = console_results(
            &parse_console(output),
            &[math_id("testAdds"), math_id("testSubtracts")],
            Some(0),
            output,
        );
        assert!(results.iter().all(|r| r.status == TestStatus::Passed));
    }

    #[test]
    fn test_console_results_crash_fails_everything() {
        let output = "PHP Fatal error:  Uncaught Error: Class \"Calc\" not found\n";
        let results = console_results(&parse_console(output), &[math_id("testAdds")], Some(255), output);
        assert_eq!(results[0].status, TestStatus::Failed);
        assert!(results[0].error_message.as_deref().unwrap().starts_with("PHP Fatal error"));
    }

    #[test]
    fn test_report_file_is_removed_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let path = {
            let report = ReportFile::new(temp_dir.path(), ".testloom-report");
            fs::write(report.path(), "<testsuites/>").unwrap();
            report.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(leftover_reports(temp_dir.path()), 0);
    }

    #[cfg(unix)]
    fn stub_phpunit(root: &Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let bin = root.join("vendor/bin/phpunit");
        fs::create_dir_all(bin.parent().unwrap()).unwrap();
        let script = format!(
            "#!/bin/sh\nout=\"\"\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"--log-junit\" ]; then out=\"$2\"; fi\n  shift\ndone\n{body}\n"
        );
        fs::write(&bin, script).unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reads_junit_and_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let test_file = root.join("tests/MathTest.php");
        fs::write(
            root.join("fixture.xml"),
            format!(
                r#"<testsuites><testsuite name="MathTest"><testcase name="testAdds" class="Tests\MathTest" file="{}" time="0.002"/></testsuite></testsuites>"#,
                test_file.display()
            ),
        )
        .unwrap();
        stub_phpunit(root, "cat fixture.xml > \"$out\"\nexit 0");

        let id = TestId::encode(&["MathTest", "testAdds"], &file_token(&test_file));
        let result = adapter().run(root, &[id.clone()], &CancelSignal::new()).await;

        assert_eq!(result.passed, 1);
        assert_eq!(result.results[0].test_id, id);
        assert_eq!(result.results[0].duration_ms, 2);
        assert_eq!(leftover_reports(root), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_falls_back_to_console() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        stub_phpunit(root, "echo 'OK (1 test, 1 assertion)'\nexit 0");

        let id = TestId::encode(
            &["MathTest", "testAdds"],
            &file_token(&root.join("tests/MathTest.php")),
        );
        let result = adapter().run(root, &[id], &CancelSignal::new()).await;
        assert_eq!(result.passed, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_removes_report() {
        use std::time::{Duration, Instant};

        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        stub_phpunit(root, "touch \"$out\"\nsleep 30");

        let cancel = CancelSignal::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = adapter().run(root, &[math_id("testAdds")], &cancel).await;

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(result.results.is_empty());
        assert_eq!((result.passed, result.failed, result.skipped), (0, 0, 0));
        assert_eq!(leftover_reports(root), 0);
    }
}
