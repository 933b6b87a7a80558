//! A scriptable in-process adapter for orchestrator tests.
//!
//! Sources are `*.fake` files with one `Suite::case` per line. Runs never
//! spawn anything: statuses come from the adapter's script.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use testloom_core::{
    AdapterRegistry, CancelSignal, Config, DiscoveryOrchestrator, ExecutionOrchestrator,
    TestAdapter, TestCase, TestExecutionResult, TestId, TestItem, TestLocation, TestRunResult,
    TestSession, TestStatus, TestSuite,
};

pub const MARKER: &str = "fake.marker";

#[derive(Default)]
pub struct FakeAdapter {
    /// Status per case name (lowercase); unlisted cases pass.
    pub statuses: HashMap<String, TestStatus>,
    /// Report identifiers upper-cased, as a case-insensitive tool might.
    pub shout_ids: bool,
    /// Also report a result for a test that does not exist.
    pub report_ghost: bool,
    /// Passed results reported on top of the requested ones, as
    /// (file relative to the root, suite, case).
    pub also_report: Vec<(&'static str, &'static str, &'static str)>,
    /// Hang until cancelled, then report nothing.
    pub block_until_cancel: bool,
    /// Identifiers received by each `run` call.
    pub calls: Mutex<Vec<Vec<TestId>>>,
}

impl FakeAdapter {
    pub fn with_status(mut self, case: &str, status: TestStatus) -> Self {
        self.statuses.insert(case.to_lowercase(), status);
        self
    }

    pub fn calls(&self) -> Vec<Vec<TestId>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TestAdapter for FakeAdapter {
    fn framework(&self) -> &'static str {
        "fake"
    }

    fn display_name(&self) -> &'static str {
        "Fake"
    }

    fn detect(&self, project_root: &Path) -> bool {
        project_root.join(MARKER).is_file()
    }

    fn test_patterns(&self) -> Vec<String> {
        vec!["**/*.fake".to_string()]
    }

    fn excluded_dirs(&self) -> Vec<String> {
        vec!["node_modules".to_string()]
    }

    fn parse_one(&self, file: &Path, content: &str) -> Option<TestSuite> {
        let file_id = TestId::for_file(file);
        let mut root = TestSuite::new(file_id.clone(), "file", TestLocation::new(file, 1, 1), None);

        for (line_no, line) in content.lines().enumerate() {
            let Some((suite_name, case_name)) = line.trim().split_once("::") else {
                continue;
            };
            let location = TestLocation::new(file, line_no as u32 + 1, 1);
            let position = root.children.iter().position(|c| c.name() == suite_name);
            let index = match position {
                Some(index) => index,
                None => {
                    root.children.push(TestItem::Suite(TestSuite::new(
                        file_id.child(suite_name),
                        suite_name,
                        location.clone(),
                        Some(file_id.clone()),
                    )));
                    root.children.len() - 1
                }
            };
            if let TestItem::Suite(suite) = &mut root.children[index] {
                suite.children.push(TestItem::Case(TestCase {
                    id: suite.id.child(case_name),
                    name: case_name.to_string(),
                    full_name: format!("{suite_name} {case_name}"),
                    location,
                    parent_id: Some(suite.id.clone()),
                }));
            }
        }

        (!root.is_empty()).then_some(root)
    }

    async fn run(
        &self,
        project_root: &Path,
        test_ids: &[TestId],
        cancel: &CancelSignal,
    ) -> TestRunResult {
        self.calls.lock().push(test_ids.to_vec());

        if self.block_until_cancel {
            cancel.cancelled().await;
            return TestRunResult::empty();
        }

        let mut results = Vec::new();
        for id in test_ids {
            let name = id.name().unwrap_or_default().to_lowercase();
            let status = self.statuses.get(&name).copied().unwrap_or(TestStatus::Passed);
            let reported = if self.shout_ids {
                TestId::from(id.as_str().to_uppercase())
            } else {
                id.clone()
            };
            let mut result = TestExecutionResult::new(reported, status, 2);
            if status == TestStatus::Failed {
                result = result.with_error("expected true", None);
            }
            results.push(result);
        }
        if self.report_ghost {
            results.push(TestExecutionResult::new(
                TestId::from("ghost%2Ffile::Nobody::home"),
                TestStatus::Passed,
                1,
            ));
        }
        for (file, suite, case) in &self.also_report {
            let id = TestId::for_file(&project_root.join(file)).child(suite).child(case);
            results.push(TestExecutionResult::new(id, TestStatus::Passed, 1));
        }
        TestRunResult::from_results(results, 5)
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub session: Arc<TestSession>,
    pub discovery: DiscoveryOrchestrator,
    pub execution: ExecutionOrchestrator,
    pub adapter: Arc<FakeAdapter>,
}

impl Harness {
    /// A project with `files` (name, content) and the fake marker.
    pub fn new(files: &[(&str, &str)], adapter: FakeAdapter, clear_passed_after_ms: u64) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(MARKER), "").unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let mut config = Config::default();
        config.execution.clear_passed_after_ms = clear_passed_after_ms;

        let adapter = Arc::new(adapter);
        let mut registry = AdapterRegistry::new();
        registry.register(adapter.clone());
        let registry = Arc::new(registry);

        let session = Arc::new(TestSession::new(vec![dir.path().to_path_buf()], config));
        let discovery = DiscoveryOrchestrator::new(session.clone(), registry.clone());
        let execution = ExecutionOrchestrator::new(session.clone(), registry);

        Self {
            dir,
            session,
            discovery,
            execution,
            adapter,
        }
    }

    /// Canonical project root.
    pub fn root(&self) -> PathBuf {
        self.session.roots()[0].clone()
    }

    pub fn file_id(&self, name: &str) -> TestId {
        TestId::for_file(&self.root().join(name))
    }

    pub fn case_id(&self, file: &str, suite: &str, case: &str) -> TestId {
        self.file_id(file).child(suite).child(case)
    }

    pub fn status(&self, id: &TestId) -> Option<TestStatus> {
        self.session.status(id).map(|s| s.status)
    }
}
