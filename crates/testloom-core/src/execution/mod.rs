//! Execution orchestration: a subset of the tree in, node statuses out.
//!
//! A run goes `Collecting → Dispatching → Reconciling` against the tree
//! snapshot taken when it starts. Passed marks are cleared after a delay
//! unless another run starts first.

mod error;
mod report;

pub use error::ExecutionError;
pub use report::{FileStats, RunReport, RunStats};

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::adapter::{AdapterRegistry, TestAdapter};
use crate::cancel::CancelSignal;
use crate::id::TestId;
use crate::model::{TestExecutionResult, TestStatus};
use crate::session::{NodeStatus, TestSession};
use crate::tree::{TestTree, TreeNode};

/// Which tests a run covers.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Nodes to run (suites expand to their cases); `None` runs everything.
    pub include: Option<Vec<TestId>>,
    /// Nodes removed from the selection, with everything below them.
    pub exclude: Vec<TestId>,
}

impl RunRequest {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(ids: impl IntoIterator<Item = TestId>) -> Self {
        Self {
            include: Some(ids.into_iter().collect()),
            exclude: Vec::new(),
        }
    }

    pub fn excluding(mut self, ids: impl IntoIterator<Item = TestId>) -> Self {
        self.exclude.extend(ids);
        self
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunPhase {
    #[default]
    Idle,
    Collecting,
    /// Waiting on the adapter for one project root.
    Dispatching(PathBuf),
    Reconciling,
}

impl RunPhase {
    pub fn display_name(&self) -> &'static str {
        match self {
            RunPhase::Idle => "Idle",
            RunPhase::Collecting => "Collecting",
            RunPhase::Dispatching(_) => "Dispatching",
            RunPhase::Reconciling => "Reconciling",
        }
    }
}

/// Leaves of one project root, in run order.
struct Batch {
    project_root: PathBuf,
    framework: String,
    ids: Vec<TestId>,
}

/// Runs tests through their adapters and writes statuses into the session.
pub struct ExecutionOrchestrator {
    session: Arc<TestSession>,
    registry: Arc<AdapterRegistry>,
    phase: Mutex<RunPhase>,
}

impl ExecutionOrchestrator {
    pub fn new(session: Arc<TestSession>, registry: Arc<AdapterRegistry>) -> Self {
        Self {
            session,
            registry,
            phase: Mutex::new(RunPhase::Idle),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase.lock().clone()
    }

    fn enter(&self, phase: RunPhase) {
        debug!(phase = phase.display_name(), "run phase");
        *self.phase.lock() = phase;
    }

    /// Runs the tests selected by `request`.
    ///
    /// Cancellation stops dispatching further roots and makes the adapter in
    /// flight return at once; whatever was already reported is still
    /// reconciled.
    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancelSignal,
    ) -> Result<RunReport, ExecutionError> {
        if !self.session.is_active() {
            return Err(ExecutionError::Disposed);
        }
        self.session.cancel_pending_clear();
        let generation = self.session.next_generation();
        let started_at = Utc::now();

        self.enter(RunPhase::Collecting);
        let tree = self.session.tree();
        let leaves = collect_leaves(&tree, request);
        self.session.reset_statuses(leaves.iter().map(|leaf| &leaf.id));
        let batches = group_by_root(&tree, &leaves);
        debug!(tests = leaves.len(), roots = batches.len(), "collected");

        let mut cancelled = false;
        let mut results: Vec<TestExecutionResult> = Vec::new();
        for batch in &batches {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.enter(RunPhase::Dispatching(batch.project_root.clone()));
            let Some(adapter) = self.adapter_for(batch) else {
                warn!(root = %batch.project_root.display(), framework = %batch.framework, "no adapter for root");
                continue;
            };
            let run = adapter.run(&batch.project_root, &batch.ids, cancel).await;
            debug!(
                framework = adapter.framework(),
                passed = run.passed,
                failed = run.failed,
                skipped = run.skipped,
                "adapter finished"
            );
            results.extend(run.results);
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
        }

        self.enter(RunPhase::Reconciling);
        let mut per_file: Vec<FileStats> = Vec::new();
        for leaf in &leaves {
            let token = leaf.id.file_token();
            if !per_file.iter().any(|f| f.file_token.eq_ignore_ascii_case(token)) {
                per_file.push(FileStats::new(token));
            }
        }

        let single_file = per_file.len() <= 1;

        let mut reconciled = Vec::new();
        let mut unmatched = Vec::new();
        for result in results {
            let Some(node) = tree.resolve(&result.test_id) else {
                warn!(test_id = %result.test_id, "result matches no tree node");
                unmatched.push(result.test_id);
                continue;
            };
            // Only files among the requested tests are reported on.
            let Some(index) = per_file
                .iter()
                .position(|f| f.file_token.eq_ignore_ascii_case(node.id.file_token()))
            else {
                debug!(test_id = %node.id, "dropping result for a file outside the run");
                continue;
            };

            self.session.set_status(
                &node.id,
                NodeStatus {
                    status: result.status,
                    duration_ms: result.duration_ms,
                    message: result.error_message.clone(),
                    generation,
                },
            );

            per_file[index].stats.record(result.status, result.duration_ms);

            reconciled.push(TestExecutionResult {
                test_id: node.id.clone(),
                ..result
            });
        }

        let aggregate = (!single_file).then(|| {
            let mut totals = RunStats::default();
            for file in &per_file {
                totals.merge(&file.stats);
            }
            totals
        });

        let passed = reconciled
            .iter()
            .any(|r| r.status == TestStatus::Passed);
        if passed && self.session.is_active() {
            let delay = Duration::from_millis(self.session.config().execution.clear_passed_after_ms);
            self.session.schedule_passed_clear(delay, generation);
        }

        self.enter(RunPhase::Idle);
        let report = RunReport {
            started_at,
            per_file,
            aggregate,
            results: reconciled,
            unmatched,
            cancelled,
        };
        let totals = report.totals();
        info!(
            passed = totals.passed,
            failed = totals.failed,
            skipped = totals.skipped,
            files = report.per_file.len(),
            cancelled,
            "run complete"
        );
        Ok(report)
    }

    fn adapter_for(&self, batch: &Batch) -> Option<Arc<dyn TestAdapter>> {
        self.registry
            .get_by_framework(&batch.framework)
            .or_else(|| self.registry.detect(&batch.project_root))
    }
}

/// Expands the request into distinct cases, in tree order per include.
fn collect_leaves<'t>(tree: &'t TestTree, request: &RunRequest) -> Vec<&'t TreeNode> {
    let candidates: Vec<&TreeNode> = match &request.include {
        None => tree.leaves(),
        Some(ids) => ids
            .iter()
            .flat_map(|id| match tree.resolve(id) {
                Some(node) => node.leaves(),
                None => {
                    warn!(test_id = %id, "requested node not in tree");
                    Vec::new()
                }
            })
            .collect(),
    };

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|leaf| seen.insert(leaf.id.key()))
        .filter(|leaf| !request.exclude.iter().any(|ex| ex.is_prefix_of(&leaf.id)))
        .collect()
}

/// Groups leaves by owning project root, first-seen order.
fn group_by_root(tree: &TestTree, leaves: &[&TreeNode]) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();
    for leaf in leaves {
        let Some(owner) = tree.owner(&leaf.id) else {
            warn!(test_id = %leaf.id, "test has no owning root");
            continue;
        };
        match batches
            .iter_mut()
            .find(|b| b.project_root == owner.project_root && b.framework == owner.framework)
        {
            Some(batch) => batch.ids.push(leaf.id.clone()),
            None => batches.push(Batch {
                project_root: owner.project_root.clone(),
                framework: owner.framework.clone(),
                ids: vec![leaf.id.clone()],
            }),
        }
    }
    batches
}
