//! Discovery orchestration: project roots in, test tree out.
//!
//! Roots are processed one after another. Each goes through
//! `Scanning → Parsing → BuildingTree`; the finished tree replaces the
//! session's tree in one step.

mod error;

pub use error::DiscoveryError;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::adapter::AdapterRegistry;
use crate::id::TestId;
use crate::session::TestSession;
use crate::tree::{NodeOwner, TestTree};

/// Where a discovery pass currently is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DiscoveryPhase {
    #[default]
    Idle,
    /// Looking for the adapter that owns the root.
    Scanning(PathBuf),
    /// The adapter is reading and parsing test sources.
    Parsing(PathBuf),
    /// Parsed suites are being converted into tree nodes.
    BuildingTree(PathBuf),
}

impl DiscoveryPhase {
    pub fn display_name(&self) -> &'static str {
        match self {
            DiscoveryPhase::Idle => "Idle",
            DiscoveryPhase::Scanning(_) => "Scanning",
            DiscoveryPhase::Parsing(_) => "Parsing",
            DiscoveryPhase::BuildingTree(_) => "BuildingTree",
        }
    }
}

/// What one root contributed to a pass.
#[derive(Debug, Clone, Serialize)]
pub struct RootSummary {
    pub root: PathBuf,
    /// `None` when no adapter accepted the root.
    pub framework: Option<String>,
    pub files: usize,
    pub tests: usize,
}

/// Outcome of a full discovery pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoverySummary {
    pub roots: Vec<RootSummary>,
    pub test_count: usize,
}

/// Builds the session's test tree from its project roots.
pub struct DiscoveryOrchestrator {
    session: Arc<TestSession>,
    registry: Arc<AdapterRegistry>,
    phase: Mutex<DiscoveryPhase>,
}

impl DiscoveryOrchestrator {
    pub fn new(session: Arc<TestSession>, registry: Arc<AdapterRegistry>) -> Self {
        Self {
            session,
            registry,
            phase: Mutex::new(DiscoveryPhase::Idle),
        }
    }

    pub fn phase(&self) -> DiscoveryPhase {
        self.phase.lock().clone()
    }

    fn enter(&self, phase: DiscoveryPhase) {
        debug!(phase = phase.display_name(), "discovery phase");
        *self.phase.lock() = phase;
    }

    /// Full rescan of every project root.
    ///
    /// The existing tree is cleared first and replaced once all roots are
    /// done. A root no adapter recognizes contributes nothing.
    pub async fn discover_all(&self) -> Result<DiscoverySummary, DiscoveryError> {
        if !self.session.is_active() {
            return Err(DiscoveryError::Disposed);
        }
        if self.session.roots().is_empty() {
            return Err(DiscoveryError::NoProjectRoot);
        }

        self.session.clear_tree();
        let mut tree = TestTree::new();
        let mut summary = DiscoverySummary::default();

        for root in self.session.roots() {
            let result = self.discover_root(root, &mut tree).await;
            if !self.session.is_active() {
                self.enter(DiscoveryPhase::Idle);
                return Err(DiscoveryError::Disposed);
            }
            summary.test_count += result.tests;
            summary.roots.push(result);
        }

        self.session.replace_tree(tree);
        self.enter(DiscoveryPhase::Idle);
        info!(
            roots = summary.roots.len(),
            tests = summary.test_count,
            "discovery complete"
        );
        Ok(summary)
    }

    async fn discover_root(&self, root: &Path, tree: &mut TestTree) -> RootSummary {
        self.enter(DiscoveryPhase::Scanning(root.to_path_buf()));
        let Some(adapter) = self.registry.detect(root) else {
            info!(root = %root.display(), "no test framework detected");
            return RootSummary {
                root: root.to_path_buf(),
                framework: None,
                files: 0,
                tests: 0,
            };
        };

        self.enter(DiscoveryPhase::Parsing(root.to_path_buf()));
        let output = adapter.discover(root).await;

        self.enter(DiscoveryPhase::BuildingTree(root.to_path_buf()));
        let files = output.suites.len();
        let owner = NodeOwner {
            framework: adapter.framework().to_string(),
            project_root: root.to_path_buf(),
        };
        for suite in output.suites {
            tree.insert_file(suite, owner.clone());
        }

        info!(
            root = %root.display(),
            framework = adapter.framework(),
            files,
            tests = output.test_count,
            "root discovered"
        );
        RootSummary {
            root: root.to_path_buf(),
            framework: Some(adapter.framework().to_string()),
            files,
            tests: output.test_count,
        }
    }

    /// Lazy-expansion hook: children are populated eagerly by
    /// [`discover_all`](Self::discover_all), so this only reports which
    /// framework owns the node.
    pub fn discover_children_of(&self, id: &TestId) -> Result<Option<String>, DiscoveryError> {
        if !self.session.is_active() {
            return Err(DiscoveryError::Disposed);
        }
        Ok(self
            .session
            .tree()
            .owner(id)
            .map(|owner| owner.framework.clone()))
    }
}
