//! Orchestration state shared by discovery and execution.
//!
//! A [`TestSession`] is created when the host activates and disposed when it
//! tears down. Both orchestrators receive it explicitly.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::Config;
use crate::id::TestId;
use crate::model::TestStatus;
use crate::tree::TestTree;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Disposed,
}

/// Transient run status attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub status: TestStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Run that produced this status.
    #[serde(skip)]
    pub generation: u64,
}

pub struct TestSession {
    roots: Vec<PathBuf>,
    config: Config,
    state: RwLock<SessionState>,
    tree: RwLock<Arc<TestTree>>,
    /// Keyed by [`TestId::key`].
    statuses: Mutex<HashMap<String, (TestId, NodeStatus)>>,
    pending_clear: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
}

impl TestSession {
    /// Creates an active session over `roots`.
    ///
    /// Roots are canonicalized when possible so that paths reported by test
    /// tools line up with discovered ones.
    pub fn new(roots: Vec<PathBuf>, config: Config) -> Self {
        let roots = roots
            .into_iter()
            .map(|root| std::fs::canonicalize(&root).unwrap_or(root))
            .collect();
        Self {
            roots,
            config,
            state: RwLock::new(SessionState::Active),
            tree: RwLock::new(Arc::new(TestTree::new())),
            statuses: Mutex::new(HashMap::new()),
            pending_clear: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Marks the session disposed and aborts any pending timer.
    pub fn dispose(&self) {
        *self.state.write() = SessionState::Disposed;
        self.cancel_pending_clear();
        debug!("session disposed");
    }

    /// The current tree snapshot.
    pub fn tree(&self) -> Arc<TestTree> {
        self.tree.read().clone()
    }

    pub(crate) fn replace_tree(&self, tree: TestTree) {
        *self.tree.write() = Arc::new(tree);
    }

    pub(crate) fn clear_tree(&self) {
        self.replace_tree(TestTree::new());
    }

    /// Status of the node named by `id` (case-insensitive).
    pub fn status(&self, id: &TestId) -> Option<NodeStatus> {
        self.statuses.lock().get(&id.key()).map(|(_, s)| s.clone())
    }

    /// All current statuses, sorted by identifier.
    pub fn statuses(&self) -> Vec<(TestId, NodeStatus)> {
        let mut all: Vec<(TestId, NodeStatus)> = self.statuses.lock().values().cloned().collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub(crate) fn set_status(&self, id: &TestId, status: NodeStatus) {
        self.statuses.lock().insert(id.key(), (id.clone(), status));
    }

    pub(crate) fn reset_statuses<'a>(&self, ids: impl IntoIterator<Item = &'a TestId>) {
        let mut statuses = self.statuses.lock();
        for id in ids {
            statuses.remove(&id.key());
        }
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Removes Passed marks written by run `generation`. Returns how many.
    pub fn clear_passed(&self, generation: u64) -> usize {
        let mut statuses = self.statuses.lock();
        let before = statuses.len();
        statuses.retain(|_, (_, s)| !(s.status == TestStatus::Passed && s.generation == generation));
        before - statuses.len()
    }

    /// Clears run `generation`'s Passed marks after `delay`, replacing any
    /// clear still pending.
    pub(crate) fn schedule_passed_clear(self: &Arc<Self>, delay: Duration, generation: u64) {
        let session: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(session) = session.upgrade() {
                let cleared = session.clear_passed(generation);
                debug!(generation, cleared, "cleared passed marks");
            }
        });

        if let Some(previous) = self.pending_clear.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Aborts a pending passed-mark clear. Returns whether one was pending.
    pub fn cancel_pending_clear(&self) -> bool {
        match self.pending_clear.lock().take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                debug!("pending passed clear cancelled");
                true
            }
            _ => false,
        }
    }

    pub fn has_pending_clear(&self) -> bool {
        self.pending_clear
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TestSession {
    fn drop(&mut self) {
        if let Some(handle) = self.pending_clear.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: TestStatus, generation: u64) -> NodeStatus {
        NodeStatus {
            status,
            duration_ms: 1,
            message: None,
            generation,
        }
    }

    #[test]
    fn test_statuses_are_case_insensitive() {
        let session = TestSession::new(Vec::new(), Config::default());
        session.set_status(&TestId::from("f::A::b"), status(TestStatus::Failed, 1));

        let found = session.status(&TestId::from("F::a::B")).unwrap();
        assert_eq!(found.status, TestStatus::Failed);
        assert_eq!(session.statuses()[0].0.as_str(), "f::A::b");
    }

    #[test]
    fn test_clear_passed_only_touches_its_generation() {
        let session = TestSession::new(Vec::new(), Config::default());
        session.set_status(&TestId::from("f::a"), status(TestStatus::Passed, 1));
        session.set_status(&TestId::from("f::b"), status(TestStatus::Failed, 1));
        session.set_status(&TestId::from("f::c"), status(TestStatus::Passed, 2));

        assert_eq!(session.clear_passed(1), 1);
        assert!(session.status(&TestId::from("f::a")).is_none());
        assert!(session.status(&TestId::from("f::b")).is_some());
        assert!(session.status(&TestId::from("f::c")).is_some());
    }

    #[tokio::test]
    async fn test_dispose_aborts_pending_clear() {
        let session = Arc::new(TestSession::new(Vec::new(), Config::default()));
        session.set_status(&TestId::from("f::a"), status(TestStatus::Passed, 1));
        session.schedule_passed_clear(Duration::from_millis(50), 1);
        assert!(session.has_pending_clear());

        session.dispose();
        assert!(!session.is_active());
        assert!(!session.has_pending_clear());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(session.status(&TestId::from("f::a")).is_some());
    }

    #[test]
    fn test_generations_increase() {
        let session = TestSession::new(Vec::new(), Config::default());
        assert_eq!(session.next_generation(), 1);
        assert_eq!(session.next_generation(), 2);
    }
}
