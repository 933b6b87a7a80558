pub mod adapter;
pub mod cancel;
pub mod config;
pub mod discovery;
pub mod execution;
pub mod id;
pub mod model;
pub mod session;
pub mod tree;

pub use adapter::{AdapterError, AdapterRegistry, JestAdapter, PhpUnitAdapter, TestAdapter};
pub use cancel::CancelSignal;
pub use config::{Config, ConfigError};
pub use discovery::{DiscoveryError, DiscoveryOrchestrator, DiscoveryPhase, DiscoverySummary};
pub use execution::{ExecutionError, ExecutionOrchestrator, RunPhase, RunReport, RunRequest, RunStats};
pub use id::TestId;
pub use model::{
    DiscoveryOutput, TestCase, TestExecutionResult, TestItem, TestLocation, TestRunResult,
    TestStatus, TestSuite,
};
pub use session::{NodeStatus, SessionState, TestSession};
pub use tree::{NodeKind, NodeOwner, TestTree, TreeNode};
