//! Registry of framework adapters.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::jest::JestAdapter;
use super::phpunit::PhpUnitAdapter;
use super::traits::TestAdapter;
use crate::config::Config;

/// Registry of framework adapters, kept in registration order.
///
/// Detection is first-match-wins in that order.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn TestAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in adapters.
    pub fn with_builtin(config: &Config) -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(JestAdapter::new(
            config.jest.clone(),
            config.discovery.exclude_dirs.clone(),
        )));
        registry.register(Arc::new(PhpUnitAdapter::new(
            config.phpunit.clone(),
            config.discovery.exclude_dirs.clone(),
            config.execution.report_prefix.clone(),
        )));

        registry
    }

    /// Register an adapter.
    ///
    /// An adapter for an already registered framework replaces the old one
    /// in place, keeping its detection priority.
    pub fn register(&mut self, adapter: Arc<dyn TestAdapter>) {
        match self
            .adapters
            .iter_mut()
            .find(|a| a.framework() == adapter.framework())
        {
            Some(slot) => *slot = adapter,
            None => self.adapters.push(adapter),
        }
    }

    /// First adapter whose `detect` accepts `project_root`.
    pub fn detect(&self, project_root: &Path) -> Option<Arc<dyn TestAdapter>> {
        let found = self
            .adapters
            .iter()
            .find(|adapter| adapter.detect(project_root))
            .cloned();
        debug!(
            root = %project_root.display(),
            framework = found.as_ref().map(|a| a.framework()).unwrap_or("none"),
            "framework detection"
        );
        found
    }

    /// All adapters in registration order.
    pub fn get_all(&self) -> Vec<Arc<dyn TestAdapter>> {
        self.adapters.clone()
    }

    /// The adapter registered for `framework`.
    pub fn get_by_framework(&self, framework: &str) -> Option<Arc<dyn TestAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.framework() == framework)
            .cloned()
    }

    /// Registered framework identities, in order.
    pub fn frameworks(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.framework()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelSignal;
    use crate::id::TestId;
    use crate::model::{TestRunResult, TestSuite};
    use async_trait::async_trait;

    struct StubAdapter {
        framework: &'static str,
        display: &'static str,
        accepts: bool,
    }

    #[async_trait]
    impl TestAdapter for StubAdapter {
        fn framework(&self) -> &'static str {
            self.framework
        }
        fn display_name(&self) -> &'static str {
            self.display
        }
        fn detect(&self, _project_root: &Path) -> bool {
            self.accepts
        }
        fn test_patterns(&self) -> Vec<String> {
            Vec::new()
        }
        fn excluded_dirs(&self) -> Vec<String> {
            Vec::new()
        }
        fn parse_one(&self, _file: &Path, _content: &str) -> Option<TestSuite> {
            None
        }
        async fn run(&self, _root: &Path, _ids: &[TestId], _cancel: &CancelSignal) -> TestRunResult {
            TestRunResult::empty()
        }
    }

    fn stub(framework: &'static str, display: &'static str, accepts: bool) -> Arc<dyn TestAdapter> {
        Arc::new(StubAdapter {
            framework,
            display,
            accepts,
        })
    }

    #[test]
    fn test_builtin_order() {
        let registry = AdapterRegistry::with_builtin(&Config::default());
        assert_eq!(registry.frameworks(), vec!["jest", "phpunit"]);
        assert!(registry.get_by_framework("phpunit").is_some());
        assert!(registry.get_by_framework("mocha").is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let mut registry = AdapterRegistry::new();
        registry.register(stub("a", "A", false));
        registry.register(stub("b", "B", true));
        registry.register(stub("c", "C", true));

        let found = registry.detect(Path::new("/tmp")).unwrap();
        assert_eq!(found.framework(), "b");
    }

    #[test]
    fn test_reregister_replaces_in_place() {
        let mut registry = AdapterRegistry::new();
        registry.register(stub("a", "first", true));
        registry.register(stub("b", "B", true));
        registry.register(stub("a", "second", true));

        assert_eq!(registry.get_all().len(), 2);
        assert_eq!(registry.frameworks(), vec!["a", "b"]);
        assert_eq!(registry.get_by_framework("a").unwrap().display_name(), "second");
    }

    #[test]
    fn test_no_match() {
        let mut registry = AdapterRegistry::new();
        registry.register(stub("a", "A", false));
        assert!(registry.detect(Path::new("/tmp")).is_none());
    }
}
