mod common;

use std::fs;
use std::sync::Arc;

use common::{FakeAdapter, Harness};
use tempfile::TempDir;
use testloom_core::{
    AdapterRegistry, Config, DiscoveryError, DiscoveryOrchestrator, DiscoveryPhase, NodeKind,
    TestId, TestSession,
};

fn builtin(roots: Vec<std::path::PathBuf>) -> (Arc<TestSession>, DiscoveryOrchestrator) {
    let config = Config::default();
    let registry = Arc::new(AdapterRegistry::with_builtin(&config));
    let session = Arc::new(TestSession::new(roots, config));
    let discovery = DiscoveryOrchestrator::new(session.clone(), registry);
    (session, discovery)
}

const MATH_TEST: &str = r#"
describe('Math', () => {
  it('adds', () => {
    expect(1 + 1).toBe(2);
  });

  it('subtracts', () => {
    expect(2 - 1).toBe(1);
  });
});
"#;

#[tokio::test]
async fn test_jest_discovery_skips_unparseable_files() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(root.join("package.json"), r#"{"devDependencies":{"jest":"^29.0.0"}}"#).unwrap();
    fs::write(root.join("math.test.js"), MATH_TEST).unwrap();
    fs::write(root.join("broken.test.js"), "describe(() => {{{ it( ;; ").unwrap();

    let (session, discovery) = builtin(vec![root.to_path_buf()]);
    let summary = discovery.discover_all().await.unwrap();

    assert_eq!(summary.roots.len(), 1);
    assert_eq!(summary.roots[0].framework.as_deref(), Some("jest"));
    assert_eq!(summary.test_count, 2);
    assert_eq!(summary.roots[0].files, 1);

    let file = session.roots()[0].join("math.test.js");
    let suite = TestId::for_file(&file).child("Math");
    let tree = session.tree();
    assert_eq!(tree.roots().len(), 1);
    let node = tree.resolve(&suite).unwrap();
    assert_eq!(node.kind, NodeKind::Suite);
    let names: Vec<&str> = node.children.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(names, vec!["adds", "subtracts"]);
    assert_eq!(discovery.phase(), DiscoveryPhase::Idle);
}

#[tokio::test]
async fn test_dependency_directories_are_not_scanned() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(root.join("package.json"), r#"{"jest":{}}"#).unwrap();
    fs::write(root.join("math.test.js"), MATH_TEST).unwrap();
    let vendored = root.join("node_modules/lib");
    fs::create_dir_all(&vendored).unwrap();
    fs::write(vendored.join("lib.test.js"), MATH_TEST).unwrap();

    let (session, discovery) = builtin(vec![root.to_path_buf()]);
    let summary = discovery.discover_all().await.unwrap();

    assert_eq!(summary.test_count, 2);
    assert_eq!(session.tree().roots().len(), 1);
}

#[tokio::test]
async fn test_phpunit_root_detected_from_composer() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(
        root.join("composer.json"),
        r#"{"require-dev":{"phpunit/phpunit":"^10.0"}}"#,
    )
    .unwrap();
    fs::create_dir_all(root.join("tests")).unwrap();
    fs::write(
        root.join("tests/CalculatorTest.php"),
        r#"<?php
namespace App\Tests;

use PHPUnit\Framework\TestCase;

class CalculatorTest extends TestCase
{
    public function testAdds(): void
    {
        $this->assertSame(2, 1 + 1);
    }

    /** @test */
    public function subtracts(): void
    {
        $this->assertSame(0, 1 - 1);
    }

    private function helper(): int
    {
        return 1;
    }
}
"#,
    )
    .unwrap();

    let (session, discovery) = builtin(vec![root.to_path_buf()]);
    let summary = discovery.discover_all().await.unwrap();

    assert_eq!(summary.roots[0].framework.as_deref(), Some("phpunit"));
    assert_eq!(summary.test_count, 2);

    let tree = session.tree();
    let cases: Vec<&str> = tree.leaves().iter().map(|n| n.label.as_str()).collect();
    assert_eq!(cases, vec!["testAdds", "subtracts"]);
    assert_eq!(
        tree.owner(&tree.leaves()[0].id).map(|o| o.framework.as_str()),
        Some("phpunit")
    );
}

#[tokio::test]
async fn test_no_roots_is_an_error() {
    let (_session, discovery) = builtin(Vec::new());
    assert!(matches!(
        discovery.discover_all().await,
        Err(DiscoveryError::NoProjectRoot)
    ));
}

#[tokio::test]
async fn test_undetected_root_contributes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("README.md"), "nothing to test").unwrap();

    let (session, discovery) = builtin(vec![temp_dir.path().to_path_buf()]);
    let summary = discovery.discover_all().await.unwrap();

    assert_eq!(summary.roots.len(), 1);
    assert_eq!(summary.roots[0].framework, None);
    assert_eq!(summary.test_count, 0);
    assert!(session.tree().is_empty());
}

#[tokio::test]
async fn test_rediscovery_replaces_tree() {
    let harness = Harness::new(&[("a.fake", "Calc::adds\n")], FakeAdapter::default(), 5_000);
    harness.discovery.discover_all().await.unwrap();
    let before = harness.session.tree();
    assert_eq!(before.test_count(), 1);

    fs::write(harness.root().join("a.fake"), "Calc::adds\nCalc::divides\n").unwrap();
    fs::write(harness.root().join("b.fake"), "Other::works\n").unwrap();
    let summary = harness.discovery.discover_all().await.unwrap();

    assert_eq!(summary.test_count, 3);
    assert_eq!(harness.session.tree().test_count(), 3);
    assert_eq!(harness.session.tree().roots().len(), 2);
    // A snapshot held across a pass is untouched.
    assert_eq!(before.test_count(), 1);
}

#[tokio::test]
async fn test_discover_children_of_reports_owner() {
    let harness = Harness::new(&[("a.fake", "Calc::adds\n")], FakeAdapter::default(), 5_000);
    harness.discovery.discover_all().await.unwrap();

    let suite = harness.file_id("a.fake").child("Calc");
    assert_eq!(
        harness.discovery.discover_children_of(&suite).unwrap().as_deref(),
        Some("fake")
    );
    let missing = harness.file_id("missing.fake");
    assert_eq!(harness.discovery.discover_children_of(&missing).unwrap(), None);
}

#[tokio::test]
async fn test_disposed_session_rejects_discovery() {
    let harness = Harness::new(&[("a.fake", "Calc::adds\n")], FakeAdapter::default(), 5_000);
    harness.session.dispose();

    assert!(matches!(
        harness.discovery.discover_all().await,
        Err(DiscoveryError::Disposed)
    ));
    assert!(matches!(
        harness.discovery.discover_children_of(&harness.file_id("a.fake")),
        Err(DiscoveryError::Disposed)
    ));
}
