//! The test tree presented to the host.
//!
//! A tree is built once per discovery pass and never mutated afterwards;
//! the session swaps whole trees. Which framework and project root own a
//! node is kept in a side table keyed by identifier, not on the node.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::id::{is_prefix_key, TestId};
use crate::model::{TestItem, TestLocation, TestSuite};

/// What a tree node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// A source file (root suite of one parse).
    File,
    /// A `describe` block or test class.
    Suite,
    /// A single test: the unit of execution.
    Case,
}

/// One node of the host tree.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub id: TestId,
    pub label: String,
    pub kind: NodeKind,
    pub location: TestLocation,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    fn from_suite(suite: TestSuite, kind: NodeKind) -> Self {
        let children = suite
            .children
            .into_iter()
            .map(|child| match child {
                TestItem::Suite(inner) => TreeNode::from_suite(inner, NodeKind::Suite),
                TestItem::Case(case) => TreeNode {
                    id: case.id,
                    label: case.name,
                    kind: NodeKind::Case,
                    location: case.location,
                    children: Vec::new(),
                },
            })
            .collect();

        TreeNode {
            id: suite.id,
            label: suite.name,
            kind,
            location: suite.location,
            children,
        }
    }

    pub fn is_case(&self) -> bool {
        self.kind == NodeKind::Case
    }

    /// Cases at or below this node, in source order.
    pub fn leaves(&self) -> Vec<&TreeNode> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a TreeNode>) {
        if self.is_case() {
            out.push(self);
        }
        for child in &self.children {
            child.collect_leaves(out);
        }
    }

    fn visit<'a>(&'a self, depth: usize, out: &mut Vec<(usize, &'a TreeNode)>) {
        out.push((depth, self));
        for child in &self.children {
            child.visit(depth + 1, out);
        }
    }
}

/// Framework and project root owning a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeOwner {
    pub framework: String,
    pub project_root: PathBuf,
}

/// An immutable snapshot of the whole tree plus its owner table.
#[derive(Debug, Default)]
pub struct TestTree {
    roots: Vec<TreeNode>,
    /// Keyed by [`TestId::key`].
    owners: HashMap<String, NodeOwner>,
}

impl TestTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one file-level suite, recording `owner` for every node in it.
    pub fn insert_file(&mut self, suite: TestSuite, owner: NodeOwner) {
        let node = TreeNode::from_suite(suite, NodeKind::File);
        let mut ids = Vec::new();
        node.visit(0, &mut ids);
        for (_, n) in ids {
            self.owners.insert(n.id.key(), owner.clone());
        }
        self.roots.push(node);
    }

    pub fn roots(&self) -> &[TreeNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Owner of the node named by `id` (case-insensitive).
    pub fn owner(&self, id: &TestId) -> Option<&NodeOwner> {
        self.owners.get(&id.key())
    }

    /// Resolves `id` to a node by descending one level at a time through
    /// children whose identifiers are case-insensitive prefixes of it.
    ///
    /// Sibling names may repeat, so every compatible branch is tried.
    pub fn resolve(&self, id: &TestId) -> Option<&TreeNode> {
        let key = id.key();
        resolve_in(&self.roots, &key)
    }

    /// Every case in the tree, in source order.
    pub fn leaves(&self) -> Vec<&TreeNode> {
        self.roots.iter().flat_map(TreeNode::leaves).collect()
    }

    /// Depth-first listing with depths, for display.
    pub fn flatten(&self) -> Vec<(usize, &TreeNode)> {
        let mut out = Vec::new();
        for root in &self.roots {
            root.visit(0, &mut out);
        }
        out
    }

    pub fn node_count(&self) -> usize {
        self.owners.len()
    }

    pub fn test_count(&self) -> usize {
        self.leaves().len()
    }
}

fn resolve_in<'a>(nodes: &'a [TreeNode], key: &str) -> Option<&'a TreeNode> {
    for node in nodes {
        let node_key = node.id.key();
        if !is_prefix_key(&node_key, key) {
            continue;
        }
        if node_key.len() == key.len() {
            return Some(node);
        }
        if let Some(found) = resolve_in(&node.children, key) {
            return Some(found);
        }
    }
    None
}
