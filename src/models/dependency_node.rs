use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::ecosystem::Ecosystem;

/// A node in the resolved dependency tree.
///
/// Owned exclusively by its parent; the root is owned by the graph document. Cycles in the
/// conceptual dependency graph are never materialized as a true cyclic reference: the second
/// time a `name@version` is encountered along a descent it is represented as a node with
/// `circular_reference = true` and no children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub name: String,
    pub version: String,
    pub ecosystem: Ecosystem,
    pub depth: u32,
    #[serde(rename = "dependencies")]
    pub children: HashMap<String, DependencyNode>,
    #[serde(default)]
    pub circular_reference: bool,
}

impl DependencyNode {
    pub fn new(name: impl Into<String>, version: impl Into<String>, ecosystem: Ecosystem, depth: u32) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ecosystem,
            depth,
            children: HashMap::new(),
            circular_reference: false,
        }
    }

    /// A cycle-terminating stand-in node: same identity, no children, tagged.
    pub fn circular(name: impl Into<String>, version: impl Into<String>, ecosystem: Ecosystem, depth: u32) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ecosystem,
            depth,
            children: HashMap::new(),
            circular_reference: true,
        }
    }

    pub fn identifier(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    pub fn add_child(&mut self, child: DependencyNode) {
        self.children.insert(child.name.clone(), child);
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Counts every distinct node reachable from this one, including itself, deduplicated by
    /// `name@version` — used for the O(parents) diamond-graph property.
    pub fn count_distinct(&self) -> usize {
        let mut seen = std::collections::HashSet::new();
        self.collect_distinct(&mut seen);
        seen.len()
    }

    fn collect_distinct(&self, seen: &mut std::collections::HashSet<String>) {
        if self.circular_reference {
            return;
        }
        if !seen.insert(self.identifier()) {
            return;
        }
        for child in self.children.values() {
            child.collect_distinct(seen);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_child_and_leaf() {
        let mut root = DependencyNode::new("a", "1.0.0", Ecosystem::Npm, 0);
        assert!(root.is_leaf());

        root.add_child(DependencyNode::new("b", "2.0.0", Ecosystem::Npm, 1));
        assert!(!root.is_leaf());
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn test_circular_node_has_no_children() {
        let node = DependencyNode::circular("a", "1.0.0", Ecosystem::Npm, 3);
        assert!(node.circular_reference);
        assert!(node.is_leaf());
    }

    #[test]
    fn test_count_distinct_diamond() {
        let mut root = DependencyNode::new("root", "1.0.0", Ecosystem::Npm, 0);
        let mut left = DependencyNode::new("left", "1.0.0", Ecosystem::Npm, 1);
        let mut right = DependencyNode::new("right", "1.0.0", Ecosystem::Npm, 1);
        left.add_child(DependencyNode::new("shared", "1.0.0", Ecosystem::Npm, 2));
        right.add_child(DependencyNode::new("shared", "1.0.0", Ecosystem::Npm, 2));
        root.add_child(left);
        root.add_child(right);

        assert_eq!(root.count_distinct(), 4);
    }
}
