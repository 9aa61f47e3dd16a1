use serde::{Deserialize, Serialize};

use crate::models::dependency_node::DependencyNode;
use crate::models::ecosystem::Ecosystem;

/// A cycle fragment found in the dependency tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircularDependency {
    pub cycle: Vec<String>,
    pub severity: String,
    pub description: String,
}

/// A package name resolving to more than one version across the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionConflict {
    pub package: String,
    pub conflicting_versions: Vec<String>,
    pub dependency_paths: Vec<Vec<String>>,
    pub severity: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub ecosystem: Ecosystem,
    pub manifest_path: String,
    pub total_packages: usize,
    pub circular_dependencies_count: usize,
    pub version_conflicts_count: usize,
}

/// The Graph Analyzer's emitted document: root metadata, the tree, and summary counts.
///
/// `root` is flattened so the emitted JSON's top-level keys are the root node's own
/// `name`/`version`/`ecosystem`/`depth`/`dependencies` fields alongside `metadata`,
/// `circular_dependencies`, and `version_conflicts`, per the documented wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDoc {
    #[serde(flatten)]
    pub root: DependencyNode,
    pub metadata: GraphMetadata,
    pub circular_dependencies: Vec<CircularDependency>,
    pub version_conflicts: Vec<VersionConflict>,
}
