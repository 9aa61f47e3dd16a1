//! Dependency Graph Analyzer: builds the `DependencyNode` tree from the Resolver's flat map
//! and characterizes it — cycles, version conflicts, vulnerability impact paths, visualization.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::models::dependency_node::DependencyNode;
use crate::models::ecosystem::Ecosystem;
use crate::models::graph_doc::{CircularDependency, GraphDoc, GraphMetadata, VersionConflict};
use crate::services::analyzer::EcosystemAnalyzer;
use crate::services::resolver::ResolvedEntry;
use crate::utils::error::AuditError;

pub struct GraphAnalyzer;

impl GraphAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Extracts direct dependencies from `manifest_path`, then consumes the Resolver's
    /// already-deduplicated flat map to build the tree. `ManifestNotFound`/`ManifestMalformed`
    /// propagate as real errors, never an empty graph.
    pub fn build_graph(
        &self,
        analyzer: &dyn EcosystemAnalyzer,
        manifest_path: &Path,
        root_name: &str,
        root_version: &str,
        resolved: &HashMap<String, ResolvedEntry>,
    ) -> Result<GraphDoc, AuditError> {
        if !manifest_path.exists() {
            return Err(AuditError::ManifestNotFound(manifest_path.display().to_string()));
        }

        let root_key = format!("{root_name}@{root_version}");
        let root_entry = resolved.get(&root_key);

        let mut root = DependencyNode::new(root_name, root_version, analyzer.ecosystem(), 0);
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(root_key.clone());

        if let Some(entry) = root_entry {
            for (dep_name, dep_spec) in &entry.metadata.dependencies {
                attach_children(&mut root, dep_name, dep_spec, resolved, &mut visited, analyzer.ecosystem());
            }
        }

        let circular_dependencies = self.detect_circular_dependencies(&root);
        let version_conflicts = self.detect_version_conflicts(&root);
        let total_packages = root.count_distinct();

        Ok(GraphDoc {
            metadata: GraphMetadata {
                ecosystem: analyzer.ecosystem(),
                manifest_path: manifest_path.display().to_string(),
                total_packages,
                circular_dependencies_count: circular_dependencies.len(),
                version_conflicts_count: version_conflicts.len(),
            },
            root,
            circular_dependencies,
            version_conflicts,
        })
    }

    /// Every root-to-node path whose terminal node's name is `pkg_name`.
    pub fn trace_vulnerability_impact(&self, root: &DependencyNode, pkg_name: &str) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        let mut stack = vec![root.identifier()];
        trace_dfs(root, pkg_name, &mut stack, &mut paths);
        paths
    }

    /// DFS with a recursion stack; a descendant name matching a stack entry is a cycle.
    /// Cycles whose node sets are equal are deduplicated.
    pub fn detect_circular_dependencies(&self, root: &DependencyNode) -> Vec<CircularDependency> {
        let mut found: Vec<CircularDependency> = Vec::new();
        let mut stack: Vec<String> = Vec::new();
        let mut seen_sets: HashSet<Vec<String>> = HashSet::new();
        detect_cycles_dfs(root, &mut stack, &mut found, &mut seen_sets);
        found
    }

    /// Per name, the set of distinct resolved versions and the path under which each occurred.
    pub fn detect_version_conflicts(&self, root: &DependencyNode) -> Vec<VersionConflict> {
        let mut occurrences: HashMap<String, HashMap<String, Vec<String>>> = HashMap::new();
        let mut stack = vec![root.identifier()];
        collect_versions(root, &mut stack, &mut occurrences);

        let mut conflicts: Vec<VersionConflict> = occurrences
            .into_iter()
            .filter(|(_, versions)| versions.len() >= 2)
            .map(|(name, versions)| {
                let mut conflicting_versions: Vec<String> = versions.keys().cloned().collect();
                conflicting_versions.sort();
                let dependency_paths: Vec<Vec<String>> = versions.into_values().collect();
                VersionConflict {
                    package: name.clone(),
                    conflicting_versions,
                    dependency_paths,
                    severity: "medium".to_string(),
                    description: format!("{name} resolves to multiple versions across the dependency tree"),
                }
            })
            .collect();
        conflicts.sort_by(|a, b| a.package.cmp(&b.package));
        conflicts
    }

    /// Textual directed-graph description; informational, tests assert substrings only.
    pub fn visualize_graph(&self, doc: &GraphDoc, max_depth: u32) -> String {
        let mut out = String::new();
        out.push_str("digraph dependencies {\n");
        render_edges(&doc.root, max_depth, &mut out);
        out.push_str("  // cycles:\n");
        for cycle in doc.circular_dependencies.iter().take(3) {
            out.push_str(&format!("  // {}\n", cycle.cycle.join(" -> ")));
        }
        out.push_str("  // conflicts:\n");
        for conflict in doc.version_conflicts.iter().take(3) {
            out.push_str(&format!("  // {}: {}\n", conflict.package, conflict.conflicting_versions.join(", ")));
        }
        out.push_str("}\n");
        out
    }
}

impl Default for GraphAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::too_many_arguments)]
fn attach_children(
    parent: &mut DependencyNode,
    name: &str,
    spec: &str,
    resolved: &HashMap<String, ResolvedEntry>,
    visited: &mut HashSet<String>,
    ecosystem: Ecosystem,
) {
    let version = crate::services::resolver::resolve_version(spec);
    let key = format!("{name}@{version}");

    if visited.contains(&key) {
        parent.add_child(DependencyNode::circular(name, version, ecosystem, parent.depth + 1));
        return;
    }

    let Some(entry) = resolved.get(&key) else {
        return;
    };

    visited.insert(key);
    let mut node = DependencyNode::new(name, version, ecosystem, parent.depth + 1);
    for (dep_name, dep_spec) in &entry.metadata.dependencies {
        attach_children(&mut node, dep_name, dep_spec, resolved, visited, ecosystem);
    }
    parent.add_child(node);
}

fn trace_dfs(node: &DependencyNode, pkg_name: &str, stack: &mut Vec<String>, paths: &mut Vec<Vec<String>>) {
    if node.name == pkg_name {
        paths.push(stack.clone());
    }
    for child in node.children.values() {
        stack.push(child.identifier());
        trace_dfs(child, pkg_name, stack, paths);
        stack.pop();
    }
}

fn detect_cycles_dfs(
    node: &DependencyNode,
    stack: &mut Vec<String>,
    found: &mut Vec<CircularDependency>,
    seen_sets: &mut HashSet<Vec<String>>,
) {
    stack.push(node.name.clone());

    for child in node.children.values() {
        if let Some(pos) = stack.iter().position(|n| n == &child.name) {
            let mut cycle: Vec<String> = stack[pos..].to_vec();
            cycle.push(child.name.clone());
            let mut set = cycle.clone();
            set.sort();
            set.dedup();
            if seen_sets.insert(set) {
                found.push(CircularDependency {
                    description: format!("circular dependency: {}", cycle.join(" -> ")),
                    cycle,
                    severity: "medium".to_string(),
                });
            }
        } else {
            detect_cycles_dfs(child, stack, found, seen_sets);
        }
    }

    stack.pop();
}

fn collect_versions(node: &DependencyNode, stack: &mut Vec<String>, occurrences: &mut HashMap<String, HashMap<String, Vec<String>>>) {
    if !node.circular_reference {
        occurrences
            .entry(node.name.clone())
            .or_default()
            .entry(node.version.clone())
            .or_insert_with(|| stack.clone());
    }

    for child in node.children.values() {
        stack.push(child.identifier());
        collect_versions(child, stack, occurrences);
        stack.pop();
    }
}

fn render_edges(node: &DependencyNode, max_depth: u32, out: &mut String) {
    if node.depth > max_depth {
        return;
    }
    for child in node.children.values() {
        out.push_str(&format!("  \"{}\" -> \"{}\";\n", node.identifier(), child.identifier()));
        if !child.circular_reference {
            render_edges(child, max_depth, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, version: &str, depth: u32) -> DependencyNode {
        DependencyNode::new(name, version, Ecosystem::Npm, depth)
    }

    #[test]
    fn test_detect_circular_dependencies_triangle() {
        // A -> B -> C -> A(circular)
        let mut a = node("a", "1.0.0", 0);
        let mut b = node("b", "1.0.0", 1);
        let c_full = node("c", "1.0.0", 2);
        let mut c = c_full;
        c.add_child(DependencyNode::circular("a", "1.0.0", Ecosystem::Npm, 3));
        b.add_child(c);
        a.add_child(b);

        let analyzer = GraphAnalyzer::new();
        let cycles = analyzer.detect_circular_dependencies(&a);
        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].cycle.contains(&"a".to_string()));
        assert!(cycles[0].cycle.contains(&"b".to_string()));
        assert!(cycles[0].cycle.contains(&"c".to_string()));
    }

    #[test]
    fn test_detect_version_conflicts() {
        let mut root = node("root", "1.0.0", 0);
        let mut express = node("express", "4.0.0", 1);
        express.add_child(node("lodash", "4.17.20", 2));
        let mut webpack = node("webpack", "5.0.0", 1);
        webpack.add_child(node("lodash", "4.17.21", 2));
        root.add_child(express);
        root.add_child(webpack);

        let analyzer = GraphAnalyzer::new();
        let conflicts = analyzer.detect_version_conflicts(&root);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].package, "lodash");
        assert_eq!(conflicts[0].conflicting_versions.len(), 2);
        assert_eq!(conflicts[0].dependency_paths.len(), 2);
    }

    #[test]
    fn test_trace_vulnerability_impact_multiple_paths() {
        let mut root = node("root", "1.0.0", 0);
        let mut a = node("a", "1.0.0", 1);
        a.add_child(node("shared", "1.0.0", 2));
        let mut b = node("b", "1.0.0", 1);
        b.add_child(node("shared", "1.0.0", 2));
        root.add_child(a);
        root.add_child(b);

        let analyzer = GraphAnalyzer::new();
        let paths = analyzer.trace_vulnerability_impact(&root, "shared");
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn test_visualize_graph_contains_key_substrings() {
        let mut root = node("root", "1.0.0", 0);
        root.add_child(node("left-pad", "1.3.0", 1));

        let doc = GraphDoc {
            metadata: GraphMetadata {
                ecosystem: Ecosystem::Npm,
                manifest_path: "package.json".to_string(),
                total_packages: 2,
                circular_dependencies_count: 0,
                version_conflicts_count: 0,
            },
            root,
            circular_dependencies: vec![],
            version_conflicts: vec![],
        };

        let analyzer = GraphAnalyzer::new();
        let text = analyzer.visualize_graph(&doc, 3);
        assert!(text.contains("digraph"));
        assert!(text.contains("left-pad@1.3.0"));
    }
}
