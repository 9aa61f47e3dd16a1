//! Ecosystem Analyzer trait and process-wide registry.
//!
//! Abstracts per-ecosystem knowledge (manifest parsing, install-script analysis,
//! malicious-package lookup) behind a uniform capability set so the Resolver and
//! Orchestrator stay ecosystem-free.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::models::dependency::ManifestDependency;
use crate::models::ecosystem::Ecosystem;
use crate::models::finding::Finding;
use crate::models::malicious::MaliciousEntry;
use crate::utils::error::AuditError;

/// Per-ecosystem capability set. Implementations are registered once at startup.
#[async_trait]
pub trait EcosystemAnalyzer: Send + Sync {
    fn ecosystem_name(&self) -> &'static str;

    /// Recognized manifest filenames for this ecosystem that exist under `dir`.
    fn detect_manifest_files(&self, dir: &Path) -> Vec<PathBuf>;

    /// Parses a single manifest into its direct dependencies. Parse errors never propagate:
    /// they are logged and an empty list is returned.
    fn extract_dependencies(&self, manifest_path: &Path) -> Vec<ManifestDependency>;

    /// Inspects install-time hooks under `dir`, combining pattern and (for Python) LLM layers.
    async fn analyze_install_scripts(&self, dir: &Path) -> Vec<Finding>;

    /// Canonical metadata URL for `name`.
    fn get_registry_url(&self, name: &str) -> String;

    /// Regex bank partitioned by severity; empty by default.
    fn get_malicious_patterns(&self) -> HashMap<&'static str, Vec<&'static str>> {
        HashMap::new()
    }

    fn ecosystem(&self) -> Ecosystem;

    /// Looks up `(name, version)` in the shared known-malicious table for this ecosystem.
    fn is_malicious_package(&self, name: &str, version: &str) -> Option<MaliciousEntry> {
        crate::models::malicious::lookup(self.ecosystem(), name, version)
    }

    /// Downcast hook so the Orchestrator can reach ecosystem-specific configuration (e.g. wiring
    /// an LLM client into the Python analyzer) through the registry's trait-object handle.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Process-wide registry mapping ecosystem name -> analyzer. Registration is expected at
/// startup; double registration of the same name replaces the earlier entry with a warning.
#[derive(Default)]
pub struct AnalyzerRegistry {
    analyzers: RwLock<Vec<(&'static str, std::sync::Arc<dyn EcosystemAnalyzer>)>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, analyzer: std::sync::Arc<dyn EcosystemAnalyzer>) {
        let name = analyzer.ecosystem_name();
        let mut analyzers = self.analyzers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = analyzers.iter_mut().find(|(n, _)| *n == name) {
            tracing::warn!(ecosystem = name, "overwriting previously registered analyzer");
            existing.1 = analyzer;
        } else {
            analyzers.push((name, analyzer));
        }
    }

    pub fn get(&self, name: &str) -> Option<std::sync::Arc<dyn EcosystemAnalyzer>> {
        self.analyzers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, a)| a.clone())
    }

    pub fn all_ecosystems(&self) -> Vec<&'static str> {
        self.analyzers.read().unwrap_or_else(|e| e.into_inner()).iter().map(|(n, _)| *n).collect()
    }

    /// Probes each registered analyzer in registration order, returning the first whose
    /// `detect_manifest_files` finds something.
    pub fn detect_ecosystem(&self, dir: &Path) -> Result<std::sync::Arc<dyn EcosystemAnalyzer>, AuditError> {
        let analyzers = self.analyzers.read().unwrap_or_else(|e| e.into_inner());
        for (_, analyzer) in analyzers.iter() {
            if !analyzer.detect_manifest_files(dir).is_empty() {
                return Ok(analyzer.clone());
            }
        }
        Err(AuditError::UnknownEcosystem(dir.display().to_string()))
    }
}

/// Process-wide singleton registry, initialized once at startup with the built-in npm and
/// PyPI analyzers. One of the two module-level state exceptions this crate permits (the
/// other being the known-malicious table).
static GLOBAL_REGISTRY: OnceLock<AnalyzerRegistry> = OnceLock::new();

pub fn global_registry() -> &'static AnalyzerRegistry {
    GLOBAL_REGISTRY.get_or_init(|| {
        let registry = AnalyzerRegistry::new();
        registry.register(std::sync::Arc::new(crate::services::npm_analyzer::NpmAnalyzer::new()));
        registry.register(std::sync::Arc::new(crate::services::python_analyzer::PythonAnalyzer::new()));
        registry
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubAnalyzer {
        name: &'static str,
        ecosystem: Ecosystem,
    }

    #[async_trait]
    impl EcosystemAnalyzer for StubAnalyzer {
        fn ecosystem_name(&self) -> &'static str {
            self.name
        }

        fn detect_manifest_files(&self, _dir: &Path) -> Vec<PathBuf> {
            vec![]
        }

        fn extract_dependencies(&self, _manifest_path: &Path) -> Vec<ManifestDependency> {
            vec![]
        }

        async fn analyze_install_scripts(&self, _dir: &Path) -> Vec<Finding> {
            vec![]
        }

        fn get_registry_url(&self, name: &str) -> String {
            name.to_string()
        }

        fn ecosystem(&self) -> Ecosystem {
            self.ecosystem
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = AnalyzerRegistry::new();
        registry.register(std::sync::Arc::new(StubAnalyzer { name: "npm", ecosystem: Ecosystem::Npm }));
        assert!(registry.get("npm").is_some());
        assert!(registry.get("pypi").is_none());
    }

    #[test]
    fn test_double_registration_replaces() {
        let registry = AnalyzerRegistry::new();
        registry.register(std::sync::Arc::new(StubAnalyzer { name: "npm", ecosystem: Ecosystem::Npm }));
        registry.register(std::sync::Arc::new(StubAnalyzer { name: "npm", ecosystem: Ecosystem::Npm }));
        assert_eq!(registry.all_ecosystems().len(), 1);
    }
}
