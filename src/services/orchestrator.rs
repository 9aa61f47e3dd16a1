//! Orchestrator: the single entry point wiring every other component into one
//! `audit(manifest_path) → AuditReport` call, per §4.7.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::audit_report::{AuditReport, AuditSummary};
use crate::models::ecosystem::Ecosystem;
use crate::models::finding::{Finding, Severity};
use crate::services::analyzer::{global_registry, EcosystemAnalyzer};
use crate::services::cache::Cache;
use crate::services::graph_analyzer::GraphAnalyzer;
use crate::services::http_client::HttpClient;
use crate::services::reputation_scorer::ReputationScorer;
use crate::services::resolver::{Resolver, ResolverConfig};
use crate::utils::config::AuditConfig;
use crate::utils::error::AuditError;

pub struct Orchestrator {
    cache: Arc<Cache>,
    resolver: Resolver,
    reputation_scorer: ReputationScorer,
    graph_analyzer: GraphAnalyzer,
    config: AuditConfig,
}

impl Orchestrator {
    pub async fn new(config: AuditConfig) -> Self {
        let cache = if config.cache_enabled {
            Arc::new(Cache::open(&config.output_directory, None).await)
        } else {
            Arc::new(Cache::memory(None))
        };

        if config.llm_enabled() {
            if let Some(api_key) = &config.openai_api_key {
                let llm_client = crate::services::llm_client::LlmClient::new(api_key.clone(), config.openai_model.clone());
                if let Some(analyzer) = global_registry().get("pypi") {
                    if let Some(python_analyzer) =
                        analyzer.as_any().downcast_ref::<crate::services::python_analyzer::PythonAnalyzer>()
                    {
                        python_analyzer.configure_llm(cache.clone(), llm_client);
                    }
                }
            }
        }

        let resolver_config = ResolverConfig {
            max_depth: config.max_depth,
            pool_width: config.resolver_pool_width,
            npm_timeout: std::time::Duration::from_secs(config.npm_timeout_secs),
            pypi_timeout: std::time::Duration::from_secs(config.pypi_timeout_secs),
            metadata_cache_ttl_hours: config.metadata_cache_ttl_hours as f64,
        };

        let http = HttpClient::new();
        let resolver = Resolver::new(http.clone(), cache.clone(), resolver_config);
        let reputation_scorer = ReputationScorer::new(http, cache.clone(), config.reputation_rate_per_second);

        Self { cache, resolver, reputation_scorer, graph_analyzer: GraphAnalyzer::new(), config }
    }

    /// Runs the full pipeline against `manifest_dir`, optionally pinned to `ecosystem_override`.
    pub async fn audit(
        &self,
        manifest_dir: &Path,
        ecosystem_override: Option<Ecosystem>,
        cancellation: &CancellationToken,
    ) -> Result<AuditReport, AuditError> {
        let analyzer = match ecosystem_override {
            Some(eco) => global_registry()
                .get(eco_name(eco))
                .ok_or_else(|| AuditError::UnknownEcosystem(eco_name(eco).to_string()))?,
            None => global_registry().detect_ecosystem(manifest_dir)?,
        };

        info!(ecosystem = analyzer.ecosystem_name(), dir = %manifest_dir.display(), "starting audit");

        let manifests = analyzer.detect_manifest_files(manifest_dir);
        let primary_manifest = manifests
            .first()
            .cloned()
            .ok_or_else(|| AuditError::ManifestNotFound(manifest_dir.display().to_string()))?;

        let direct_deps = analyzer.extract_dependencies(&primary_manifest);
        let root_dependencies: std::collections::HashMap<String, String> =
            direct_deps.iter().map(|d| (d.name.clone(), d.version_spec.clone())).collect();

        let (root_name, root_version) = root_identity(&primary_manifest, manifest_dir);

        let resolved = self
            .resolver
            .resolve(analyzer.as_ref(), &root_name, &root_version, &root_dependencies, cancellation)
            .await;

        let graph = self.graph_analyzer.build_graph(analyzer.as_ref(), &primary_manifest, &root_name, &root_version, &resolved)?;

        let mut findings = Vec::new();

        if cancellation.is_cancelled() {
            return Ok(self.finish(graph, findings, analyzer.ecosystem_name(), true).await);
        }

        // §4.7 step 5: malicious lookup + install-script analysis + reputation, per distinct package.
        for entry in resolved.values() {
            if cancellation.is_cancelled() {
                break;
            }
            if let Some(malicious) = analyzer.is_malicious_package(&entry.metadata.name, &entry.metadata.version) {
                findings.push(Finding::new(
                    entry.metadata.name.clone(),
                    entry.metadata.version.clone(),
                    "malicious_package",
                    Severity::Critical,
                    0.95,
                    vec![format!("{}: {}", entry.metadata.name, malicious.reason)],
                    vec!["Remove this dependency immediately".to_string()],
                    "analyzer_registry",
                ));
            }

            match self.reputation_scorer.calculate(analyzer.as_ref(), &entry.metadata.name, &entry.metadata.version).await {
                Ok(reputation) if reputation.score < 0.5 => {
                    findings.push(Finding::new(
                        entry.metadata.name.clone(),
                        entry.metadata.version.clone(),
                        "low_reputation",
                        Severity::Medium,
                        0.7,
                        reputation.flags.clone(),
                        vec!["Review this package's registry presence before trusting it".to_string()],
                        "reputation_scorer",
                    ));
                }
                Ok(_) => {}
                Err(err) => warn!(package = %entry.metadata.name, error = %err, "reputation lookup failed"),
            }
        }

        // Install-script analysis only covers the root project's own directory, not fetched
        // tarballs for transitive packages (§4.7 step 5).
        findings.extend(analyzer.analyze_install_scripts(manifest_dir).await);

        for cycle in &graph.circular_dependencies {
            findings.push(Finding::new(
                "",
                "",
                "circular_dependency",
                Severity::Medium,
                0.9,
                vec![cycle.description.clone()],
                vec!["Break the cycle by extracting the shared dependency".to_string()],
                "graph_analyzer",
            ));
        }
        for conflict in &graph.version_conflicts {
            findings.push(Finding::new(
                conflict.package.clone(),
                conflict.conflicting_versions.join(", "),
                "version_conflict",
                Severity::Low,
                0.8,
                vec![conflict.description.clone()],
                vec!["Align on a single version across the dependency tree".to_string()],
                "graph_analyzer",
            ));
        }

        Ok(self.finish(graph, findings, analyzer.ecosystem_name(), cancellation.is_cancelled()).await)
    }

    async fn finish(
        &self,
        graph: crate::models::graph_doc::GraphDoc,
        findings: Vec<Finding>,
        ecosystem_name: &str,
        partial: bool,
    ) -> AuditReport {
        let summary = AuditSummary::from_findings(&findings);
        let cache_statistics = self.cache.stats().await;
        AuditReport {
            graph,
            findings,
            summary,
            ecosystems_analyzed: vec![ecosystem_name.to_string()],
            cache_statistics,
            partial,
        }
    }
}

fn eco_name(ecosystem: Ecosystem) -> &'static str {
    match ecosystem {
        Ecosystem::Npm => "npm",
        Ecosystem::Pypi => "pypi",
    }
}

/// Determines the audited project's own identity: `package.json`'s `name`/`version` fields for
/// npm, falling back to the manifest directory's basename and the literal `"*"` version when the
/// ecosystem or manifest doesn't carry one (PyPI manifests rarely name the root project).
fn root_identity(primary_manifest: &Path, manifest_dir: &Path) -> (String, String) {
    if primary_manifest.file_name().and_then(|n| n.to_str()) == Some("package.json") {
        if let Ok(content) = std::fs::read_to_string(primary_manifest) {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&content) {
                let name = json.get("name").and_then(|v| v.as_str()).map(str::to_string);
                let version = json.get("version").and_then(|v| v.as_str()).map(str::to_string);
                if let Some(name) = name {
                    return (name, version.unwrap_or_else(|| "*".to_string()));
                }
            }
        }
    }

    let name = manifest_dir.file_name().and_then(|n| n.to_str()).unwrap_or("root").to_string();
    (name, "*".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_identity_from_package_json() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        std::fs::write(&manifest, r#"{"name": "a", "version": "2.0.0"}"#).unwrap();

        let (name, version) = root_identity(&manifest, dir.path());
        assert_eq!(name, "a");
        assert_eq!(version, "2.0.0");
    }

    #[test]
    fn test_root_identity_defaults_version_star_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        std::fs::write(&manifest, r#"{"name": "a"}"#).unwrap();

        let (name, version) = root_identity(&manifest, dir.path());
        assert_eq!(name, "a");
        assert_eq!(version, "*");
    }

    #[test]
    fn test_root_identity_falls_back_to_dir_name_for_non_npm_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("requirements.txt");
        std::fs::write(&manifest, "flask==2.0.0\n").unwrap();

        let (name, version) = root_identity(&manifest, dir.path());
        assert_eq!(name, dir.path().file_name().unwrap().to_str().unwrap());
        assert_eq!(version, "*");
    }

    #[test]
    fn test_eco_name_round_trips() {
        assert_eq!(eco_name(Ecosystem::Npm), "npm");
        assert_eq!(eco_name(Ecosystem::Pypi), "pypi");
    }
}
