//! Transitive Resolver: bounded parallel BFS over registry metadata, producing a flat
//! `"{name}@{version}" → { metadata, depth }` map up to `max_depth`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::ecosystem::Ecosystem;
use crate::models::package_metadata::PackageMetadata;
use crate::services::analyzer::EcosystemAnalyzer;
use crate::services::cache::Cache;
use crate::services::http_client::HttpClient;
use crate::utils::error::AuditError;

const VERSION_RANGE_OPERATORS: &[&str] = &[">=", "<=", "~=", "!=", ">", "<"];

/// Returns the concrete version to fetch, or the `"latest"` sentinel, per §4.4's rules.
pub fn resolve_version(spec: &str) -> String {
    let trimmed = spec.trim();

    if trimmed.is_empty() || matches!(trimmed, "*" | "latest" | "x" | "X") {
        return "latest".to_string();
    }
    if trimmed.contains(',') || VERSION_RANGE_OPERATORS.iter().any(|op| trimmed.contains(op)) {
        return "latest".to_string();
    }
    if let Some(stripped) = trimmed.strip_prefix('^').or_else(|| trimmed.strip_prefix('~')) {
        return stripped.to_string();
    }
    if let Some(stripped) = trimmed.strip_prefix('=') {
        return stripped.to_string();
    }
    trimmed.to_string()
}

#[derive(Debug, Clone)]
pub struct ResolvedEntry {
    pub metadata: PackageMetadata,
    pub depth: u32,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub max_depth: u32,
    pub pool_width: usize,
    pub npm_timeout: Duration,
    pub pypi_timeout: Duration,
    pub metadata_cache_ttl_hours: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            pool_width: 10,
            npm_timeout: Duration::from_secs(10),
            pypi_timeout: Duration::from_secs(3),
            metadata_cache_ttl_hours: 5.0,
        }
    }
}

pub struct Resolver {
    http: HttpClient,
    cache: Arc<Cache>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(http: HttpClient, cache: Arc<Cache>, config: ResolverConfig) -> Self {
        Self { http, cache, config }
    }

    /// Produces the flat resolved map for `root_name`/`root_version` (used as a label for the
    /// project under audit, taken as-is — never passed through `resolve_version`, since the
    /// root isn't something to fetch). The root itself is never fetched from the registry; its
    /// direct dependencies (as parsed from the manifest) seed the BFS frontier at depth 1, per
    /// the rest of the algorithm in §4.4. A set `cancellation` may stop early, returning
    /// whatever was resolved before the signal arrived.
    pub async fn resolve(
        &self,
        analyzer: &dyn EcosystemAnalyzer,
        root_name: &str,
        root_version: &str,
        root_dependencies: &HashMap<String, String>,
        cancellation: &CancellationToken,
    ) -> HashMap<String, ResolvedEntry> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut tree: HashMap<String, ResolvedEntry> = HashMap::new();

        visited.insert(format!("{root_name}@{root_version}"));
        tree.insert(
            format!("{root_name}@{root_version}"),
            ResolvedEntry {
                metadata: crate::models::package_metadata::PackageMetadata::new(root_name, root_version, analyzer.ecosystem())
                    .with_dependencies(root_dependencies.clone()),
                depth: 0,
            },
        );

        let mut level: Vec<(String, String, u32)> = root_dependencies
            .iter()
            .map(|(name, spec)| (name.clone(), resolve_version(spec), 1))
            .collect();

        while !level.is_empty() {
            if cancellation.is_cancelled() {
                debug!("resolver cancelled, returning partial tree");
                break;
            }

            let to_fetch: Vec<(String, String, u32)> = level
                .into_iter()
                .filter(|(n, v, d)| *d <= self.config.max_depth && !visited.contains(&format!("{n}@{v}")))
                .collect();
            for (n, v, _) in &to_fetch {
                visited.insert(format!("{n}@{v}"));
            }

            let results: Vec<(String, String, u32, Option<PackageMetadata>)> = stream::iter(to_fetch)
                .map(|(n, v, d)| async move {
                    let meta = self.fetch_metadata(analyzer, &n, &v).await;
                    (n, v, d, meta)
                })
                .buffer_unordered(self.config.pool_width)
                .collect()
                .await;

            let mut next_level = Vec::new();
            for (name, version, depth, meta) in results {
                let Some(meta) = meta else { continue };
                for (dep_name, dep_spec) in &meta.dependencies {
                    let resolved = resolve_version(dep_spec);
                    next_level.push((dep_name.clone(), resolved, depth + 1));
                }
                tree.insert(format!("{name}@{version}"), ResolvedEntry { metadata: meta, depth });
            }
            level = next_level;
        }

        tree
    }

    async fn fetch_metadata(&self, analyzer: &dyn EcosystemAnalyzer, name: &str, version: &str) -> Option<PackageMetadata> {
        let cache_key = self.cache.key(&format!("metadata:{}:{name}:{version}", analyzer.ecosystem()), None);

        if let Some(cached) = self.cache.get(&cache_key).await {
            if let Ok(meta) = serde_json::from_value(cached) {
                return Some(meta);
            }
        }

        let result = match analyzer.ecosystem() {
            Ecosystem::Npm => self.fetch_npm(analyzer, name, version).await,
            Ecosystem::Pypi => self.fetch_pypi(analyzer, name, version).await,
        };

        match result {
            Ok(Some(meta)) => {
                if let Ok(value) = serde_json::to_value(&meta) {
                    self.cache.store(&cache_key, value, self.config.metadata_cache_ttl_hours).await;
                }
                Some(meta)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(name, version, error = %err, "metadata fetch failed, skipping subtree");
                None
            }
        }
    }

    async fn fetch_npm(
        &self,
        analyzer: &dyn EcosystemAnalyzer,
        name: &str,
        version: &str,
    ) -> Result<Option<PackageMetadata>, AuditError> {
        let base_url = analyzer.get_registry_url(name);

        if version == "latest" {
            let doc: Option<NpmPackageDoc> = self.http.get_json(&base_url, self.config.npm_timeout).await?;
            let Some(doc) = doc else { return Ok(None) };

            let resolved_version = doc
                .dist_tags
                .as_ref()
                .and_then(|t| t.get("latest"))
                .cloned()
                .or_else(|| doc.versions.as_ref().and_then(|v| v.keys().last().cloned()));
            let Some(resolved_version) = resolved_version else { return Ok(None) };

            let version_doc = doc.versions.as_ref().and_then(|v| v.get(&resolved_version));
            Ok(version_doc.map(|vd| build_npm_metadata(name, &resolved_version, vd)))
        } else {
            let url = format!("{base_url}/{version}");
            let doc: Option<NpmVersionDoc> = self.http.get_json(&url, self.config.npm_timeout).await?;
            Ok(doc.map(|vd| build_npm_metadata(name, version, &vd)))
        }
    }

    async fn fetch_pypi(
        &self,
        analyzer: &dyn EcosystemAnalyzer,
        name: &str,
        version: &str,
    ) -> Result<Option<PackageMetadata>, AuditError> {
        let base_url = analyzer.get_registry_url(name);
        let url = if version == "latest" { base_url } else { base_url.replace("/json", &format!("/{version}/json")) };

        let doc: Option<PypiDoc> = self.http.get_json(&url, self.config.pypi_timeout).await?;
        Ok(doc.map(|doc| build_pypi_metadata(name, doc)))
    }
}

#[derive(Debug, Deserialize)]
struct NpmPackageDoc {
    #[serde(rename = "dist-tags")]
    dist_tags: Option<HashMap<String, String>>,
    versions: Option<HashMap<String, NpmVersionDoc>>,
}

#[derive(Debug, Deserialize)]
struct NpmVersionDoc {
    dependencies: Option<HashMap<String, String>>,
    #[serde(rename = "peerDependencies")]
    peer_dependencies: Option<HashMap<String, String>>,
    repository: Option<Value>,
}

fn build_npm_metadata(name: &str, version: &str, doc: &NpmVersionDoc) -> PackageMetadata {
    let mut dependencies = doc.dependencies.clone().unwrap_or_default();
    if let Some(peer) = &doc.peer_dependencies {
        for (k, v) in peer {
            dependencies.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    let repository_url = doc.repository.as_ref().and_then(|r| match r {
        Value::String(s) => Some(PackageMetadata::clean_repository_url(s)),
        Value::Object(o) => o.get("url").and_then(|u| u.as_str()).map(PackageMetadata::clean_repository_url),
        _ => None,
    });

    PackageMetadata::new(name, version, Ecosystem::Npm).with_dependencies(dependencies).with_repository_url(repository_url)
}

#[derive(Debug, Deserialize)]
struct PypiDoc {
    info: PypiInfo,
}

#[derive(Debug, Deserialize)]
struct PypiInfo {
    version: String,
    requires_dist: Option<Vec<String>>,
    project_urls: Option<HashMap<String, String>>,
    home_page: Option<String>,
}

fn build_pypi_metadata(name: &str, doc: PypiDoc) -> PackageMetadata {
    let spec_re = Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(.*)$").unwrap();
    let mut dependencies = HashMap::new();

    for raw in doc.info.requires_dist.unwrap_or_default() {
        let before_marker = raw.split(';').next().unwrap_or("").trim();
        if raw.contains("extra ==") || raw.contains("extra==") {
            continue;
        }
        if let Some(caps) = spec_re.captures(before_marker) {
            let dep_name = caps.get(1).unwrap().as_str().to_string();
            let dep_spec = caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
            dependencies.insert(dep_name, if dep_spec.is_empty() { "*".to_string() } else { dep_spec });
        }
    }

    let repository_url = doc
        .info
        .project_urls
        .as_ref()
        .and_then(|urls| urls.get("Source"))
        .cloned()
        .or(doc.info.home_page);

    PackageMetadata::new(name, doc.info.version, Ecosystem::Pypi).with_dependencies(dependencies).with_repository_url(repository_url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_version_wildcards() {
        for spec in ["*", "", "latest", "x", "X"] {
            assert_eq!(resolve_version(spec), "latest");
        }
    }

    #[test]
    fn test_resolve_version_ranges_fall_back_to_latest() {
        for spec in ["1.0.0,2.0.0", ">=1.0.0", "<=2.0.0", ">1.0.0", "<2.0.0", "~=1.0", "!=1.0.0"] {
            assert_eq!(resolve_version(spec), "latest");
        }
    }

    #[test]
    fn test_resolve_version_strips_caret_tilde_equals() {
        assert_eq!(resolve_version("^1.2.3"), "1.2.3");
        assert_eq!(resolve_version("~1.2.3"), "1.2.3");
        assert_eq!(resolve_version("=1.2.3"), "1.2.3");
    }

    #[test]
    fn test_resolve_version_exact_passthrough() {
        assert_eq!(resolve_version("1.2.3"), "1.2.3");
    }

    #[test]
    fn test_build_pypi_metadata_skips_extras() {
        let doc = PypiDoc {
            info: PypiInfo {
                version: "1.0.0".to_string(),
                requires_dist: Some(vec![
                    "requests (>=2.0)".to_string(),
                    "pytest ; extra == 'test'".to_string(),
                ]),
                project_urls: None,
                home_page: None,
            },
        };
        let meta = build_pypi_metadata("pkg", doc);
        assert!(meta.dependencies.contains_key("requests"));
        assert!(!meta.dependencies.contains_key("pytest"));
    }

    #[test]
    fn test_build_npm_metadata_cleans_repository_url() {
        let doc = NpmVersionDoc {
            dependencies: None,
            peer_dependencies: None,
            repository: Some(serde_json::json!({"url": "git+https://github.com/a/b.git"})),
        };
        let meta = build_npm_metadata("pkg", "1.0.0", &doc);
        assert_eq!(meta.repository_url.as_deref(), Some("https://github.com/a/b"));
    }
}
