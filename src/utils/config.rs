//! Runtime configuration, populated from environment variables per the external-interfaces
//! contract. Malformed numeric env vars fall back to the documented default with a logged
//! warning rather than panicking.

use std::path::PathBuf;

use tracing::warn;

/// Fluent configuration builder for the audit pipeline.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub github_token: Option<String>,
    pub cache_enabled: bool,
    pub output_directory: PathBuf,
    pub max_depth: u32,
    pub resolver_pool_width: usize,
    pub reputation_rate_per_second: f64,
    pub npm_timeout_secs: u64,
    pub pypi_timeout_secs: u64,
    pub metadata_cache_ttl_hours: u64,
    pub reputation_cache_ttl_hours: u64,
    pub llm_cache_ttl_hours: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            github_token: None,
            cache_enabled: true,
            output_directory: PathBuf::from(".audit-cache"),
            max_depth: 10,
            resolver_pool_width: 10,
            reputation_rate_per_second: 10.0,
            npm_timeout_secs: 10,
            pypi_timeout_secs: 3,
            metadata_cache_ttl_hours: 5,
            reputation_cache_ttl_hours: 24,
            llm_cache_ttl_hours: 168,
        }
    }
}

impl AuditConfig {
    /// Builds configuration from the process environment, per §6.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.openai_api_key = std::env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty());
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            if !model.is_empty() {
                config.openai_model = model;
            }
        }
        config.github_token = std::env::var("GITHUB_TOKEN")
            .or_else(|_| std::env::var("GITHUB_PAT_TOKEN"))
            .ok()
            .filter(|s| !s.is_empty());

        if let Ok(raw) = std::env::var("CACHE_ENABLED") {
            config.cache_enabled = !matches!(raw.as_str(), "0" | "false");
        }

        if let Ok(dir) = std::env::var("OUTPUT_DIRECTORY") {
            if !dir.is_empty() {
                config.output_directory = PathBuf::from(dir);
            }
        }

        config
    }

    pub fn with_openai_api_key(mut self, key: Option<String>) -> Self {
        self.openai_api_key = key;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_output_directory(mut self, dir: PathBuf) -> Self {
        self.output_directory = dir;
        self
    }

    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_resolver_pool_width(mut self, width: usize) -> Self {
        self.resolver_pool_width = width;
        self
    }

    pub fn llm_enabled(&self) -> bool {
        self.openai_api_key.is_some()
    }
}

/// Parses an optional env var as a positive numeric value, logging a warning and falling back
/// to `default` on absence or malformed input. Kept generic so callers can use it for both
/// integer and floating-point knobs without duplicating the warn-and-fallback boilerplate.
pub fn parse_env_or_default<T: std::str::FromStr>(var: &str, default: T) -> T {
    match std::env::var(var) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(var, raw, "malformed environment variable, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.openai_model, "gpt-4o-mini");
        assert!(config.cache_enabled);
        assert_eq!(config.max_depth, 10);
        assert_eq!(config.resolver_pool_width, 10);
        assert!(!config.llm_enabled());
    }

    #[test]
    fn test_builder_chain() {
        let config = AuditConfig::default()
            .with_cache_enabled(false)
            .with_max_depth(5)
            .with_resolver_pool_width(4);

        assert!(!config.cache_enabled);
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.resolver_pool_width, 4);
    }

    #[test]
    fn test_parse_env_or_default_fallback() {
        let value: u64 = parse_env_or_default("DEPSENTRY_TEST_NONEXISTENT_VAR", 42);
        assert_eq!(value, 42);
    }
}
