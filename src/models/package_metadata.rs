use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::ecosystem::Ecosystem;

/// Metadata as fetched from a registry. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    /// Resolved, concrete version.
    pub version: String,
    pub ecosystem: Ecosystem,
    /// name -> version spec, union of runtime + peer dependencies (npm) or `requires_dist` (PyPI).
    pub dependencies: HashMap<String, String>,
    pub repository_url: Option<String>,
}

impl PackageMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>, ecosystem: Ecosystem) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ecosystem,
            dependencies: HashMap::new(),
            repository_url: None,
        }
    }

    pub fn with_dependencies(mut self, dependencies: HashMap<String, String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_repository_url(mut self, url: Option<String>) -> Self {
        self.repository_url = url;
        self
    }

    /// Strips `git+` and `git://` prefixes and a trailing `.git` suffix, matching the
    /// cleanup the Resolver applies to npm's `repository.url` field.
    pub fn clean_repository_url(raw: &str) -> String {
        let mut url = raw.trim();
        if let Some(stripped) = url.strip_prefix("git+") {
            url = stripped;
        }
        let mut owned = url.to_string();
        if let Some(stripped) = owned.strip_prefix("git://") {
            owned = format!("https://{stripped}");
        }
        if let Some(stripped) = owned.strip_suffix(".git") {
            owned = stripped.to_string();
        }
        owned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_repository_url() {
        assert_eq!(
            PackageMetadata::clean_repository_url("git+https://github.com/a/b.git"),
            "https://github.com/a/b"
        );
        assert_eq!(
            PackageMetadata::clean_repository_url("git://github.com/a/b.git"),
            "https://github.com/a/b"
        );
        assert_eq!(
            PackageMetadata::clean_repository_url("https://github.com/a/b"),
            "https://github.com/a/b"
        );
    }

    #[test]
    fn test_builder() {
        let mut deps = HashMap::new();
        deps.insert("lodash".to_string(), "^4.17.0".to_string());

        let meta = PackageMetadata::new("express", "4.18.2", Ecosystem::Npm)
            .with_dependencies(deps.clone())
            .with_repository_url(Some("https://github.com/expressjs/express".to_string()));

        assert_eq!(meta.dependencies, deps);
        assert_eq!(meta.repository_url.as_deref(), Some("https://github.com/expressjs/express"));
    }
}
