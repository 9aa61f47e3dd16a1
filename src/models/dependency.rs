use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::ecosystem::Ecosystem;

/// Whether a manifest-declared dependency is required at runtime or only for development.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    Production,
    Development,
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyType::Production => write!(f, "production"),
            DependencyType::Development => write!(f, "development"),
        }
    }
}

/// A single direct dependency as extracted from one manifest file, before resolution.
///
/// This is the shape `EcosystemAnalyzer::extract_dependencies` returns: a raw name + version
/// spec pair, not yet resolved to a concrete version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestDependency {
    pub name: String,
    pub version_spec: String,
    pub dependency_type: DependencyType,
    pub source_file: PathBuf,
    pub ecosystem: Ecosystem,
}

impl ManifestDependency {
    pub fn new(
        name: impl Into<String>,
        version_spec: impl Into<String>,
        dependency_type: DependencyType,
        source_file: PathBuf,
        ecosystem: Ecosystem,
    ) -> Self {
        Self {
            name: name.into(),
            version_spec: version_spec.into(),
            dependency_type,
            source_file,
            ecosystem,
        }
    }

    pub fn production(
        name: impl Into<String>,
        version_spec: impl Into<String>,
        source_file: PathBuf,
        ecosystem: Ecosystem,
    ) -> Self {
        Self::new(name, version_spec, DependencyType::Production, source_file, ecosystem)
    }

    pub fn development(
        name: impl Into<String>,
        version_spec: impl Into<String>,
        source_file: PathBuf,
        ecosystem: Ecosystem,
    ) -> Self {
        Self::new(name, version_spec, DependencyType::Development, source_file, ecosystem)
    }

    pub fn is_dev_only(&self) -> bool {
        self.dependency_type == DependencyType::Development
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_dependency() {
        let dep = ManifestDependency::production(
            "express",
            "^4.18.0",
            PathBuf::from("package.json"),
            Ecosystem::Npm,
        );

        assert!(!dep.is_dev_only());
        assert_eq!(dep.dependency_type.to_string(), "production");
    }

    #[test]
    fn test_development_dependency() {
        let dep = ManifestDependency::development(
            "jest",
            "^29.0.0",
            PathBuf::from("package.json"),
            Ecosystem::Npm,
        );

        assert!(dep.is_dev_only());
        assert_eq!(dep.dependency_type.to_string(), "development");
    }
}
