use serde::{Deserialize, Serialize};
use std::fmt;

/// Enumeration of supported package ecosystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    /// npm registry (JavaScript/TypeScript packages)
    Npm,
    /// PyPI registry (Python packages)
    Pypi,
}

impl Ecosystem {
    /// Returns the registry API base URL for this ecosystem.
    pub fn registry_base_url(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "https://registry.npmjs.org",
            Ecosystem::Pypi => "https://pypi.org/pypi",
        }
    }

    /// Returns the package manager name commonly associated with this ecosystem.
    pub fn package_manager(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::Pypi => "pip",
        }
    }

    /// Validates a package name for this ecosystem.
    pub fn validate_package_name(&self, name: &str) -> Result<(), EcosystemError> {
        if name.is_empty() {
            return Err(EcosystemError::InvalidPackageName(
                "Package name cannot be empty".to_string(),
            ));
        }

        match self {
            Ecosystem::Npm => {
                if name.starts_with('.') || name.starts_with('_') {
                    return Err(EcosystemError::InvalidPackageName(
                        "npm package names cannot start with . or _".to_string(),
                    ));
                }
                if name.len() > 214 {
                    return Err(EcosystemError::InvalidPackageName(
                        "npm package names must be 214 characters or less".to_string(),
                    ));
                }
                if !name
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '/' || c == '@' || c == '.')
                {
                    return Err(EcosystemError::InvalidPackageName(
                        "npm package names can only contain lowercase letters, digits, hyphens, slashes, dots, and @".to_string(),
                    ));
                }
            }
            Ecosystem::Pypi => {
                if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.') {
                    return Err(EcosystemError::InvalidPackageName(
                        "Python package names can only contain letters, digits, hyphens, underscores, and periods".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Returns all supported ecosystems.
    pub fn all() -> &'static [Ecosystem] {
        &[Ecosystem::Npm, Ecosystem::Pypi]
    }

    /// Returns a version comparator for this ecosystem, used for the `>=X` fallback
    /// in malicious-package version matching.
    pub fn version_parser(&self) -> Box<dyn VersionParser> {
        match self {
            Ecosystem::Npm => Box::new(SimpleDotVersionParser),
            Ecosystem::Pypi => Box::new(SimpleDotVersionParser),
        }
    }
}

impl clap::ValueEnum for Ecosystem {
    fn value_variants<'a>() -> &'a [Self] {
        &[Ecosystem::Npm, Ecosystem::Pypi]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Ecosystem::Npm => clap::builder::PossibleValue::new("npm"),
            Ecosystem::Pypi => clap::builder::PossibleValue::new("pypi"),
        })
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ecosystem::Npm => write!(f, "npm"),
            Ecosystem::Pypi => write!(f, "pypi"),
        }
    }
}

impl std::str::FromStr for Ecosystem {
    type Err = EcosystemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "npm" | "javascript" | "js" | "node" => Ok(Ecosystem::Npm),
            "pypi" | "python" | "py" | "pip" => Ok(Ecosystem::Pypi),
            _ => Err(EcosystemError::UnknownEcosystem(s.to_string())),
        }
    }
}

/// Trait for ecosystem-specific version comparison.
///
/// Deliberately simplified (major.minor.patch dot-splitting, not full semver or PEP 440) —
/// the contract only needs ordering for the `is_malicious_package` `>=X` fallback, not a
/// general-purpose resolver.
pub trait VersionParser: Send + Sync {
    fn parse_version(&self, version: &str) -> Result<ParsedVersion, EcosystemError>;
    fn compare_versions(&self, v1: &str, v2: &str) -> Result<i8, EcosystemError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

pub struct SimpleDotVersionParser;

impl VersionParser for SimpleDotVersionParser {
    fn parse_version(&self, version: &str) -> Result<ParsedVersion, EcosystemError> {
        let clean = version.trim_start_matches('v');
        let mut parts = clean.split('.');

        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| EcosystemError::InvalidVersion(format!("Invalid version: {version}")))?;
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let patch = parts
            .next()
            .and_then(|p| p.chars().take_while(|c| c.is_ascii_digit()).collect::<String>().parse().ok())
            .unwrap_or(0);

        Ok(ParsedVersion { major, minor, patch })
    }

    fn compare_versions(&self, v1: &str, v2: &str) -> Result<i8, EcosystemError> {
        let a = self.parse_version(v1)?;
        let b = self.parse_version(v2)?;

        if a.major != b.major {
            return Ok(if a.major > b.major { 1 } else { -1 });
        }
        if a.minor != b.minor {
            return Ok(if a.minor > b.minor { 1 } else { -1 });
        }
        if a.patch != b.patch {
            return Ok(if a.patch > b.patch { 1 } else { -1 });
        }
        Ok(0)
    }
}

/// Errors that can occur when working with ecosystems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcosystemError {
    UnknownEcosystem(String),
    InvalidPackageName(String),
    InvalidVersion(String),
}

impl fmt::Display for EcosystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcosystemError::UnknownEcosystem(name) => write!(f, "Unknown ecosystem: {name}"),
            EcosystemError::InvalidPackageName(msg) => write!(f, "Invalid package name: {msg}"),
            EcosystemError::InvalidVersion(msg) => write!(f, "Invalid version: {msg}"),
        }
    }
}

impl std::error::Error for EcosystemError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecosystem_display() {
        assert_eq!(Ecosystem::Npm.to_string(), "npm");
        assert_eq!(Ecosystem::Pypi.to_string(), "pypi");
    }

    #[test]
    fn test_ecosystem_from_str() {
        assert_eq!("npm".parse::<Ecosystem>().unwrap(), Ecosystem::Npm);
        assert_eq!("javascript".parse::<Ecosystem>().unwrap(), Ecosystem::Npm);
        assert_eq!("node".parse::<Ecosystem>().unwrap(), Ecosystem::Npm);

        assert_eq!("pypi".parse::<Ecosystem>().unwrap(), Ecosystem::Pypi);
        assert_eq!("python".parse::<Ecosystem>().unwrap(), Ecosystem::Pypi);
        assert_eq!("pip".parse::<Ecosystem>().unwrap(), Ecosystem::Pypi);

        assert!("unknown".parse::<Ecosystem>().is_err());
    }

    #[test]
    fn test_registry_urls() {
        assert_eq!(Ecosystem::Npm.registry_base_url(), "https://registry.npmjs.org");
        assert_eq!(Ecosystem::Pypi.registry_base_url(), "https://pypi.org/pypi");
    }

    #[test]
    fn test_package_name_validation() {
        assert!(Ecosystem::Npm.validate_package_name("react").is_ok());
        assert!(Ecosystem::Npm.validate_package_name("@types/node").is_ok());
        assert!(Ecosystem::Npm.validate_package_name(".private").is_err());
        assert!(Ecosystem::Npm.validate_package_name("_internal").is_err());

        assert!(Ecosystem::Pypi.validate_package_name("flask").is_ok());
        assert!(Ecosystem::Pypi.validate_package_name("django-rest-framework").is_ok());
        assert!(Ecosystem::Pypi.validate_package_name("invalid@name").is_err());
    }

    #[test]
    fn test_version_comparison() {
        let parser = SimpleDotVersionParser;
        assert_eq!(parser.compare_versions("1.0.0", "1.0.0").unwrap(), 0);
        assert_eq!(parser.compare_versions("1.0.1", "1.0.0").unwrap(), 1);
        assert_eq!(parser.compare_versions("1.0.0", "1.0.1").unwrap(), -1);
        assert_eq!(parser.compare_versions("2.0.0", "1.9.9").unwrap(), 1);
    }

    #[test]
    fn test_all_ecosystems() {
        let all = Ecosystem::all();
        assert_eq!(all.len(), 2);
        assert!(all.contains(&Ecosystem::Npm));
        assert!(all.contains(&Ecosystem::Pypi));
    }
}
