use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity tag attached to a `Finding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A typed, severity-tagged security observation attached to a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub package: String,
    pub version: String,
    pub finding_type: String,
    pub severity: Severity,
    /// Confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub recommendations: Vec<String>,
    /// The producing component's name, e.g. `"npm_analyzer"`, `"reputation_scorer"`.
    pub source: String,
}

impl Finding {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        package: impl Into<String>,
        version: impl Into<String>,
        finding_type: impl Into<String>,
        severity: Severity,
        confidence: f64,
        evidence: Vec<String>,
        recommendations: Vec<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            package: package.into(),
            version: version.into(),
            finding_type: finding_type.into(),
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            evidence,
            recommendations,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_confidence_clamped() {
        let finding = Finding::new(
            "ctx", "0.1.2", "malicious_package", Severity::Critical, 1.5, vec![], vec![], "pypi_analyzer",
        );
        assert_eq!(finding.confidence, 1.0);
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Critical.to_string(), "critical");
        assert_eq!(Severity::Low.to_string(), "low");
    }
}
