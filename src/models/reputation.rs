use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-factor sub-scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReputationFactors {
    pub age: f64,
    pub downloads: f64,
    pub author: f64,
    pub maintenance: f64,
}

impl ReputationFactors {
    /// Weighted composite per §4.3: `0.3*age + 0.3*downloads + 0.2*author + 0.2*maintenance`.
    pub fn composite(&self) -> f64 {
        0.3 * self.age + 0.3 * self.downloads + 0.2 * self.author + 0.2 * self.maintenance
    }

    /// Flags are derived from sub-scores, never the composite: each fires iff its sub-score
    /// is strictly below 0.5.
    pub fn flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.age < 0.5 {
            flags.push("new_package".to_string());
        }
        if self.downloads < 0.5 {
            flags.push("low_downloads".to_string());
        }
        if self.author < 0.5 {
            flags.push("unknown_author".to_string());
        }
        if self.maintenance < 0.5 {
            flags.push("unmaintained".to_string());
        }
        flags
    }
}

/// The outcome of `ReputationScorer::calculate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReputationResult {
    pub score: f64,
    pub factors: ReputationFactors,
    pub flags: Vec<String>,
    /// Raw registry payload, echoed back for auditing.
    pub metadata: Value,
}

impl ReputationResult {
    pub fn from_factors(factors: ReputationFactors, metadata: Value) -> Self {
        Self {
            score: factors.composite(),
            flags: factors.flags(),
            factors,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_weights() {
        let factors = ReputationFactors {
            age: 1.0,
            downloads: 1.0,
            author: 1.0,
            maintenance: 1.0,
        };
        assert!((factors.composite() - 1.0).abs() < 1e-9);

        let factors = ReputationFactors {
            age: 0.0,
            downloads: 0.0,
            author: 0.0,
            maintenance: 0.0,
        };
        assert!((factors.composite() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_flags_from_subscores_not_composite() {
        let factors = ReputationFactors {
            age: 0.2,
            downloads: 1.0,
            author: 1.0,
            maintenance: 1.0,
        };
        // composite is high (0.86) but age flag must still fire
        assert!(factors.composite() > 0.5);
        let flags = factors.flags();
        assert!(flags.contains(&"new_package".to_string()));
        assert_eq!(flags.len(), 1);
    }
}
