use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::cache_entry::CacheStats;
use crate::models::finding::Finding;
use crate::models::graph_doc::GraphDoc;

/// Aggregate counts per `finding_type`, echoed in the final report per §7.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditSummary {
    pub by_finding_type: HashMap<String, u64>,
    pub total_findings: u64,
}

impl AuditSummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut by_finding_type: HashMap<String, u64> = HashMap::new();
        for finding in findings {
            *by_finding_type.entry(finding.finding_type.clone()).or_insert(0) += 1;
        }
        Self { total_findings: findings.len() as u64, by_finding_type }
    }
}

/// Output of `Orchestrator::audit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub graph: GraphDoc,
    pub findings: Vec<Finding>,
    pub summary: AuditSummary,
    pub ecosystems_analyzed: Vec<String>,
    pub cache_statistics: CacheStats,
    /// `true` iff the run was cancelled before completing; the rest of the report reflects
    /// only the work finished before the signal arrived.
    pub partial: bool,
}
