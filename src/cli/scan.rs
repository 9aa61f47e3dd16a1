//! `depsentry scan` — runs the full audit pipeline against a manifest directory and prints
//! an `AuditReport`, either as pretty JSON or a short human-readable summary.

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::models::audit_report::AuditReport;
use crate::models::ecosystem::Ecosystem;
use crate::services::orchestrator::Orchestrator;
use crate::utils::config::AuditConfig;
use crate::utils::error::{AuditError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

pub struct ScanCommand {
    pub manifest_path: PathBuf,
    pub ecosystem: Option<Ecosystem>,
    pub max_depth: Option<u32>,
    pub output_dir: Option<PathBuf>,
    pub format: OutputFormat,
    pub timeout_secs: Option<u64>,
}

impl ScanCommand {
    pub async fn run(self) -> Result<()> {
        let dir = if self.manifest_path.is_dir() {
            self.manifest_path.clone()
        } else {
            self.manifest_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        };

        let mut config = AuditConfig::from_env();
        if let Some(depth) = self.max_depth {
            config = config.with_max_depth(depth);
        }
        if let Some(output_dir) = self.output_dir {
            config = config.with_output_directory(output_dir);
        }

        let orchestrator = Orchestrator::new(config).await;
        let cancellation = CancellationToken::new();

        let report = if let Some(secs) = self.timeout_secs {
            let guard = cancellation.clone();
            let sleeper = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                guard.cancel();
            });
            let report = orchestrator.audit(&dir, self.ecosystem, &cancellation).await?;
            sleeper.abort();
            report
        } else {
            orchestrator.audit(&dir, self.ecosystem, &cancellation).await?
        };

        match self.format {
            OutputFormat::Json => print_json(&report)?,
            OutputFormat::Text => print_text(&report),
        }

        if report.partial {
            error!("scan did not complete; results are partial");
        }

        Ok(())
    }
}

fn print_json(report: &AuditReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).map_err(AuditError::Json)?;
    println!("{json}");
    Ok(())
}

fn print_text(report: &AuditReport) {
    println!("ecosystems analyzed: {}", report.ecosystems_analyzed.join(", "));
    println!("packages in tree: {}", report.graph.metadata.total_packages);
    println!("findings: {}", report.summary.total_findings);
    for (finding_type, count) in &report.summary.by_finding_type {
        println!("  {finding_type}: {count}");
    }
    for finding in &report.findings {
        println!(
            "[{}] {}@{} {} ({:.0}% confidence): {}",
            finding.severity,
            finding.package,
            finding.version,
            finding.finding_type,
            finding.confidence * 100.0,
            finding.evidence.first().cloned().unwrap_or_default(),
        );
    }
    if report.partial {
        println!("(partial results: scan was cancelled before completion)");
    }
}
