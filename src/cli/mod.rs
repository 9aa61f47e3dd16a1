// CLI module for command-line interface

pub mod scan;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::models::ecosystem::Ecosystem;
use crate::utils::error::Result;

use self::scan::{OutputFormat, ScanCommand};

/// Main CLI structure
#[derive(Parser)]
#[command(name = "depsentry")]
#[command(about = "A supply-chain security auditor for npm and PyPI dependency trees")]
#[command(long_about = r#"depsentry audits an npm or PyPI project's full transitive dependency
tree for supply-chain risk: known-malicious packages, suspicious install scripts, thin
registry reputation, circular dependencies, and version conflicts.

Examples:
  depsentry scan .                         Audit the project in the current directory
  depsentry scan ./app --ecosystem npm     Force npm detection
  depsentry scan . --format text           Human-readable summary instead of JSON
  depsentry scan . --max-depth 5           Cap transitive resolution depth

For detailed documentation, visit: https://github.com/depsentry/depsentry"#)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// All available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Audit a project's dependency tree and print a report
    #[command(long_about = r#"Detects the project's ecosystem, resolves its full transitive
dependency tree, and checks every package for known-malicious status, suspicious install
scripts, and thin registry reputation. Also reports circular dependencies and version
conflicts found in the tree.

Examples:
  depsentry scan .                       Audit the current directory
  depsentry scan ./app --ecosystem pypi  Force PyPI detection
  depsentry scan . --format text         Human-readable summary
  depsentry scan . --timeout 30          Give up after 30s, returning partial results"#)]
    Scan {
        /// Path to the project directory (or a manifest file inside it)
        manifest_path: PathBuf,

        /// Force ecosystem detection instead of probing for a manifest
        #[arg(long, value_enum)]
        ecosystem: Option<Ecosystem>,

        /// Maximum transitive resolution depth
        #[arg(long)]
        max_depth: Option<u32>,

        /// Directory for the durable cache (default: .audit-cache)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Abort the scan after this many seconds, returning partial results
        #[arg(long)]
        timeout: Option<u64>,
    },
}

/// CLI command dispatcher
pub struct CliDispatcher;

impl CliDispatcher {
    /// Execute a CLI command
    pub async fn execute(command: Commands) -> Result<()> {
        match command {
            Commands::Scan { manifest_path, ecosystem, max_depth, output_dir, format, timeout } => {
                let cmd = ScanCommand {
                    manifest_path,
                    ecosystem,
                    max_depth,
                    output_dir,
                    format,
                    timeout_secs: timeout,
                };
                cmd.run().await
            }
        }
    }
}
