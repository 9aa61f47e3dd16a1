// depsentry - software supply-chain security auditor
// Main CLI entry point

use std::process;

use clap::Parser;
use depsentry::cli::{Cli, CliDispatcher};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = CliDispatcher::execute(cli.command).await;

    if let Err(err) = result {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}
