//! Black-box tests for the `scan` subcommand, restricted to error paths that never reach the
//! network so they stay deterministic without mocking the real npm/PyPI registries.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn scan_nonexistent_directory_exits_nonzero() {
    let mut cmd = Command::cargo_bin("depsentry").unwrap();
    cmd.arg("scan").arg("/nonexistent/path/does-not-exist");
    cmd.assert().failure();
}

#[test]
fn scan_directory_with_no_recognized_manifest_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("depsentry").unwrap();
    cmd.arg("scan").arg(dir.path());
    cmd.assert().failure().stderr(predicate::str::contains("Error"));
}

#[test]
fn help_lists_scan_subcommand() {
    let mut cmd = Command::cargo_bin("depsentry").unwrap();
    cmd.arg("--help");
    cmd.assert().success().stdout(predicate::str::contains("scan"));
}

#[test]
fn scan_help_documents_flags() {
    let mut cmd = Command::cargo_bin("depsentry").unwrap();
    cmd.arg("scan").arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--ecosystem"))
        .stdout(predicate::str::contains("--max-depth"))
        .stdout(predicate::str::contains("--format"));
}
