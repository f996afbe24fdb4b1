//! Integration tests for the `kontra` binary's `validate` subcommand.
//!
//! Grounded on the engine crate's own (now superseded) `binary_tests.rs`:
//! build fixtures with `tempfile`, drive the compiled binary with
//! `assert_cmd`, assert on exit code and stdout.

use std::io::Write;

use assert_cmd::{Command, cargo::cargo_bin_cmd};
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn cmd() -> Command {
    cargo_bin_cmd!("kontra")
}

fn csv_fixture(rows: &[&str]) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "id,email").unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}

fn contract_fixture(datasource: &std::path::Path, rules: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(
        file,
        "name: orders\ndatasource: file://{}\nrules:\n{rules}",
        datasource.display()
    )
    .unwrap();
    file
}

#[test]
fn validate_passes_when_all_rules_hold() {
    let data = csv_fixture(&["1,a@example.com", "2,b@example.com"]);
    let contract = contract_fixture(data.path(), "  - name: not_null\n    params: { column: email }\n");

    cmd()
        .arg("validate")
        .arg(contract.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("PASS"));
}

#[test]
fn validate_fails_with_exit_code_one_on_blocking_violation() {
    let data = csv_fixture(&["1,a@example.com"]);
    let contract = contract_fixture(data.path(), "  - name: min_rows\n    params: { n: 10 }\n");

    cmd().arg("validate").arg(contract.path()).assert().code(1).stdout(predicate::str::contains("FAIL"));
}

#[test]
fn validate_reports_config_error_for_malformed_contract() {
    let mut contract = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(contract, "not: valid: yaml: at: all: -").unwrap();

    cmd().arg("validate").arg(contract.path()).assert().code(2);
}

#[test]
fn validate_data_override_replaces_contract_datasource() {
    let data = csv_fixture(&["1,a@example.com", "2,b@example.com"]);
    let contract = contract_fixture(
        std::path::Path::new("/nonexistent/placeholder.csv"),
        "  - name: not_null\n    params: { column: email }\n"
    );

    cmd()
        .arg("validate")
        .arg(contract.path())
        .arg("--data")
        .arg(format!("file://{}", data.path().display()))
        .assert()
        .success();
}
