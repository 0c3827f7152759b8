use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const P_GO: &str = r#"package p

func Add(a, b int) int {
	return a + b
}

func Clamp(v, lo, hi int) int {
	if v < lo {
		return lo
	}
	if v > hi {
		return hi
	}
	return v
}
"#;

const Q_GO: &str = r#"package q

import "example.com/m/p"

func Twice(x int) int {
	return p.Add(x, x)
}
"#;

fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("go.mod"), "module example.com/m\n\ngo 1.21\n").unwrap();
    fs::create_dir_all(dir.path().join("p")).unwrap();
    fs::create_dir_all(dir.path().join("q")).unwrap();
    fs::write(dir.path().join("p/p.go"), P_GO).unwrap();
    fs::write(dir.path().join("q/q.go"), Q_GO).unwrap();
    dir
}

fn refit(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("refit").unwrap();
    cmd.arg("--workspace").arg(dir);
    cmd
}

#[test]
fn rename_rewrites_declaration_and_callers() {
    let dir = workspace();

    refit(dir.path())
        .args(["rename", "Add", "Sum"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rename_symbol"));

    let p = fs::read_to_string(dir.path().join("p/p.go")).unwrap();
    let q = fs::read_to_string(dir.path().join("q/q.go")).unwrap();
    assert!(p.contains("func Sum(a, b int) int"));
    assert!(q.contains("p.Sum(x, x)"));
    assert!(!q.contains("p.Add"));
}

#[test]
fn dry_run_prints_diff_and_leaves_files_alone() {
    let dir = workspace();

    refit(dir.path())
        .args(["--dry-run", "rename", "Add", "Sum"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--- a/p/p.go"))
        .stdout(predicate::str::contains("+func Sum(a, b int) int {"))
        .stdout(predicate::str::contains("+\treturn p.Sum(x, x)"));

    assert_eq!(fs::read_to_string(dir.path().join("p/p.go")).unwrap(), P_GO);
    assert_eq!(fs::read_to_string(dir.path().join("q/q.go")).unwrap(), Q_GO);
}

#[test]
fn json_output_describes_the_execution() {
    let dir = workspace();

    let output = refit(dir.path())
        .args(["--json", "rename", "Add", "Sum"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["operation"], "rename_symbol");
    assert_eq!(result["modifiedFiles"].as_array().unwrap().len(), 2);
}

#[test]
fn invalid_identifier_is_a_usage_error() {
    let dir = workspace();

    refit(dir.path())
        .args(["rename", "Add", "1bad"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error"));

    assert_eq!(fs::read_to_string(dir.path().join("p/p.go")).unwrap(), P_GO);
}

#[test]
fn missing_arguments_are_rejected_by_the_parser() {
    let dir = workspace();

    refit(dir.path()).args(["rename", "Add"]).assert().code(2);
}

#[test]
fn delete_of_a_used_symbol_fails_without_writing() {
    let dir = workspace();

    refit(dir.path())
        .args(["delete", "Add", "--file", "p/p.go"])
        .assert()
        .code(1);

    assert_eq!(fs::read_to_string(dir.path().join("p/p.go")).unwrap(), P_GO);
}

#[test]
fn delete_error_is_reported_as_json() {
    let dir = workspace();

    let output = refit(dir.path())
        .args(["--json", "delete", "Add", "--file", "p/p.go"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(body["error"]["message"].is_string());
}

#[test]
fn analyze_summarizes_the_workspace() {
    let dir = workspace();

    refit(dir.path())
        .arg("analyze")
        .assert()
        .success()
        .stdout(predicate::str::contains("Module:    example.com/m"))
        .stdout(predicate::str::contains("Packages:  2"));
}

#[test]
fn analyze_symbol_lists_references() {
    let dir = workspace();

    refit(dir.path())
        .args(["analyze", "Add"])
        .assert()
        .success()
        .stdout(predicate::str::contains("References: 1"))
        .stdout(predicate::str::contains("q/q.go:6:"));
}

#[test]
fn complexity_reports_branching_functions() {
    let dir = workspace();

    refit(dir.path())
        .args(["complexity", "--min-complexity", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Clamp"))
        .stdout(predicate::str::contains("Add").not());
}

#[test]
fn config_prints_toml() {
    let dir = workspace();

    refit(dir.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[execution]"))
        .stdout(predicate::str::contains("[server]"));
}
