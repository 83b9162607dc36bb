//! Smoke tests for the codediff CLI
//!
//! These run the real binary over small run directories written to a tempdir.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get a command for the codediff binary
fn codediff() -> Command {
    let mut cmd = Command::cargo_bin("codediff").expect("codediff binary should exist");
    cmd.env_remove("RUST_LOG").env_remove("CODEDIFF_EXPLAIN_API_URL");
    cmd
}

/// Write a pytest run directory where each kernel belongs to its own test
fn write_run(root: &Path, name: &str, bodies: &[&str]) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(dir.join("cuda")).unwrap();
    fs::write(dir.join("git_hash"), "0123456789abcdef\n").unwrap();
    fs::write(dir.join("command"), "python -m pytest -v tests/python/test_ops.py\n").unwrap();
    fs::write(dir.join("command_type"), "PYTEST").unwrap();
    fs::write(dir.join("exitcode"), "0\n").unwrap();
    fs::write(dir.join("env"), "CUDA_HOME=/usr/local/cuda\n").unwrap();

    let mut stdout = String::new();
    for (i, body) in bodies.iter().enumerate() {
        stdout.push_str(&format!(
            "tests/python/test_ops.py::test_op{i} PRINTING: k{i}.cu\nPASSED\n"
        ));
        fs::write(
            dir.join("cuda").join(format!("k{i}.cu")),
            format!(
                "typedef int nvfuser_index_t;\nnamespace {{\n__global__ void nvfuser_{}() {{\n{body}\n}}\n}}\n",
                i + 10
            ),
        )
        .unwrap();
    }
    fs::write(dir.join("stdout"), stdout).unwrap();
    dir
}

fn parse(temp: &TempDir, name: &str, bodies: &[&str]) -> PathBuf {
    let dir = write_run(temp.path(), name, bodies);
    let json = temp.path().join(format!("{name}.json"));
    codediff()
        .arg("parse")
        .arg(&dir)
        .arg(&json)
        .assert()
        .success();
    json
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    codediff()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.4.0"));
}

#[test]
fn test_help_flag() {
    codediff()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("parse"))
        .stdout(predicate::str::contains("join"))
        .stdout(predicate::str::contains("diff_report"));
}

#[test]
fn test_no_args_fails() {
    codediff().assert().failure();
}

#[test]
fn test_diff_subcommand_help() {
    codediff()
        .args(["diff", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mismatched_cuda_or_ptx"))
        .stdout(predicate::str::contains("no-print-diff"));
}

#[test]
fn test_diff_report_subcommand_help() {
    codediff()
        .args(["diff_report", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--max-diffs"))
        .stdout(predicate::str::contains("--hide-env"));
}

// ============================================================================
// Workflow Tests
// ============================================================================

#[test]
fn test_parse_writes_json() {
    let temp = TempDir::new().unwrap();
    let json = parse(&temp, "base", &["  out = a + b;"]);

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(json).unwrap()).unwrap();
    assert_eq!(value["name"], "base");
    assert_eq!(value["exit_code"], 0);
    assert!(value["kernel_map"]["tests/python/test_ops.py::test_op0"].is_object());
}

#[test]
fn test_parse_missing_stdout_fails() {
    let temp = TempDir::new().unwrap();
    let dir = write_run(temp.path(), "broken", &["  x = 1;"]);
    fs::remove_file(dir.join("stdout")).unwrap();

    codediff()
        .arg("parse")
        .arg(&dir)
        .arg(temp.path().join("out.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("stdout"));
}

#[test]
fn test_diff_identical_runs_exit_zero() {
    let temp = TempDir::new().unwrap();
    let a = parse(&temp, "a", &["  x = 1;"]);
    let b = parse(&temp, "b", &["  x = 1;"]);

    codediff()
        .arg("diff")
        .arg(&a)
        .arg(&b)
        .arg(temp.path().join("diff.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("No differences found in overlapping tests!"));
}

#[test]
fn test_diff_changed_kernel_exit_one() {
    let temp = TempDir::new().unwrap();
    let a = parse(&temp, "a", &["  x = 1;", "  y = 1;"]);
    let b = parse(&temp, "b", &["  x = 1;", "  y = 2;"]);
    let diff_json = temp.path().join("diff.json");

    codediff()
        .args(["--color", "never", "diff"])
        .arg(&a)
        .arg(&b)
        .arg(&diff_json)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("-  y = 1;"))
        .stdout(predicate::str::contains("+  y = 2;"))
        .stdout(predicate::str::contains("1 kernel differences from 1 tests found"));
    assert!(diff_json.exists());
}

#[test]
fn test_diff_hide_diffs() {
    let temp = TempDir::new().unwrap();
    let a = parse(&temp, "a", &["  y = 1;"]);
    let b = parse(&temp, "b", &["  y = 2;"]);

    codediff()
        .args(["diff", "--hide-diffs"])
        .arg(&a)
        .arg(&b)
        .arg(temp.path().join("diff.json"))
        .assert()
        .code(1)
        .stdout(predicate::str::contains("+  y = 2;").not());
}

#[test]
fn test_join_then_report() {
    let temp = TempDir::new().unwrap();
    let a = parse(&temp, "a", &["  x = 1;"]);
    let b = parse(&temp, "b", &["  x = 2;"]);
    let diff_json = temp.path().join("diff.json");
    codediff()
        .args(["-q", "diff"])
        .arg(&a)
        .arg(&b)
        .arg(&diff_json)
        .assert()
        .code(1);

    let html = temp.path().join("report.html");
    codediff()
        .args(["diff_report", "--hide-env"])
        .arg(&diff_json)
        .arg(&html)
        .assert()
        .success();
    let text = fs::read_to_string(&html).unwrap();
    assert!(text.contains("DIFFERENCES FOUND"));
    assert!(!text.contains("CUDA_HOME"));

    // a single shard joins to itself
    let joined = temp.path().join("joined.json");
    codediff()
        .args(["join", "-o"])
        .arg(&joined)
        .arg(&a)
        .assert()
        .success();
    assert!(joined.exists());
}

#[test]
fn test_join_output_collides_with_input() {
    let temp = TempDir::new().unwrap();
    let a = parse(&temp, "a", &["  x = 1;"]);

    codediff()
        .args(["join", "-o"])
        .arg(&a)
        .arg(&a)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid argument"));
}
