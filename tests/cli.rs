use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

const DURATIONS: [(&str, f64); 4] = [
    ("ShortTest1", 1.0),
    ("ShortTest2", 1.0),
    ("LongTest", 2.2),
    ("ShortTest3", 1.0),
];

fn testsplit(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("testsplit").unwrap();
    cmd.current_dir(dir)
        .arg("--config")
        .arg(dir.join("testsplit.toml"));
    cmd
}

fn write_tests(dir: &Path) -> std::path::PathBuf {
    let executable = dir.join("suite_tests");
    let tests: Vec<_> = DURATIONS
        .iter()
        .map(|(name, _)| json!({ "name": name, "executable": executable }))
        .collect();
    let path = dir.join("tests.json");
    std::fs::write(&path, serde_json::to_string(&tests).unwrap()).unwrap();
    path
}

fn write_results(dir: &Path) -> std::path::PathBuf {
    let executable = dir.join("suite_tests");
    let results: Vec<_> = DURATIONS
        .iter()
        .map(|(name, ms)| {
            json!({
                "name": name,
                "executable": executable,
                "outcome": "passed",
                "duration_ms": ms,
            })
        })
        .collect();
    let path = dir.join("results.json");
    std::fs::write(&path, serde_json::to_string(&results).unwrap()).unwrap();
    path
}

#[test]
fn test_plan_without_history_splits_by_count() {
    let dir = TempDir::new().unwrap();
    let tests = write_tests(dir.path());

    testsplit(dir.path())
        .args(["plan", "--workers", "2", "--tests"])
        .arg(&tests)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Scheduled 4 tests into 2 buckets (0 with known duration)",
        ))
        .stdout(predicate::str::contains("Bucket 0 (2 tests, 0ms)"));
}

#[test]
fn test_record_then_plan_balances_by_duration() {
    let dir = TempDir::new().unwrap();
    let tests = write_tests(dir.path());
    let results = write_results(dir.path());

    testsplit(dir.path())
        .arg("record")
        .arg("--results")
        .arg(&results)
        .assert()
        .success()
        .stdout(predicate::str::contains("into 1 duration files"));

    assert!(dir.path().join("suite_tests.gta_durations").exists());

    let output = testsplit(dir.path())
        .args(["plan", "--workers", "2", "--format", "json", "--tests"])
        .arg(&tests)
        .output()
        .unwrap();
    assert!(output.status.success());

    let buckets: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let buckets = buckets.as_array().unwrap();
    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0]["tests"][0]["name"], "LongTest");
    assert_eq!(buckets[0]["duration_ms"], 3);
    assert_eq!(buckets[1]["tests"].as_array().unwrap().len(), 3);
    assert_eq!(buckets[1]["duration_ms"], 3);
}

#[test]
fn test_forced_count_strategy() {
    let dir = TempDir::new().unwrap();
    let tests = write_tests(dir.path());
    let results = write_results(dir.path());

    testsplit(dir.path())
        .arg("record")
        .arg("--results")
        .arg(&results)
        .assert()
        .success();

    testsplit(dir.path())
        .args(["plan", "--workers", "2", "--strategy", "count", "--tests"])
        .arg(&tests)
        .assert()
        .success()
        .stdout(predicate::str::contains("Bucket 0 (2 tests, 4ms)"))
        .stdout(predicate::str::contains("Bucket 1 (2 tests, 2ms)"));
}

#[test]
fn test_show_recorded_durations() {
    let dir = TempDir::new().unwrap();
    let results = write_results(dir.path());

    testsplit(dir.path())
        .arg("record")
        .arg("--results")
        .arg(&results)
        .assert()
        .success();

    testsplit(dir.path())
        .arg("show")
        .arg(dir.path().join("suite_tests"))
        .assert()
        .success()
        .stdout(predicate::str::contains("4 tests:"))
        .stdout(predicate::str::contains("3ms  LongTest"));
}

#[test]
fn test_show_without_history_fails() {
    let dir = TempDir::new().unwrap();

    testsplit(dir.path())
        .arg("show")
        .arg(dir.path().join("suite_tests"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No recorded durations"));
}

#[test]
fn test_plan_with_missing_tests_file_fails() {
    let dir = TempDir::new().unwrap();

    testsplit(dir.path())
        .args(["plan", "--tests", "missing.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read missing.json"));
}

#[test]
fn test_init_and_validate() {
    let dir = TempDir::new().unwrap();

    testsplit(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));

    testsplit(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    testsplit(dir.path())
        .args(["init", "--force"])
        .assert()
        .success();

    testsplit(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid!"))
        .stdout(predicate::str::contains("Duration file extension: .gta_durations"));
}

#[test]
fn test_validate_rejects_unknown_strategy() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("testsplit.toml"),
        "[scheduling]\nstrategy = \"random\"\n",
    )
    .unwrap();

    testsplit(dir.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}
