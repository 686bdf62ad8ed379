//! CLI integration tests

use std::io::Write;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

fn kseg(args: &[&str]) -> Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "segmenter-cli", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

fn csv_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(contents.as_bytes())
        .expect("Failed to write temp file");
    file
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = kseg(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Pod Run Segmenter"), "Should show app name");
    assert!(stdout.contains("runs"), "Should show runs command");
    assert!(stdout.contains("periods"), "Should show periods command");
    assert!(stdout.contains("segment"), "Should show segment command");
    assert!(stdout.contains("show"), "Should show show command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = kseg(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("kseg"), "Should show binary name");
}

/// Test runs subcommand help
#[test]
fn test_runs_help() {
    let output = kseg(&["runs", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Runs help should succeed");
    assert!(stdout.contains("--namespace"), "Should show namespace option");
    assert!(stdout.contains("--pod-regex"), "Should show pod-regex option");
    assert!(stdout.contains("--min-break"), "Should show min-break option");
    assert!(stdout.contains("--timestep"), "Should show timestep option");
    assert!(stdout.contains("--raw"), "Should show raw option");
}

/// Test periods subcommand help
#[test]
fn test_periods_help() {
    let output = kseg(&["periods", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Periods help should succeed");
    assert!(stdout.contains("--history"), "Should show history option");
    assert!(stdout.contains("--start"), "Should show start option");
}

/// Test that exact and regex pod matchers are rejected together
#[test]
fn test_runs_rejects_conflicting_pod_matchers() {
    let output = kseg(&["runs", "--pod", "job-1", "--pod-regex", "job-.*"]);

    assert!(!output.status.success(), "Conflicting matchers should fail");
}

/// Test offline segmentation of a history file
#[test]
fn test_segment_history_file() {
    let history = csv_file("pod,time\njob-1,600\njob-1,1200\njob-1,10000\njob-1,10600\njob-2,50\n");
    let path = history.path().to_str().unwrap();

    let output = kseg(&["segment", path, "--raw", "--format", "json"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Segment should succeed");
    let runs: serde_json::Value = serde_json::from_str(&stdout).expect("Output should be JSON");
    let runs = runs.as_array().expect("Output should be a list");

    assert_eq!(runs.len(), 2, "job-2 has a single point and is skipped");
    assert_eq!(runs[0]["start"], "0");
    assert_eq!(runs[0]["end"], "1200");
    assert_eq!(runs[1]["start"], "9400");
    assert_eq!(runs[1]["labels"]["pod"], "job-1");
}

/// Test showing a saved run table in both display modes
#[test]
fn test_show_switches_display_mode() {
    let table = csv_file("pod,start,end\njob-1,0,3600\n");
    let path = table.path().to_str().unwrap();

    let raw = kseg(&["show", path, "--format", "json"]);
    let raw_stdout = String::from_utf8_lossy(&raw.stdout);
    assert!(raw.status.success(), "Show should succeed");
    assert!(raw_stdout.contains("\"3600\""), "Numeric table stays raw");

    let calendar = kseg(&["show", path, "--calendar", "--format", "json"]);
    let calendar_stdout = String::from_utf8_lossy(&calendar.stdout);
    assert!(calendar.status.success(), "Show --calendar should succeed");
    assert!(
        calendar_stdout.contains("1970-01-01 01:00:00"),
        "Calendar mode should format as UTC datetime"
    );
}
