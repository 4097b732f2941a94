//! Integration tests for CLI log output.
//!
//! Runs the binary with an isolated home so config discovery, the section cache and the
//! log file all land in a temp directory.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run_docweave(home: &Path, args: &[&str]) -> Output {
    let workspace = home.join("ws");
    fs::create_dir_all(&workspace).unwrap();
    Command::new(env!("CARGO_BIN_EXE_docweave"))
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_CACHE_HOME", home.join("cache"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env_remove("DOCWEAVE_LOG")
        .env_remove("DOCWEAVE_LOG_FORMAT")
        .env_remove("DOCWEAVE_LOG_OUTPUT")
        .arg("--workspace")
        .arg(&workspace)
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn file_output_writes_text_log() {
    let temp_dir = TempDir::new().unwrap();
    let log = temp_dir.path().join("logs").join("docweave.log");

    let output = run_docweave(
        temp_dir.path(),
        &["--log-output", "file", "--log-file", log.to_str().unwrap(), "cache", "stats"],
    );

    assert!(
        output.status.success(),
        "docweave cache stats should succeed: stderr={:?}",
        String::from_utf8_lossy(&output.stderr)
    );
    let contents = fs::read_to_string(&log).unwrap();
    assert!(contents.contains("docweave CLI starting"));
    assert!(contents.contains("Command finished"));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Section cache"));
}

#[test]
fn json_format_emits_one_object_per_line() {
    let temp_dir = TempDir::new().unwrap();
    let log = temp_dir.path().join("docweave.jsonl");

    let output = run_docweave(
        temp_dir.path(),
        &[
            "--log-output",
            "file",
            "--log-format",
            "json",
            "--log-file",
            log.to_str().unwrap(),
            "cache",
            "clear",
        ],
    );
    assert!(output.status.success());

    let contents = fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = contents.lines().filter(|l| !l.trim().is_empty()).collect();
    assert!(!lines.is_empty());
    for line in lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(value.get("level").is_some());
    }
    assert!(String::from_utf8_lossy(&output.stdout).contains("Removed 0 cached sections"));
}

#[test]
fn quiet_run_creates_no_log_file() {
    let temp_dir = TempDir::new().unwrap();
    let log = temp_dir.path().join("quiet.log");

    let output = run_docweave(
        temp_dir.path(),
        &["--quiet", "--log-output", "file", "--log-file", log.to_str().unwrap(), "cache", "stats"],
    );
    assert!(output.status.success());
    assert!(!log.exists());
}
