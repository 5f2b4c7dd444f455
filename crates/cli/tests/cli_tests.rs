//! CLI integration tests

use std::process::{Command, Output};

fn drlctl(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_drlctl"))
        .args(args)
        .env_remove("DRL_API_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = drlctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("DRL Scheduler"), "Should show app name");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("rewards"), "Should show rewards command");
    assert!(stdout.contains("health"), "Should show health command");
    assert!(stdout.contains("prioritize"), "Should show prioritize command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = drlctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("drlctl"), "Should show binary name");
}

/// Test rewards subcommand help
#[test]
fn test_rewards_help() {
    let output = drlctl(&["rewards", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Rewards help should succeed");
    assert!(stdout.contains("--service"), "Should show service option");
    assert!(stdout.contains("--role"), "Should show role option");
}

/// Test prioritize subcommand help
#[test]
fn test_prioritize_help() {
    let output = drlctl(&["prioritize", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Prioritize help should succeed");
    assert!(stdout.contains("--namespace"), "Should show namespace option");
    assert!(stdout.contains("--service"), "Should show service option");
    assert!(stdout.contains("<NODES>"), "Should show nodes argument");
}

/// Test format option in global help
#[test]
fn test_format_option() {
    let output = drlctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
}

/// Test API URL option in global help
#[test]
fn test_api_url_option() {
    let output = drlctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("DRL_API_URL"), "Should show env var");
}

/// Test invalid command
#[test]
fn test_invalid_command() {
    let output = drlctl(&["invalid-command"]);

    assert!(!output.status.success(), "Invalid command should fail");
}

/// Test missing required argument
#[test]
fn test_prioritize_requires_labels() {
    let output = drlctl(&["prioritize", "web-0", "node-a"]);

    assert!(
        !output.status.success(),
        "Prioritize without labels should fail"
    );
}

/// Test unreachable API
#[test]
fn test_unreachable_api_fails() {
    let output = drlctl(&["--api-url", "http://127.0.0.1:1", "status"]);

    assert!(!output.status.success(), "Unreachable API should fail");
}
