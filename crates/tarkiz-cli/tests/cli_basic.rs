//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary HOME so the
//! config file and database start fresh.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(home: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_tarkiz"))
        .args(args)
        .env("HOME", home)
        .env_remove("TARKIZ_ENV")
        .env_remove("TARKIZ_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

#[test]
fn test_times_json() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, stderr) = run_cli(home.path(), &["times", "--date", "2024-03-15", "--json"]);
    assert_eq!(code, 0, "times failed: {stderr}");

    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["date"], "2024-03-15");
    assert_eq!(parsed["method"], "mwl");
    let times = parsed["times"].as_array().unwrap();
    assert_eq!(times.len(), 6);
    assert_eq!(times[0]["name"], "fajr");
    assert_eq!(times[5]["name"], "isha");
}

#[test]
fn test_times_rejects_bad_date() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(home.path(), &["times", "--date", "15/03/2024"]);
    assert_eq!(code, 1);
    assert!(stderr.starts_with("error:"));
}

#[test]
fn test_methods_list() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["methods", "list"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("mwl"));
    assert!(stdout.contains("Umm al-Qura"));
}

#[test]
fn test_location_use_city() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["location", "use", "cairo"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Cairo, Egypt"));

    let key = "location.timezone_offset_minutes";
    let (code, stdout, _) = run_cli(home.path(), &["config", "get", key]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "120");

    let (code, _, _) = run_cli(home.path(), &["location", "use", "Atlantis"]);
    assert_eq!(code, 1);
}

#[test]
fn test_config_get_set() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(home.path(), &["config", "set", "session.strict_mode", "true"]);
    assert_eq!(code, 0, "config set failed: {stderr}");

    let (code, stdout, _) = run_cli(home.path(), &["config", "get", "session.strict_mode"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "true");

    let (code, _, stderr) = run_cli(home.path(), &["config", "get", "session.nope"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unknown key"));
}

#[test]
fn test_config_rejects_invalid_value() {
    let home = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(home.path(), &["config", "set", "location.latitude", "123"]);
    assert_eq!(code, 1);

    let (_, stdout, _) = run_cli(home.path(), &["config", "get", "location.latitude"]);
    assert_eq!(stdout.trim(), "40.7128");
}

#[test]
fn test_apps_toggle_persists() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["apps", "toggle", "youtube"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("youtube: blocked"));

    let (code, stdout, _) = run_cli(home.path(), &["apps", "list", "--json"]);
    assert_eq!(code, 0);
    let apps: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let youtube = apps
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["id"] == "youtube")
        .unwrap();
    assert_eq!(youtube["blocked"], true);

    let (code, _, _) = run_cli(home.path(), &["apps", "toggle", "myspace"]);
    assert_eq!(code, 1);
}

#[test]
fn test_session_status() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, stderr) = run_cli(home.path(), &["session", "status", "--json"]);
    assert_eq!(code, 0, "session status failed: {stderr}");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["mode"], "salah");
    assert_eq!(parsed["emergency_unlocks_left"], 5);
}

#[test]
fn test_session_reset_and_emergency_when_unlocked() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["session", "reset"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("session reset"));

    let (code, stdout, _) = run_cli(home.path(), &["session", "emergency"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("not locked"));
}

#[test]
fn test_stats_today() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["stats", "today", "--json"]);
    assert_eq!(code, 0);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["protected_minutes"], 0);
    assert_eq!(parsed["sessions"], 0);
}

#[test]
fn test_completions_bash() {
    let home = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run_cli(home.path(), &["completions", "bash"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("tarkiz"));
}
