//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary home directory
//! so config and timer state never leak between tests.

use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_pomocycle-cli"))
        .args(args)
        .env("HOME", home)
        .env_remove("POMOCYCLE_ENV")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_ok(home: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    stdout
}

/// Parse the last JSON document printed, skipping any events before it.
fn last_event(stdout: &str) -> Value {
    let values: Vec<Value> = serde_json::Deserializer::from_str(stdout)
        .into_iter::<Value>()
        .collect::<Result<_, _>>()
        .expect("stdout is not JSON");
    values.into_iter().last().expect("no JSON printed")
}

#[test]
fn test_status_on_fresh_home() {
    let home = TempDir::new().unwrap();
    let event = last_event(&run_ok(home.path(), &["timer", "status"]));
    assert_eq!(event["type"], "state_snapshot");
    assert_eq!(event["paused"], true);
    assert_eq!(event["segment_index"], 0);
    assert_eq!(event["segment_kind"], "work");
    assert_eq!(event["remaining_secs"], 1500);
    assert_eq!(event["pomo_count"], 4);
}

#[test]
fn test_start_pause_resume_persist_between_runs() {
    let home = TempDir::new().unwrap();
    let started = last_event(&run_ok(home.path(), &["timer", "start"]));
    assert_eq!(started["type"], "timer_started");

    let status = last_event(&run_ok(home.path(), &["timer", "status"]));
    assert_eq!(status["paused"], false);

    let paused = last_event(&run_ok(home.path(), &["timer", "pause"]));
    assert_eq!(paused["type"], "timer_paused");

    let again = last_event(&run_ok(home.path(), &["timer", "pause"]));
    assert_eq!(again["type"], "state_snapshot");
    assert_eq!(again["paused"], true);

    let resumed = last_event(&run_ok(home.path(), &["timer", "toggle"]));
    assert_eq!(resumed["type"], "timer_resumed");
}

#[test]
fn test_reset_returns_to_first_segment() {
    let home = TempDir::new().unwrap();
    run_ok(home.path(), &["timer", "start"]);
    let reset = last_event(&run_ok(home.path(), &["timer", "reset"]));
    assert_eq!(reset["type"], "timer_reset");

    let status = last_event(&run_ok(home.path(), &["timer", "status"]));
    assert_eq!(status["paused"], true);
    assert_eq!(status["segment_index"], 0);
    assert_eq!(status["remaining_secs"], 1500);
}

#[test]
fn test_resize_clamps_count() {
    let home = TempDir::new().unwrap();
    let resized = last_event(&run_ok(home.path(), &["timer", "resize", "9"]));
    assert_eq!(resized["type"], "sequence_resized");
    assert_eq!(resized["pomo_count"], 6);
    assert_eq!(resized["segments"], 13);

    let status = last_event(&run_ok(home.path(), &["timer", "status"]));
    assert_eq!(status["pomo_count"], 6);
}

#[test]
fn test_config_set_rebuilds_sequence() {
    let home = TempDir::new().unwrap();
    assert_eq!(run_ok(home.path(), &["config", "set", "schedule.work_secs", "600"]).trim(), "ok");
    assert_eq!(run_ok(home.path(), &["config", "get", "schedule.work_secs"]).trim(), "600");

    let status = last_event(&run_ok(home.path(), &["timer", "status"]));
    assert_eq!(status["remaining_secs"], 600);
}

#[test]
fn test_config_list_and_reset() {
    let home = TempDir::new().unwrap();
    run_ok(home.path(), &["config", "set", "schedule.pomo_count", "2"]);
    let listed: Value = serde_json::from_str(&run_ok(home.path(), &["config", "list"])).unwrap();
    assert_eq!(listed["schedule"]["pomo_count"], 2);

    run_ok(home.path(), &["config", "reset"]);
    assert_eq!(run_ok(home.path(), &["config", "get", "schedule.pomo_count"]).trim(), "4");
}

#[test]
fn test_config_unknown_key_fails() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(home.path(), &["config", "get", "schedule.nope"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown key"));

    let (_, stderr, code) = run_cli(home.path(), &["config", "set", "schedule.work_secs", "soon"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_config_help_lists_every_key() {
    let home = TempDir::new().unwrap();
    let help = run_ok(home.path(), &["config", "--help"]);
    for key in [
        "schedule.work_secs",
        "schedule.rest_secs",
        "schedule.long_break_secs",
        "schedule.pomo_count",
        "timer.segment_stagger_ms",
        "timer.auto_restart",
    ] {
        assert!(help.contains(key), "help is missing {key}");
        let value = run_ok(home.path(), &["config", "get", key]);
        assert!(!value.trim().is_empty(), "{key} has no value");
    }
}
