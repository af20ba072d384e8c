//! Binary-level checks that need neither a daemon nor the network.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use attendsync_core::config::{self, config_path_at};
use attendsync_core::{AppConfig, StoreKind};

fn attendsync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("attendsync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("ATTENDSYNC_API_URL")
        .env_remove("ATTENDSYNC_SPREADSHEET_ID");
    cmd
}

fn write_memory_config(home: &Path) {
    let mut config = AppConfig::default();
    config.source.base_url = "http://127.0.0.1:1".to_string();
    config.source.api_token = "token".to_string();
    config.store.kind = StoreKind::Memory;
    config::save_at(home, &config).expect("save config");
}

#[test]
fn init_writes_config_once() {
    let home = TempDir::new().expect("home");

    attendsync_cmd(home.path())
        .args([
            "init",
            "--api-url",
            "https://logs.example.com",
            "--api-token",
            "t0k3n",
            "--memory",
            "--schedule",
            "*/10 * * * *",
        ])
        .assert()
        .success()
        .stdout(contains("wrote"));

    let written = config::load_at(home.path()).expect("load");
    assert_eq!(written.source.base_url, "https://logs.example.com");
    assert_eq!(written.store.kind, StoreKind::Memory);
    assert_eq!(written.sync.schedule, "*/10 * * * *");
    assert!(written.sync.autostart);

    let before = fs::read_to_string(config_path_at(home.path())).expect("read");
    attendsync_cmd(home.path())
        .args(["init", "--api-url", "https://other.example.com"])
        .assert()
        .success()
        .stdout(contains("already exists"));
    let after = fs::read_to_string(config_path_at(home.path())).expect("read");
    assert_eq!(before, after);
}

#[test]
fn daemon_status_reports_not_running() {
    let home = TempDir::new().expect("home");

    let output = attendsync_cmd(home.path())
        .args(["daemon", "status"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["running"], false);
    assert!(value["socket"]
        .as_str()
        .expect("socket")
        .ends_with("daemon.sock"));

    attendsync_cmd(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(contains("not running"));
}

#[test]
fn commands_needing_the_daemon_fail_without_it() {
    let home = TempDir::new().expect("home");

    for args in [vec!["status"], vec!["sync"], vec!["test"], vec!["schedule", "status"]] {
        attendsync_cmd(home.path())
            .args(&args)
            .assert()
            .failure()
            .stderr(contains("daemon is not running"));
    }
}

#[test]
fn reversed_window_is_rejected_before_contacting_the_daemon() {
    let home = TempDir::new().expect("home");

    attendsync_cmd(home.path())
        .args([
            "sync",
            "--start",
            "2024-05-02 00:00:00",
            "--end",
            "2024-05-01T00:00:00Z",
        ])
        .assert()
        .failure()
        .stderr(contains("InvalidWindow"));

    attendsync_cmd(home.path())
        .args([
            "query",
            "--start",
            "2024-05-01T00:00:00Z",
            "--end",
            "2024-05-01T00:00:00Z",
        ])
        .assert()
        .failure()
        .stderr(contains("InvalidWindow"));
}

#[test]
fn malformed_times_and_half_windows_are_usage_errors() {
    let home = TempDir::new().expect("home");

    attendsync_cmd(home.path())
        .args(["sync", "--start", "yesterday", "--end", "2024-05-01T00:00:00Z"])
        .assert()
        .failure()
        .stderr(contains("invalid time"));

    attendsync_cmd(home.path())
        .args(["sync", "--start", "2024-05-01T00:00:00Z"])
        .assert()
        .failure()
        .stderr(contains("--end"));
}

#[test]
fn store_commands_work_on_the_memory_backend() {
    let home = TempDir::new().expect("home");
    write_memory_config(home.path());

    attendsync_cmd(home.path())
        .args(["store", "describe"])
        .assert()
        .success()
        .stdout(contains("in-memory table"));

    attendsync_cmd(home.path())
        .args(["store", "header"])
        .assert()
        .success()
        .stdout(contains("header row written"));

    attendsync_cmd(home.path())
        .args(["store", "clear"])
        .assert()
        .failure()
        .stderr(contains("--yes"));

    attendsync_cmd(home.path())
        .args(["store", "clear", "--yes"])
        .assert()
        .success()
        .stdout(contains("cleared"));
}

#[test]
fn store_commands_need_a_config_file() {
    let home = TempDir::new().expect("home");

    attendsync_cmd(home.path())
        .args(["store", "describe"])
        .assert()
        .failure()
        .stderr(contains("failed to load config"));
}
