//! CLI arg handling for the hostpulse_agent binary.
use std::process::Command;
use std::time::{Duration, Instant};

use assert_cmd::prelude::*;

fn agent(dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("hostpulse_agent").expect("agent binary");
    // keep a stray .env or inherited settings out of the run
    cmd.current_dir(dir).env("RUST_LOG", "hostpulse_agent=warn");
    cmd
}

#[test]
fn help_prints_usage_and_exits() {
    let dir = tempfile::tempdir().unwrap();
    let out = agent(dir.path()).arg("--help").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Usage:"), "stdout: {stdout}");
    assert!(stdout.contains("--port"));
}

#[test]
fn unknown_flag_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    agent(dir.path()).arg("--enableSSL").assert().failure();
    agent(dir.path()).args(["--port", "not-a-port"]).assert().failure();
}

#[test]
fn zero_interval_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    agent(dir.path())
        .env("HOSTPULSE_COLLECTION_INTERVAL", "0")
        .assert()
        .failure();
}

#[test]
fn port_and_db_flags_start_the_agent() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("nested").join("metrics.db");

    let mut child = agent(dir.path())
        .args(["-p", "0", "--db"])
        .arg(&db)
        .spawn()
        .expect("spawn agent");

    // Poll for the database file instead of a fixed sleep
    let deadline = Instant::now() + Duration::from_secs(10);
    while !db.exists() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    let created = db.exists();
    let _ = child.kill();
    let _ = child.wait();
    assert!(created, "agent never created {}", db.display());
}
