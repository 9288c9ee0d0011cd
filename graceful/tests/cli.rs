//! The `graceful` runner binary end to end.
#![cfg(unix)]

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

const LINE_TIMEOUT: Duration = Duration::from_secs(15);

fn write_config(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("graceful.toml");
    std::fs::write(&path, body).expect("config written");
    path
}

fn runner(dir: &Path, config: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_graceful"));
    command
        .arg("run")
        .arg("-c")
        .arg(config)
        .current_dir(dir)
        .env("RUST_LOG", "graceful=debug")
        .env_remove("OTEL_EXPORTER_OTLP_ENDPOINT")
        .env_remove("OTEL_EXPORTER_OTLP_HEADERS")
        .env_remove("OTEL_EXPORTER_OTLP_PROTOCOL");
    command
}

fn stdout_lines(child: &mut Child) -> Receiver<String> {
    let stdout = child.stdout.take().expect("stdout piped");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn wait_for_line(lines: &Receiver<String>, needle: &str) {
    loop {
        let line = lines
            .recv_timeout(LINE_TIMEOUT)
            .unwrap_or_else(|_| panic!("runner never logged {needle:?}"));
        if line.contains(needle) {
            return;
        }
    }
}

fn send_sigint(child: &Child) {
    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("kill runs");
    assert!(status.success());
}

fn output_text(output: &Output) -> (String, String) {
    (
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    )
}

#[test]
fn second_sigint_forces_exit() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = write_config(
        &dir,
        r#"
        repeat_signal = "force-exit"
        shutdown_timeout_ms = 0

        [workload]
        workers = 1
        job_duration_ms = 30000
        idle_ms = 0
        "#,
    );
    let mut child = runner(dir.path(), &config)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("runner starts");
    let lines = stdout_lines(&mut child);

    wait_for_line(&lines, "job started");
    send_sigint(&child);
    wait_for_line(&lines, "termination signal received");
    send_sigint(&child);

    let status = child.wait().expect("runner exits");
    assert_eq!(status.code(), Some(130));
}

#[test]
fn trigger_after_drains_and_exits_cleanly() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = write_config(
        &dir,
        r"
        shutdown_timeout_ms = 10000

        [workload]
        workers = 2
        job_duration_ms = 50
        idle_ms = 10
        trigger_after_ms = 300
        ",
    );
    let output = runner(dir.path(), &config)
        .output()
        .expect("runner runs");
    let (stdout, stderr) = output_text(&output);

    assert!(output.status.success(), "stderr: {stderr}");
    assert!(stdout.contains("workload drained"));
    assert!(stdout.contains("all workers stopped"));
}

#[test]
fn missed_deadline_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = write_config(
        &dir,
        r"
        shutdown_timeout_ms = 200

        [workload]
        workers = 1
        job_duration_ms = 30000
        trigger_after_ms = 300
        ",
    );
    let output = runner(dir.path(), &config)
        .output()
        .expect("runner runs");
    let (stdout, stderr) = output_text(&output);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr.contains("shutdown did not complete"), "stderr: {stderr}");
    assert!(!stdout.contains("workload drained"));
}
