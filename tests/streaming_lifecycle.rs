//! Integration tests for tracked and streaming launches.
//!
//! These cover the supervisor's lifecycle guarantees: identifiers appear in
//! the active set on launch and disappear on exit or termination, stream
//! lines arrive in order, and every stream ends with exactly one terminal
//! event.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rcman::core::{Flags, ProcessKind, RcloneRunner, StreamEvent, TransferMethod};
use rcman::error::RunnerError;

fn fake_rclone(dir: &Path, script: &str) -> PathBuf {
    let path = dir.join("rclone");
    std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn runner_with(script: &str) -> (tempfile::TempDir, RcloneRunner) {
    let temp = tempfile::tempdir().unwrap();
    let exe = fake_rclone(temp.path(), script);
    (temp, RcloneRunner::new(Some(exe)))
}

async fn wait_until_inactive(runner: &RcloneRunner, id: &str) {
    for _ in 0..100 {
        if !runner.is_active(id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{id} still active after 5s");
}

async fn collect(mut rx: tokio::sync::mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn lines_arrive_in_order_then_exactly_one_terminal() {
    let (_temp, runner) = runner_with("echo one\necho two\necho three\nexit 0");

    let (id, rx) = runner
        .launch_streaming(ProcessKind::Transfer, &[])
        .unwrap();
    assert!(id.starts_with("transfer_"));

    let events = collect(rx).await;

    assert_eq!(
        events,
        vec![
            StreamEvent::Line("one".to_string()),
            StreamEvent::Line("two".to_string()),
            StreamEvent::Line("three".to_string()),
            StreamEvent::Done(0),
        ]
    );
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    wait_until_inactive(&runner, &id).await;
}

#[tokio::test]
async fn nonzero_exit_code_reaches_the_terminal_event() {
    let (_temp, runner) = runner_with("echo failing 1>&2\nexit 3");

    let (_id, rx) = runner
        .launch_streaming(ProcessKind::Transfer, &[])
        .unwrap();
    let events = collect(rx).await;

    assert_eq!(events.last(), Some(&StreamEvent::Done(3)));
    assert!(events.contains(&StreamEvent::Line("failing".to_string())));
}

#[tokio::test]
async fn blank_lines_never_reach_the_sink() {
    let (_temp, runner) = runner_with("echo ''\necho '   '\necho data\nexit 0");

    let (_id, rx) = runner
        .launch_streaming(ProcessKind::Transfer, &[])
        .unwrap();
    let events = collect(rx).await;

    assert_eq!(
        events,
        vec![StreamEvent::Line("data".to_string()), StreamEvent::Done(0)]
    );
}

#[tokio::test]
async fn carriage_return_separated_output_splits_into_lines() {
    let (_temp, runner) = runner_with("printf 'first\\rsecond\\nthird\\n'");

    let (_id, rx) = runner
        .launch_streaming(ProcessKind::Transfer, &[])
        .unwrap();
    let events = collect(rx).await;

    assert_eq!(
        events,
        vec![
            StreamEvent::Line("first".to_string()),
            StreamEvent::Line("second".to_string()),
            StreamEvent::Line("third".to_string()),
            StreamEvent::Done(0),
        ]
    );
}

#[tokio::test]
async fn streaming_process_is_active_until_terminated() {
    let (_temp, runner) = runner_with("sleep 30");

    let (id, rx) = runner
        .launch_streaming(ProcessKind::Transfer, &[])
        .unwrap();
    assert!(runner.is_active(&id));

    runner.terminate(&id).unwrap();

    // Table entry is gone immediately; a second terminate is NotFound.
    assert!(!runner.is_active(&id));
    assert!(matches!(
        runner.terminate(&id),
        Err(RunnerError::NotFound(_))
    ));

    // The killed child still produces exactly one terminal event.
    let events = collect(rx).await;
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(events.last().unwrap().is_terminal());
}

#[tokio::test]
async fn tracked_process_registers_and_deregisters_on_exit() {
    let (_temp, runner) = runner_with("sleep 1");

    let id = runner.launch_tracked(ProcessKind::Mount, &[]).unwrap();
    assert!(id.starts_with("mount_"));
    assert!(runner.is_active(&id));
    // The registered command is the full argv, executable first.
    let command = runner.command_of(&id).unwrap();
    assert!(command[0].ends_with("rclone"));

    wait_until_inactive(&runner, &id).await;
}

#[tokio::test]
async fn tracked_process_can_be_terminated() {
    let (_temp, runner) = runner_with("sleep 30");

    let id = runner.launch_tracked(ProcessKind::Ncdu, &[]).unwrap();
    assert!(id.starts_with("ncdu_"));

    runner.terminate(&id).unwrap();
    assert!(!runner.is_active(&id));
}

#[tokio::test]
async fn transfer_appends_progress_flag() {
    // The fake rclone echoes its argv, so the first line shows the
    // assembled command.
    let (_temp, runner) = runner_with("echo \"$@\"");

    let mut flags = Flags::new();
    flags.set("dry-run", true);
    let (_id, rx) = runner
        .transfer(TransferMethod::Copy, "src", "dst", &flags)
        .unwrap();
    let events = collect(rx).await;

    match &events[0] {
        StreamEvent::Line(line) => {
            assert_eq!(line, "copy src dst --dry-run --progress");
        }
        other => panic!("expected argv line, got {other:?}"),
    }
}

#[tokio::test]
async fn explicit_progress_flag_is_not_duplicated() {
    let (_temp, runner) = runner_with("echo \"$@\"");

    let mut flags = Flags::new();
    flags.set("progress", true);
    let (_id, rx) = runner
        .transfer(TransferMethod::Sync, "a", "b", &flags)
        .unwrap();
    let events = collect(rx).await;

    match &events[0] {
        StreamEvent::Line(line) => {
            assert_eq!(line.matches("--progress").count(), 1);
        }
        other => panic!("expected argv line, got {other:?}"),
    }
}

#[tokio::test]
async fn unmount_of_unknown_id_falls_back_to_platform_command() {
    let (temp, runner) = runner_with("exit 0");

    // No tracked process and nothing mounted at the path, so the platform
    // unmount command itself reports failure. The call must not panic.
    let result = runner
        .unmount(&temp.path().join("not-a-mount"), Some("mount_19700101000000"))
        .await;
    assert!(result.is_err());
}
