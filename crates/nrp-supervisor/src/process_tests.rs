use crate::exit_code::{ChildOutcome, ServerExitCode};
use crate::process::{SpawnArgs, SupervisedChild};
use std::os::unix::fs::PermissionsExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn write_script(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[tokio::test]
async fn normal_exit_reports_server_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write_script(dir.path(), "entry.sh", "exit 3");

    let observed: Arc<Mutex<Option<ChildOutcome>>> = Arc::new(Mutex::new(None));
    let observed_writer = observed.clone();

    let _child = SupervisedChild::spawn(
        SpawnArgs {
            sim_dir: dir.path(),
            sim_id: "sim-1",
            main_script: "main_script.py",
            experiment_config: "simulation_config.json",
            verbose: false,
            interpreter: "/bin/sh",
            entry_point: Some(&entry),
        },
        move |outcome| {
            *observed_writer.lock().unwrap() = Some(outcome);
        },
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    match observed.lock().unwrap().take() {
        Some(ChildOutcome::Exited(code)) => assert_eq!(code, ServerExitCode::RunningError),
        other => panic!("expected Exited(RunningError), got {other:?}"),
    }
}

#[tokio::test]
async fn terminate_escalates_to_sigkill_when_term_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let entry = write_script(dir.path(), "stubborn.sh", "trap '' TERM\nsleep 5");

    let reaped = Arc::new(AtomicBool::new(false));
    let reaped_writer = reaped.clone();

    let mut child = SupervisedChild::spawn(
        SpawnArgs {
            sim_dir: dir.path(),
            sim_id: "sim-2",
            main_script: "main_script.py",
            experiment_config: "simulation_config.json",
            verbose: false,
            interpreter: "/bin/sh",
            entry_point: Some(&entry),
        },
        move |_outcome| {
            reaped_writer.store(true, Ordering::SeqCst);
        },
    )
    .unwrap();

    child.terminate(Duration::from_millis(150)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!child.is_alive());
    assert!(reaped.load(Ordering::SeqCst));
}

#[test]
fn server_exit_code_maps_known_values() {
    assert_eq!(ServerExitCode::from_code(0), ServerExitCode::NoError);
    assert_eq!(ServerExitCode::from_code(1), ServerExitCode::InitError);
    assert_eq!(ServerExitCode::from_code(2), ServerExitCode::ShutdownError);
    assert_eq!(ServerExitCode::from_code(3), ServerExitCode::RunningError);
    assert!(!ServerExitCode::NoError.is_error());
    assert!(ServerExitCode::InitError.is_error());
}
