// SPDX-License-Identifier: Apache-2.0

//! Spawning and monitoring the worker child process (spec §4.4). Grounded
//! on the same spawn-then-reap shape as a local process adapter: spawn,
//! hand the child to a dedicated task that blocks on its exit, and react
//! to what that task observes.

use crate::error::SupervisorError;
use crate::exit_code::{ChildOutcome, ServerExitCode};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinHandle;

pub struct SpawnArgs<'a> {
    pub sim_dir: &'a Path,
    pub sim_id: &'a str,
    pub main_script: &'a str,
    pub experiment_config: &'a str,
    pub verbose: bool,
    pub interpreter: &'a str,
    /// An interpreter argument inserted before the `--dir ...` flags, e.g. a
    /// `.py` entry-point script run by `interpreter`. `None` when
    /// `interpreter` is itself the program to run directly (a compiled
    /// worker binary has no separate entry-point file).
    pub entry_point: Option<&'a Path>,
}

/// Handle to a running (or just-reaped) worker child. Shared between the
/// supervisor (which may send termination signals) and the monitor task
/// (which owns the wait loop).
pub struct SupervisedChild {
    pid: Arc<AtomicU32>,
    terminating: Arc<AtomicBool>,
    monitor: Option<JoinHandle<()>>,
}

impl SupervisedChild {
    /// Spawn the worker and start its monitor task. `on_outcome` is invoked
    /// exactly once, from the monitor task, once the child has been reaped.
    pub fn spawn(
        args: SpawnArgs<'_>,
        on_outcome: impl FnOnce(ChildOutcome) + Send + 'static,
    ) -> Result<Self, SupervisorError> {
        let log_path = args.sim_dir.join(format!("simulation_{}.log", args.sim_id));
        let log_file = std::fs::File::create(&log_path)?;
        let log_file_err = log_file.try_clone()?;

        let mut command = Command::new(args.interpreter);
        if let Some(entry_point) = args.entry_point {
            command.arg(entry_point);
        }
        command
            .arg("--dir")
            .arg(args.sim_dir)
            .arg("--id")
            .arg(args.sim_id)
            .arg("--script")
            .arg(args.main_script)
            .arg("--config")
            .arg(args.experiment_config)
            .current_dir(args.sim_dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::from(log_file))
            .stderr(std::process::Stdio::from(log_file_err));
        if args.verbose {
            command.arg("--verbose");
        }

        let mut child = command
            .spawn()
            .map_err(|e| SupervisorError::Server(format!("failed to spawn worker: {e}")))?;
        let pid = child.id().ok_or_else(|| SupervisorError::Server("worker exited before pid was observed".into()))?;

        let pid_cell = Arc::new(AtomicU32::new(pid));
        let terminating = Arc::new(AtomicBool::new(false));

        let monitor_pid = pid_cell.clone();
        let monitor = tokio::spawn(async move {
            let outcome = match child.wait().await {
                Ok(status) => classify(status),
                Err(error) => {
                    tracing::error!(%error, "failed to wait on worker process");
                    ChildOutcome::Exited(ServerExitCode::Other(-1))
                }
            };
            monitor_pid.store(0, Ordering::SeqCst);
            on_outcome(outcome);
        });

        Ok(Self { pid: pid_cell, terminating, monitor: Some(monitor) })
    }

    pub fn is_alive(&self) -> bool {
        self.pid.load(Ordering::SeqCst) != 0
    }

    pub fn terminating_flag(&self) -> Arc<AtomicBool> {
        self.terminating.clone()
    }

    /// The graceful-then-forced termination protocol (spec §4.4's `stop`
    /// hook): polite signal, wait up to `grace`, escalate to a forced kill,
    /// wait again. Benign if the process is already gone. "Gone" is
    /// observed via `pid` reaching zero, which the monitor task clears the
    /// instant `wait()` returns — polling it rather than consuming the
    /// `JoinHandle` lets this be called twice (once per escalation step).
    pub async fn terminate(&mut self, grace: Duration) {
        self.terminating.store(true, Ordering::SeqCst);
        if !self.is_alive() {
            return;
        }

        let _ = self.send_signal(Signal::SIGTERM);
        if self.wait_gone_within(grace).await {
            return;
        }
        let _ = self.send_signal(Signal::SIGKILL);
        self.wait_gone_within(grace).await;
    }

    fn send_signal(&self, signal: Signal) -> Result<(), ()> {
        let pid = self.pid.load(Ordering::SeqCst);
        if pid == 0 {
            return Ok(()); // already reaped; race with the monitor is benign
        }
        match signal::kill(Pid::from_raw(pid as i32), signal) {
            Ok(()) => Ok(()),
            Err(nix::errno::Errno::ESRCH) => Ok(()), // already gone
            Err(error) => {
                tracing::warn!(%error, ?signal, "failed to signal worker process");
                Err(())
            }
        }
    }

    async fn wait_gone_within(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.is_alive() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }
}

impl Drop for SupervisedChild {
    fn drop(&mut self) {
        if let Some(handle) = self.monitor.take() {
            handle.abort();
        }
    }
}

fn classify(status: std::process::ExitStatus) -> ChildOutcome {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ChildOutcome::Signaled(signal);
        }
    }
    ChildOutcome::Exited(ServerExitCode::from_code(status.code().unwrap_or(-1)))
}
