// SPDX-License-Identifier: Apache-2.0

//! `WorkerSupervisor` (C4): the `LifecycleHooks` implementation that lives
//! in the backend process, one per simulation record.

use crate::error::SupervisorError;
use crate::exit_code::ChildOutcome;
use crate::process::{SpawnArgs, SupervisedChild};
use crate::{logs, staging};
use nrp_core::env;
use nrp_core::{HookError, LifecycleHooks};
use nrp_storage::StorageClient;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// Excludes applied when cloning experiment files into the staged
/// directory (spec §4.4).
pub use nrp_storage::excludes::DEFAULT_EXCLUDES;

/// Invoked from the monitor task once the child has exited while we are not
/// already inside the termination protocol — `crashed` tells the owner which
/// trigger to fire on this simulation's FSM (`fail()` for an alien signal or
/// non-zero exit, `stop()` for a clean exit the worker chose on its own,
/// e.g. after the script completed) from whatever thread/task actually owns
/// it (spec §4.4, and the cyclic-reference note in spec §9: the supervisor
/// never calls back into the FSM directly).
pub type UnexpectedExitNotifier = Arc<dyn Fn(bool) + Send + Sync>;

pub struct WorkerSupervisorConfig {
    pub sim_id: String,
    pub experiment_id: String,
    pub token: String,
    pub main_script: String,
    pub experiment_configuration: String,
    pub verbose: bool,
    pub interpreter: String,
    pub entry_point: Option<PathBuf>,
}

pub struct WorkerSupervisor<S: StorageClient> {
    config: WorkerSupervisorConfig,
    storage: Arc<S>,
    on_unexpected_exit: UnexpectedExitNotifier,
    sim_dir: Mutex<Option<PathBuf>>,
    child: Mutex<Option<SupervisedChild>>,
}

impl<S: StorageClient + 'static> WorkerSupervisor<S> {
    pub fn new(config: WorkerSupervisorConfig, storage: Arc<S>, on_unexpected_exit: UnexpectedExitNotifier) -> Self {
        Self { config, storage, on_unexpected_exit, sim_dir: Mutex::new(None), child: Mutex::new(None) }
    }

    fn excludes() -> Vec<String> {
        DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect()
    }

    async fn stop_and_teardown(&self) {
        let child = self.child.lock().take();
        if let Some(mut child) = child {
            child.terminate(env::termination_grace()).await;
        }

        let sim_dir = self.sim_dir.lock().take();
        if let Some(sim_dir) = sim_dir {
            logs::persist_logs(
                self.storage.as_ref(),
                &self.config.token,
                &self.config.experiment_id,
                &self.config.sim_id,
                &sim_dir,
            )
            .await;
            staging::teardown_directory(&sim_dir);
        }
    }
}

#[async_trait::async_trait]
pub trait AsyncLifecycleHooks: Send + Sync {
    async fn initialize(&self) -> Result<(), SupervisorError>;
    async fn stop(&self) -> Result<(), SupervisorError>;
}

#[async_trait::async_trait]
impl<S: StorageClient + 'static> AsyncLifecycleHooks for WorkerSupervisor<S> {
    /// (a) stage a fresh directory and point the well-known symlink at it;
    /// (b) clone experiment files, excluding logs/caches; (c) spawn the
    /// worker; (d) hand exit handling to the monitor task started inside
    /// `SupervisedChild::spawn`.
    async fn initialize(&self) -> Result<(), SupervisorError> {
        let symlink = env::simulation_dir_symlink();
        let sim_dir = staging::stage_directory(&self.config.sim_id, &symlink)?;

        self.storage
            .clone_experiment(&self.config.token, &self.config.experiment_id, &sim_dir, &Self::excludes())
            .await?;

        let entry_point = self.config.entry_point.clone();
        let interpreter = self.config.interpreter.clone();
        let main_script = self.config.main_script.clone();
        let experiment_configuration = self.config.experiment_configuration.clone();
        let sim_id = self.config.sim_id.clone();
        let verbose = self.config.verbose;

        let notifier = self.on_unexpected_exit.clone();
        let terminating_flag_holder: Arc<Mutex<Option<Arc<std::sync::atomic::AtomicBool>>>> =
            Arc::new(Mutex::new(None));
        let terminating_flag_holder_for_closure = terminating_flag_holder.clone();

        let child = SupervisedChild::spawn(
            SpawnArgs {
                sim_dir: &sim_dir,
                sim_id: &sim_id,
                main_script: &main_script,
                experiment_config: &experiment_configuration,
                verbose,
                interpreter: &interpreter,
                entry_point: entry_point.as_deref(),
            },
            move |outcome| {
                let terminating = terminating_flag_holder_for_closure
                    .lock()
                    .as_ref()
                    .map(|f| f.load(std::sync::atomic::Ordering::SeqCst))
                    .unwrap_or(false);
                let crashed = match outcome {
                    ChildOutcome::Exited(code) => code.is_error(),
                    ChildOutcome::Signaled(_) => true,
                };
                // Firing a trigger while already terminating would deadlock
                // the termination path awaiting this very task (spec §4.4, B3).
                if !terminating {
                    notifier(crashed);
                }
            },
        )
        .map_err(SupervisorError::from)?;

        *terminating_flag_holder.lock() = Some(child.terminating_flag());
        *self.sim_dir.lock() = Some(sim_dir);
        *self.child.lock() = Some(child);
        Ok(())
    }

    /// Graceful-then-forced child termination, log upload, directory
    /// cleanup. Used directly by `stop` and, by delegation, by `fail`.
    async fn stop(&self) -> Result<(), SupervisorError> {
        self.stop_and_teardown().await;
        Ok(())
    }
}

/// Blocking adapter so `WorkerSupervisor` satisfies the synchronous
/// `LifecycleHooks` trait: each hook runs the corresponding async method to
/// completion via `block_in_place` + the ambient tokio runtime handle.
/// Requires a multi-threaded runtime (the backend binary uses one) since
/// `block_in_place` is unavailable on `current_thread`. `start`/`pause` are
/// no-ops (spec §4.4: "the worker's own FSM, driven over the broker,
/// handles them"); `fail` delegates to `stop`.
impl<S: StorageClient + 'static> LifecycleHooks for WorkerSupervisor<S> {
    fn initialize(&mut self) -> Result<(), HookError> {
        let handle = tokio::runtime::Handle::current();
        tokio::task::block_in_place(|| handle.block_on(AsyncLifecycleHooks::initialize(self)))
            .map_err(Into::into)
    }

    fn stop(&mut self) -> Result<(), HookError> {
        let handle = tokio::runtime::Handle::current();
        tokio::task::block_in_place(|| handle.block_on(AsyncLifecycleHooks::stop(self))).map_err(Into::into)
    }

    fn fail(&mut self) -> Result<(), HookError> {
        let handle = tokio::runtime::Handle::current();
        tokio::task::block_in_place(|| handle.block_on(AsyncLifecycleHooks::stop(self))).map_err(Into::into)
    }
}
