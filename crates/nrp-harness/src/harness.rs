// SPDX-License-Identifier: Apache-2.0

//! `ScriptHarness` (C5): the worker-side `LifecycleHooks` implementation
//! that loads the user's main script, wires up the `EngineWrapper`, and
//! drives the executor thread and the 1 Hz status ticker.
//!
//! Holds only a snapshot of the current lifecycle state (`state`), not the
//! `Lifecycle` itself, to avoid the record/supervisor-style ownership
//! cycle spec §9 calls out: the owning binary (`nrp-simulation-server`)
//! updates the snapshot from the FSM's change listener and reacts to
//! `trigger_callback` by firing `completed`/`failed` on its own FSM.

use crate::config::{self, ExperimentConfig};
use crate::engine::EngineClient;
use crate::executor::{self, ExecutorResult, ExecutorTrigger, ScriptLogger};
use crate::messages::{ErrorKind, ErrorMessage, StatusMessage};
use crate::wrapper::{EngineWrapper, PauseGate, StopFlag};
use nrp_core::{HookError, LifecycleHooks, LifecycleState};
use nrp_sync::{runtime_error_topic, status_topic, Broker};
use parking_lot::Mutex as SyncMutex;
use rhai::AST;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle as TokioJoinHandle;

/// Which phase a fatal error occurred in — read by the worker binary to
/// choose its own process exit code (spec §4.4's `ServerExitCode`, which
/// this crate doesn't otherwise know about).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePhase {
    #[default]
    None,
    Init,
    Running,
    Shutdown,
}

pub struct ScriptHarnessConfig {
    pub sim_id: String,
    pub script_path: PathBuf,
    pub experiment_config_path: PathBuf,
    pub script_log_path: PathBuf,
    pub topic_prefix: String,
}

struct Shared<E: EngineClient> {
    ast: SyncMutex<Option<AST>>,
    source: SyncMutex<String>,
    logger: SyncMutex<Option<ScriptLogger>>,
    wrapper: SyncMutex<Option<EngineWrapper<E>>>,
    executor_thread: SyncMutex<Option<std::thread::JoinHandle<()>>>,
    paused: PauseGate,
    stopped: StopFlag,
    state: Arc<SyncMutex<LifecycleState>>,
    failure_phase: SyncMutex<FailurePhase>,
    shutdown_called: AtomicBool,
}

/// The worker-side `LifecycleHooks` implementation (C5).
pub struct ScriptHarness<E: EngineClient + 'static, B: Broker + 'static> {
    config: ScriptHarnessConfig,
    engine_client: Arc<SyncMutex<E>>,
    broker: Arc<AsyncMutex<B>>,
    runtime: Handle,
    trigger_callback: Arc<dyn Fn(ExecutorTrigger) + Send + Sync>,
    status_ticker: SyncMutex<Option<TokioJoinHandle<()>>>,
    shared: Arc<Shared<E>>,
}

impl<E: EngineClient + 'static, B: Broker + 'static> ScriptHarness<E, B> {
    pub fn new(
        config: ScriptHarnessConfig,
        engine_client: E,
        broker: B,
        state: Arc<SyncMutex<LifecycleState>>,
        trigger_callback: Arc<dyn Fn(ExecutorTrigger) + Send + Sync>,
    ) -> Self {
        Self {
            config,
            engine_client: Arc::new(SyncMutex::new(engine_client)),
            broker: Arc::new(AsyncMutex::new(broker)),
            runtime: Handle::current(),
            trigger_callback,
            status_ticker: SyncMutex::new(None),
            shared: Arc::new(Shared {
                ast: SyncMutex::new(None),
                source: SyncMutex::new(String::new()),
                logger: SyncMutex::new(None),
                wrapper: SyncMutex::new(None),
                executor_thread: SyncMutex::new(None),
                paused: PauseGate::new(),
                stopped: StopFlag::new(),
                state,
                failure_phase: SyncMutex::new(FailurePhase::None),
                shutdown_called: AtomicBool::new(false),
            }),
        }
    }

    pub fn failure_phase(&self) -> FailurePhase {
        *self.shared.failure_phase.lock()
    }

    /// Publish one final status message after the terminal-state grace
    /// period (spec §4.5's status timer note). Safe to call from the
    /// worker binary once `Lifecycle::take_shutdown_grace` fires.
    pub async fn publish_final_status(&self) {
        self.publish_status_once().await;
    }

    async fn publish_status_once(&self) {
        let Some(wrapper) = self.shared.wrapper.lock().clone() else { return };
        let message = StatusMessage {
            real_time: wrapper.real_time(),
            simulation_time: wrapper.simulation_time(),
            state: *self.shared.state.lock(),
            simulation_time_left: wrapper.simulation_time_remaining(),
        };
        self.publish_raw(&status_topic(&self.config.topic_prefix, &self.config.sim_id), &message).await;
    }

    async fn publish_error(&self, message: &ErrorMessage) {
        self.publish_raw(&runtime_error_topic(&self.config.topic_prefix, &self.config.sim_id), message).await;
    }

    async fn publish_raw(&self, topic: &str, payload: &impl serde::Serialize) {
        let Ok(bytes) = serde_json::to_vec(payload) else { return };
        let broker = self.broker.lock().await;
        if let Err(error) = broker.publish(topic, &bytes, false).await {
            tracing::warn!(%error, %topic, "failed to publish harness observer message");
        }
    }

    fn spawn_status_ticker(&self) {
        let broker = self.broker.clone();
        let shared = self.shared.clone();
        let topic = status_topic(&self.config.topic_prefix, &self.config.sim_id);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                let Some(wrapper) = shared.wrapper.lock().clone() else { continue };
                let message = StatusMessage {
                    real_time: wrapper.real_time(),
                    simulation_time: wrapper.simulation_time(),
                    state: *shared.state.lock(),
                    simulation_time_left: wrapper.simulation_time_remaining(),
                };
                let Ok(bytes) = serde_json::to_vec(&message) else { continue };
                let guard = broker.lock().await;
                let _ = guard.publish(&topic, &bytes, false).await;
            }
        });
        *self.status_ticker.lock() = Some(handle);
    }

    async fn initialize_async(&self) -> Result<(), HookError> {
        if let Err(error) = self.broker.lock().await.connect().await {
            tracing::warn!(%error, "harness observer broker failed to connect");
        }

        let raw_config = tokio::fs::read_to_string(&self.config.experiment_config_path)
            .await
            .map_err(|e| HookError::new(format!("failed to read experiment config: {e}")))?;
        let experiment_config: ExperimentConfig = config::parse_and_validate(&raw_config).map_err(|e| {
            *self.shared.failure_phase.lock() = FailurePhase::Init;
            HookError::new(e.to_string())
        })?;

        let source = tokio::fs::read_to_string(&self.config.script_path)
            .await
            .map_err(|e| HookError::new(format!("failed to read main script: {e}")))?;

        let rhai_engine = rhai::Engine::new();
        let ast = match executor::compile(&rhai_engine, &source) {
            Ok(ast) => ast,
            Err(failure) => {
                *self.shared.failure_phase.lock() = FailurePhase::Init;
                let message = ErrorMessage {
                    sim_id: self.config.sim_id.clone(),
                    msg: failure.message.clone(),
                    error_type: ErrorKind::Compile,
                    file_name: self.config.script_path.display().to_string(),
                    line_number: failure.line_number,
                    offset: failure.offset,
                    line_text: failure.line_text.clone(),
                };
                self.publish_error(&message).await;
                return Err(HookError::new(failure.message));
            }
        };

        let logger = ScriptLogger::open(&self.config.script_log_path)
            .map_err(|e| HookError::new(format!("failed to open script log: {e}")))?;

        let engine_client = self.engine_client.clone();
        let runtime = self.runtime.clone();
        let init_result = tokio::task::block_in_place(move || {
            let mut guard = engine_client.lock();
            runtime.block_on(guard.initialize())
        });
        if let Err(error) = init_result {
            *self.shared.failure_phase.lock() = FailurePhase::Init;
            let message = ErrorMessage::without_position(
                &self.config.sim_id,
                &self.config.script_path.display().to_string(),
                ErrorKind::Loading,
                error.to_string(),
            );
            self.publish_error(&message).await;
            return Err(HookError::new(error.to_string()));
        }

        let wrapper = EngineWrapper::new(
            self.engine_client.clone(),
            self.runtime.clone(),
            self.shared.paused.clone(),
            self.shared.stopped.clone(),
            experiment_config.max_timesteps(),
            experiment_config.simulation_timestep,
        );

        *self.shared.ast.lock() = Some(ast);
        *self.shared.source.lock() = source;
        *self.shared.logger.lock() = Some(logger);
        *self.shared.wrapper.lock() = Some(wrapper);

        self.spawn_status_ticker();
        Ok(())
    }

    fn ensure_executor_started(&self) -> Result<(), HookError> {
        let mut thread_guard = self.shared.executor_thread.lock();
        if let Some(handle) = thread_guard.as_ref() {
            if !handle.is_finished() {
                return Ok(());
            }
        }

        let ast = self.shared.ast.lock().clone().ok_or_else(|| HookError::new("script was never compiled"))?;
        let source = self.shared.source.lock().clone();
        let wrapper = self.shared.wrapper.lock().clone().ok_or_else(|| HookError::new("engine wrapper not ready"))?;
        let logger = self
            .shared
            .logger
            .lock()
            .clone()
            .ok_or_else(|| HookError::new("script logger not ready"))?;

        let shared = self.shared.clone();
        let broker = self.broker.clone();
        let runtime = self.runtime.clone();
        let callback = self.trigger_callback.clone();
        let sim_id = self.config.sim_id.clone();
        let script_path = self.config.script_path.display().to_string();
        let topic_prefix = self.config.topic_prefix.clone();

        let on_result = Arc::new(move |result: ExecutorResult| {
            if let Some(failure) = &result.error {
                *shared.failure_phase.lock() = FailurePhase::Running;
                let message = ErrorMessage {
                    sim_id: sim_id.clone(),
                    msg: failure.message.clone(),
                    error_type: failure.kind,
                    file_name: script_path.clone(),
                    line_number: failure.line_number,
                    offset: failure.offset,
                    line_text: failure.line_text.clone(),
                };
                let topic = runtime_error_topic(&topic_prefix, &sim_id);
                let broker = broker.clone();
                runtime.block_on(async move {
                    if let Ok(bytes) = serde_json::to_vec(&message) {
                        let guard = broker.lock().await;
                        let _ = guard.publish(&topic, &bytes, false).await;
                    }
                });
            }
            if let Some(trigger) = result.trigger {
                callback(trigger);
            }
        });

        let handle = executor::spawn(source, ast, wrapper, logger, on_result)
            .map_err(|e| HookError::new(format!("failed to spawn MainScriptThread: {e}")))?;
        *thread_guard = Some(handle);
        Ok(())
    }
}

impl<E: EngineClient + 'static, B: Broker + 'static> LifecycleHooks for ScriptHarness<E, B> {
    /// Loads the script, validates the experiment config, and initializes
    /// the engine client (spec §4.5's `initialize`).
    fn initialize(&mut self) -> Result<(), HookError> {
        let handle = self.runtime.clone();
        tokio::task::block_in_place(|| handle.block_on(self.initialize_async()))
    }

    /// Unpauses the gate and starts the executor thread if it is absent or
    /// has died (spec §4.5's `start`).
    fn start(&mut self) -> Result<(), HookError> {
        self.shared.paused.set();
        self.ensure_executor_started()
    }

    /// Clears the pause gate; any `run_loop` in flight blocks on its next
    /// entry (spec §4.5's `pause`).
    fn pause(&mut self) -> Result<(), HookError> {
        self.shared.paused.clear();
        Ok(())
    }

    /// Sets the one-shot stop flag and joins the executor thread with a
    /// bounded wait; unpauses first so a paused script observes the stop
    /// request instead of hanging forever (spec §4.5's `stop`).
    fn stop(&mut self) -> Result<(), HookError> {
        self.shared.stopped.set();
        self.shared.paused.set();

        let handle = match self.shared.executor_thread.lock().take() {
            Some(handle) => handle,
            None => return Ok(()),
        };

        let deadline = std::time::Instant::now() + nrp_core::env::executor_join_timeout();
        while !handle.is_finished() {
            if std::time::Instant::now() >= deadline {
                tracing::warn!("MainScriptThread did not exit within the join timeout");
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        if let Err(_panic) = handle.join() {
            tracing::warn!("MainScriptThread panicked");
        }
        Ok(())
    }

    fn fail(&mut self) -> Result<(), HookError> {
        self.stop()
    }

    /// Calls the engine client's `shutdown` exactly once (spec §4.5's
    /// `shutdown`), and stops the status ticker.
    fn shutdown(&mut self) {
        if self.shared.shutdown_called.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(ticker) = self.status_ticker.lock().take() {
            ticker.abort();
        }
        let engine = self.engine_client.clone();
        let handle = self.runtime.clone();
        tokio::task::block_in_place(|| {
            let mut guard = engine.lock();
            if let Err(error) = handle.block_on(guard.shutdown()) {
                tracing::warn!(%error, "engine client shutdown failed");
            }
        });
    }
}
