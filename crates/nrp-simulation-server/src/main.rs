// SPDX-License-Identifier: Apache-2.0

//! The worker process: hosts one simulation's `ScriptHarness`, drives it
//! through a replicated lifecycle FSM mirrored over the broker, and exits
//! with a `ServerExitCode` reflecting how the run ended.

mod engine_stub;

use clap::Parser;
use engine_stub::StubEngineClient;
use nrp_core::{env, Lifecycle, LifecycleState, LifecycleTrigger, ServerExitCode};
use nrp_harness::{EngineClientArgs, ExecutorTrigger, FailurePhase, ScriptHarness, ScriptHarnessConfig};
use nrp_sync::{lifecycle_topic, MqttBroker, Synchronizer};
use parking_lot::Mutex as SyncMutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// Destination states the worker propagates onto the broker. Mirrors the
/// original lifecycle's `propagated_destinations = ['completed', 'failed']`
/// — everything else (`started`, `paused`) is driven by the backend and
/// applied here silently.
fn propagated_destinations() -> HashSet<LifecycleState> {
    [LifecycleState::Completed, LifecycleState::Failed].into_iter().collect()
}

#[derive(Parser, Debug)]
#[command(name = "nrp-simulation-server")]
struct Args {
    /// The staged simulation directory (also the process's working directory).
    #[arg(long)]
    dir: PathBuf,
    #[arg(long)]
    id: String,
    /// Main script file name, relative to `dir`.
    #[arg(long)]
    script: String,
    /// Experiment configuration file name, relative to `dir`.
    #[arg(long)]
    config: String,
    #[arg(long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn script_log_path(dir: &std::path::Path, script: &str, sim_id: &str) -> PathBuf {
    let stem = std::path::Path::new(script).file_stem().and_then(|s| s.to_str()).unwrap_or(script);
    dir.join(format!("{stem}_{sim_id}.log"))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let code = run(args).await;
    tracing::info!(?code, "worker exiting");
    std::process::exit(code.as_i32());
}

async fn run(args: Args) -> ServerExitCode {
    let sim_id = args.id.clone();
    let node_id = format!("worker-{sim_id}");
    let topic_prefix = env::broker_topic_prefix();
    let topic = lifecycle_topic(&topic_prefix, &sim_id);
    let broker_address = env::mqtt_broker_address();

    let mut sync_in = Synchronizer::new(
        node_id.clone(),
        topic.clone(),
        HashSet::new(),
        MqttBroker::new(format!("{node_id}-in"), broker_address.clone()),
    );
    if let Err(error) = sync_in.connect(env::clear_synchronization_topic()).await {
        tracing::error!(%error, "failed to connect inbound lifecycle synchronizer");
        return ServerExitCode::InitError;
    }

    let mut sync_out = Synchronizer::new(
        node_id.clone(),
        topic.clone(),
        propagated_destinations(),
        MqttBroker::new(format!("{node_id}-out"), broker_address.clone()),
    );
    if let Err(error) = sync_out.connect_publisher().await {
        tracing::error!(%error, "failed to connect outbound lifecycle synchronizer");
        return ServerExitCode::InitError;
    }

    let observer_broker = MqttBroker::new(format!("{node_id}-observer"), broker_address.clone());

    let script_path = args.dir.join(&args.script);
    let experiment_config_path = args.dir.join(&args.config);
    let log_path = script_log_path(&args.dir, &args.script, &sim_id);

    let harness_config = ScriptHarnessConfig {
        sim_id: sim_id.clone(),
        script_path,
        experiment_config_path: experiment_config_path.clone(),
        script_log_path: log_path,
        topic_prefix: topic_prefix.clone(),
    };

    let engine_client = StubEngineClient::new(EngineClientArgs {
        address: "localhost:5345".to_string(),
        config_file: experiment_config_path,
        sim_id: sim_id.clone(),
        broker_address: Some(broker_address),
    });

    let state = Arc::new(SyncMutex::new(LifecycleState::INITIAL));
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<LifecycleTrigger>();
    let trigger_callback = {
        let cmd_tx = cmd_tx.clone();
        Arc::new(move |trigger: ExecutorTrigger| {
            let trigger = match trigger {
                ExecutorTrigger::Completed => LifecycleTrigger::Completed,
                ExecutorTrigger::Failed => LifecycleTrigger::Failed,
            };
            let _ = cmd_tx.send(trigger);
        })
    };

    let harness = ScriptHarness::new(harness_config, engine_client, observer_broker, state.clone(), trigger_callback);
    let mut fsm = Lifecycle::new(harness);

    let (change_tx, mut change_rx) = mpsc::unbounded_channel();
    fsm.set_on_change({
        let state = state.clone();
        Box::new(move |change: &nrp_core::StateChange| {
            *state.lock() = change.destination;
            let _ = change_tx.send(*change);
        })
    });

    let publisher = tokio::spawn(async move {
        while let Some(change) = change_rx.recv().await {
            if let Err(error) = sync_out.publish_outgoing(&change).await {
                tracing::warn!(%error, "failed to publish outgoing lifecycle change");
            }
        }
        let _ = sync_out.shutdown(env::clear_synchronization_topic()).await;
    });

    loop {
        tokio::select! {
            incoming = sync_in.recv() => {
                match incoming {
                    Some(payload) => sync_in.apply_incoming(&payload, &mut fsm),
                    None => {
                        tracing::error!("inbound lifecycle broker connection closed");
                        break;
                    }
                }
            }
            Some(trigger) = cmd_rx.recv() => {
                if let Err(error) = fsm.trigger(trigger) {
                    tracing::warn!(%error, ?trigger, "failed to apply locally observed trigger");
                }
                // The worker's own FSM advances from `completed` to `stopped`
                // on its own, silently: the backend never sees this over the
                // broker, it learns of the stop from its supervisor observing
                // this process exit cleanly.
                if fsm.state() == LifecycleState::Completed {
                    let _ = fsm.trigger_silent(LifecycleTrigger::Stopped);
                }
            }
        }

        if fsm.state().is_final() {
            break;
        }
    }

    if fsm.take_shutdown_grace() {
        tokio::time::sleep(env::terminal_shutdown_grace()).await;
        fsm.hooks().publish_final_status().await;
        fsm.hooks_mut().shutdown();
    }

    let final_state = fsm.state();
    let failure_phase = fsm.hooks().failure_phase();
    // Drops the on_change closure along with its `change_tx`, which lets
    // the publisher task's `change_rx.recv()` observe the channel close.
    drop(fsm);
    drop(cmd_tx);

    let _ = sync_in.shutdown(false).await;
    let _ = publisher.await;

    match final_state {
        LifecycleState::Stopped => ServerExitCode::NoError,
        LifecycleState::Failed => match failure_phase {
            FailurePhase::Init => ServerExitCode::InitError,
            FailurePhase::Running | FailurePhase::None => ServerExitCode::RunningError,
            FailurePhase::Shutdown => ServerExitCode::ShutdownError,
        },
        other => {
            tracing::warn!(state = %other, "worker loop exited without reaching a final state");
            ServerExitCode::RunningError
        }
    }
}
