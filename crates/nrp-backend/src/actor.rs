// SPDX-License-Identifier: Apache-2.0

//! One task per simulation, owning the backend-side half of the replicated
//! lifecycle FSM (spec §4.1-§4.2). Mirrors the worker binary's synchronizer
//! pair almost exactly (`nrp-simulation-server/src/main.rs`): one
//! `Synchronizer` connected and subscribed for the inbound half, a second
//! connected publisher-only for the outbound half, fed by the FSM's
//! `on_change` listener over an unbounded channel. Callers talk to the
//! actor exclusively through [`ActorHandle`], never by reaching into the
//! FSM directly — that keeps every mutation on the single task that owns
//! it (spec §5's single-writer rule).

use crate::error::ApiError;
use nrp_core::{Lifecycle, LifecycleState, LifecycleTrigger};
use nrp_registry::SharedRecord;
use nrp_storage::StorageClient;
use nrp_sync::{lifecycle_topic, Broker, Synchronizer};
use nrp_supervisor::{UnexpectedExitNotifier, WorkerSupervisor, WorkerSupervisorConfig};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// What a new simulation's actor needs beyond the record itself: the
/// worker-spawn parameters the registry doesn't carry (interpreter path,
/// verbosity) plus the fields copied out of the record so the actor does
/// not need to keep locking it just to read immutable fields.
pub struct ActorConfig {
    pub sim_id: String,
    pub experiment_id: String,
    pub token: String,
    pub main_script: String,
    pub experiment_configuration: String,
    pub verbose: bool,
    pub interpreter: String,
}

/// Destination states the backend propagates onto the broker: every
/// non-final, non-initial state (`LifecycleState::is_running()` minus
/// `created`, which is never a trigger destination). Mirrors the original
/// `BackendSimulationLifecycle.propagated_destinations = RUNNING_STATES`.
fn backend_propagated_destinations() -> HashSet<LifecycleState> {
    [LifecycleState::Paused, LifecycleState::Started, LifecycleState::Completed]
        .into_iter()
        .collect()
}

enum ActorCommand {
    Trigger(LifecycleTrigger, oneshot::Sender<Result<LifecycleState, ApiError>>),
}

/// Cheaply cloneable front door to a running [`spawn_actor`] task.
#[derive(Clone)]
pub struct ActorHandle {
    cmd_tx: mpsc::Sender<ActorCommand>,
}

impl ActorHandle {
    /// Fire `trigger` on this simulation's FSM and wait for the result.
    /// Used both for the synchronous `initialized` fired right after
    /// creation and for client-requested transitions from `PUT .../state`.
    pub async fn trigger(&self, trigger: LifecycleTrigger) -> Result<LifecycleState, ApiError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(ActorCommand::Trigger(trigger, reply_tx))
            .await
            .map_err(|_| ApiError::StateTransition("simulation has already terminated".to_string()))?;
        reply_rx
            .await
            .map_err(|_| ApiError::StateTransition("simulation has already terminated".to_string()))?
    }
}

/// Spawn the actor task and return a handle to it. The record is shared
/// with the registry: every branch of the actor's loop re-mirrors
/// `fsm.state()` into it so that `GET` handlers, which never talk to the
/// actor, always see an up-to-date view.
///
/// Generic over the broker type so tests can pass a closure that hands out
/// `nrp_sync::FakeBroker` instances sharing one `FakeHub`, instead of
/// talking to a real MQTT server; production wires this to `MqttBroker`.
pub fn spawn_actor<S: StorageClient + 'static, B: Broker + 'static>(
    record: SharedRecord,
    storage: Arc<S>,
    config: ActorConfig,
    broker_factory: impl Fn(String) -> B + Send + Sync + 'static,
) -> ActorHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    tokio::spawn(run_actor(record, storage, config, cmd_rx, broker_factory));
    ActorHandle { cmd_tx }
}

async fn run_actor<S: StorageClient + 'static, B: Broker + 'static>(
    record: SharedRecord,
    storage: Arc<S>,
    config: ActorConfig,
    mut cmd_rx: mpsc::Receiver<ActorCommand>,
    broker_factory: impl Fn(String) -> B,
) {
    let sim_id = config.sim_id.clone();
    let node_id = format!("backend-{sim_id}");
    let topic_prefix = nrp_core::env::broker_topic_prefix();
    let topic = lifecycle_topic(&topic_prefix, &sim_id);

    let mut sync_in = Synchronizer::new(
        node_id.clone(),
        topic.clone(),
        HashSet::new(),
        broker_factory(format!("{node_id}-in")),
    );
    if let Err(error) = sync_in.connect(nrp_core::env::clear_synchronization_topic()).await {
        tracing::error!(%error, sim_id = %sim_id, "failed to connect inbound lifecycle synchronizer");
        drain_with_error(&mut cmd_rx, "simulation failed to start").await;
        return;
    }

    let mut sync_out = Synchronizer::new(
        node_id.clone(),
        topic.clone(),
        backend_propagated_destinations(),
        broker_factory(format!("{node_id}-out")),
    );
    if let Err(error) = sync_out.connect_publisher().await {
        tracing::error!(%error, sim_id = %sim_id, "failed to connect outbound lifecycle synchronizer");
        let _ = sync_in.shutdown(false).await;
        drain_with_error(&mut cmd_rx, "simulation failed to start").await;
        return;
    }

    let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<bool>();
    let notifier: UnexpectedExitNotifier = Arc::new(move |crashed| {
        let _ = exit_tx.send(crashed);
    });

    let supervisor_config = WorkerSupervisorConfig {
        sim_id: config.sim_id.clone(),
        experiment_id: config.experiment_id,
        token: config.token,
        main_script: config.main_script,
        experiment_configuration: config.experiment_configuration,
        verbose: config.verbose,
        interpreter: config.interpreter,
        entry_point: None,
    };
    let supervisor = WorkerSupervisor::new(supervisor_config, storage, notifier);
    let mut fsm = Lifecycle::new(supervisor);

    let (change_tx, mut change_rx) = mpsc::unbounded_channel();
    fsm.set_on_change(Box::new(move |change| {
        let _ = change_tx.send(*change);
    }));

    let publisher = tokio::spawn(async move {
        while let Some(change) = change_rx.recv().await {
            if let Err(error) = sync_out.publish_outgoing(&change).await {
                tracing::warn!(%error, "failed to publish outgoing lifecycle change");
            }
        }
        let _ = sync_out.shutdown(nrp_core::env::clear_synchronization_topic()).await;
    });

    loop {
        tokio::select! {
            Some(cmd) = cmd_rx.recv() => {
                match cmd {
                    ActorCommand::Trigger(trigger, reply) => {
                        let result = fsm.trigger(trigger).map(|()| fsm.state()).map_err(ApiError::from);
                        record.lock().state = fsm.state();
                        let _ = reply.send(result);
                    }
                }
            }
            incoming = sync_in.recv() => {
                match incoming {
                    Some(payload) => {
                        sync_in.apply_incoming(&payload, &mut fsm);
                        record.lock().state = fsm.state();
                    }
                    None => {
                        tracing::error!(sim_id = %sim_id, "inbound lifecycle broker connection closed");
                        break;
                    }
                }
            }
            Some(crashed) = exit_rx.recv() => {
                // The worker process ended on its own: a clean exit means
                // it already advanced itself to `stopped` (never published,
                // per its own propagated-destinations set), so we only
                // learn of it here; a crash means `failed` was never fired
                // by anyone and it's on us to do so.
                let trigger = if crashed { LifecycleTrigger::Failed } else { LifecycleTrigger::Stopped };
                if let Err(error) = fsm.trigger(trigger) {
                    tracing::warn!(%error, ?trigger, sim_id = %sim_id, "failed to apply worker exit to lifecycle");
                }
                record.lock().state = fsm.state();
            }
            else => break,
        }

        if fsm.state().is_final() {
            break;
        }
    }

    if fsm.take_shutdown_grace() {
        tokio::time::sleep(nrp_core::env::terminal_shutdown_grace()).await;
        fsm.hooks_mut().shutdown();
    }
    record.lock().state = fsm.state();

    drop(fsm);
    let _ = sync_in.shutdown(false).await;
    let _ = publisher.await;

    drain_with_error(&mut cmd_rx, "simulation has already terminated").await;
}

async fn drain_with_error(cmd_rx: &mut mpsc::Receiver<ActorCommand>, message: &str) {
    cmd_rx.close();
    while let Ok(cmd) = cmd_rx.try_recv() {
        let ActorCommand::Trigger(_, reply) = cmd;
        let _ = reply.send(Err(ApiError::StateTransition(message.to_string())));
    }
}

