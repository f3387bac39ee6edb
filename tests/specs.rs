// SPDX-License-Identifier: Apache-2.0

//! Workspace-level integration tests. These exercise behavior that spans
//! more than one crate and so doesn't fit any single crate's unit tests:
//! live two-sided lifecycle replication over a shared in-memory broker, and
//! the REST surface end to end over a real HTTP listener.
//!
//! What's deliberately out of scope here: any scenario that needs a real
//! spawned worker process or a live MQTT broker (a real `nrp-simulation-server`
//! child, process crash detection, storage file staging). Those are covered
//! by `nrp-supervisor`'s and `nrp-sync`'s own unit tests against fakes; this
//! file only adds coverage for the two sides talking to each other live and
//! for the HTTP layer, neither of which existed anywhere else yet.

use axum::Router;
use nrp_backend::{build_router, AppState};
use nrp_core::{
    CreateSimulationRequest, HookError, Lifecycle, LifecycleHooks, LifecycleState, LifecycleTrigger,
};
use nrp_storage::FakeStorageClient;
use nrp_sync::{lifecycle_topic, FakeBroker, FakeHub, Synchronizer};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

struct NoopHooks;
impl LifecycleHooks for NoopHooks {
    fn initialize(&mut self) -> Result<(), HookError> {
        Ok(())
    }
}

/// One side of a replicated pair: the FSM plus its inbound/outbound
/// synchronizer pair, run as a background task. Mirrors the shape of
/// `nrp_backend::actor::run_actor` and the worker binary's main loop,
/// simplified down to what a test needs to drive and observe.
struct Side {
    trigger_tx: mpsc::Sender<(LifecycleTrigger, oneshot::Sender<Result<LifecycleState, String>>)>,
    state_rx: watch::Receiver<LifecycleState>,
}

impl Side {
    async fn trigger(&self, trigger: LifecycleTrigger) -> Result<LifecycleState, String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.trigger_tx.send((trigger, reply_tx)).await.expect("side task is alive");
        reply_rx.await.expect("side task replies")
    }

    /// Fire a trigger without propagating it, simulating the worker's own
    /// Completed->Stopped handoff or the backend applying an exit notifier.
    async fn trigger_silent(&self, trigger: LifecycleTrigger) -> Result<LifecycleState, String> {
        self.trigger(trigger).await // silent-vs-propagated only matters for *outgoing* traffic
    }

    async fn wait_for(&mut self, target: LifecycleState) {
        tokio::time::timeout(Duration::from_secs(1), self.state_rx.wait_for(|s| *s == target))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for state {target}"))
            .unwrap();
    }
}

fn spawn_side(hub: FakeHub, node_id: &str, sim_id: &str, propagated: HashSet<LifecycleState>) -> Side {
    let topic = lifecycle_topic("", sim_id);
    let node_id = node_id.to_string();

    let (trigger_tx, mut trigger_rx) =
        mpsc::channel::<(LifecycleTrigger, oneshot::Sender<Result<LifecycleState, String>>)>(8);
    let (state_tx, state_rx) = watch::channel(LifecycleState::Created);

    tokio::spawn(async move {
        let mut sync_in = Synchronizer::new(node_id.clone(), topic.clone(), HashSet::new(), FakeBroker::new(hub.clone()));
        sync_in.connect(false).await.expect("fake broker connect never fails");

        let mut sync_out = Synchronizer::new(node_id, topic, propagated, FakeBroker::new(hub));
        sync_out.connect_publisher().await.expect("fake broker connect never fails");

        let mut fsm = Lifecycle::new(NoopHooks);
        let (change_tx, mut change_rx) = mpsc::unbounded_channel();
        fsm.set_on_change(Box::new(move |change| {
            let _ = change_tx.send(*change);
        }));

        loop {
            tokio::select! {
                Some((trigger, reply)) = trigger_rx.recv() => {
                    let result = fsm.trigger(trigger).map(|()| fsm.state()).map_err(|e| e.to_string());
                    let _ = state_tx.send(fsm.state());
                    let _ = reply.send(result);
                }
                Some(change) = change_rx.recv() => {
                    let _ = sync_out.publish_outgoing(&change).await;
                }
                incoming = sync_in.recv() => {
                    match incoming {
                        Some(payload) => {
                            sync_in.apply_incoming(&payload, &mut fsm);
                            let _ = state_tx.send(fsm.state());
                        }
                        None => break,
                    }
                }
                else => break,
            }
        }
    });

    Side { trigger_tx, state_rx }
}

fn backend_propagated() -> HashSet<LifecycleState> {
    [LifecycleState::Paused, LifecycleState::Started, LifecycleState::Completed].into_iter().collect()
}

fn worker_propagated() -> HashSet<LifecycleState> {
    [LifecycleState::Completed, LifecycleState::Failed].into_iter().collect()
}

/// Live replication of a full run: the backend drives `initialized`,
/// `started`, and (after the worker reports completion) `stopped`; the
/// worker only ever reports `completed` on its own. Covers the bootstrap,
/// backend-to-worker propagation, worker-to-backend propagation, and the
/// `completed`-then-`stopped` handoff across the process boundary — none of
/// which is exercised by `nrp-sync`'s own unit tests, which only apply a
/// single incoming payload to an isolated FSM.
#[tokio::test]
async fn lifecycle_replicates_end_to_end_across_a_full_run() {
    let hub = FakeHub::new();
    let mut backend = spawn_side(hub.clone(), "backend-sim-1", "sim-1", backend_propagated());
    let mut worker = spawn_side(hub, "worker-sim-1", "sim-1", worker_propagated());

    backend.trigger(LifecycleTrigger::Initialized).await.unwrap();
    worker.wait_for(LifecycleState::Paused).await;

    backend.trigger(LifecycleTrigger::Started).await.unwrap();
    worker.wait_for(LifecycleState::Started).await;

    worker.trigger(LifecycleTrigger::Completed).await.unwrap();
    backend.wait_for(LifecycleState::Completed).await;

    // The worker advances itself to `stopped` silently and is never seen
    // doing so over the broker; the backend only learns of the clean exit
    // through its own process-exit notifier, modeled here as a direct,
    // independently-fired trigger.
    worker.trigger_silent(LifecycleTrigger::Stopped).await.unwrap();
    backend.trigger(LifecycleTrigger::Stopped).await.unwrap();

    assert_eq!(*backend.state_rx.borrow(), LifecycleState::Stopped);
    assert_eq!(*worker.state_rx.borrow(), LifecycleState::Stopped);
}

/// A `paused` command mid-run must reach the worker the same way `started`
/// does, and firing it again (by either side) must be a silent no-op rather
/// than erroring or re-publishing (R1's idempotent self-transition rule).
#[tokio::test]
async fn pause_command_propagates_and_is_idempotent() {
    let hub = FakeHub::new();
    let mut backend = spawn_side(hub.clone(), "backend-sim-2", "sim-2", backend_propagated());
    let mut worker = spawn_side(hub, "worker-sim-2", "sim-2", worker_propagated());

    backend.trigger(LifecycleTrigger::Initialized).await.unwrap();
    worker.wait_for(LifecycleState::Paused).await;
    backend.trigger(LifecycleTrigger::Started).await.unwrap();
    worker.wait_for(LifecycleState::Started).await;

    backend.trigger(LifecycleTrigger::Paused).await.unwrap();
    worker.wait_for(LifecycleState::Paused).await;

    // Re-firing paused from either side must succeed silently and leave the
    // other side untouched.
    assert_eq!(backend.trigger(LifecycleTrigger::Paused).await.unwrap(), LifecycleState::Paused);
    assert_eq!(worker.trigger(LifecycleTrigger::Paused).await.unwrap(), LifecycleState::Paused);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*backend.state_rx.borrow(), LifecycleState::Paused);
    assert_eq!(*worker.state_rx.borrow(), LifecycleState::Paused);
}

fn create_request(experiment_id: &str) -> CreateSimulationRequest {
    CreateSimulationRequest {
        experiment_id: experiment_id.to_string(),
        experiment_configuration: None,
        main_script: None,
        state: None,
        ctx_id: None,
    }
}

async fn spawn_test_server(state: Arc<AppState<FakeStorageClient>>) -> String {
    let app: Router = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{address}")
}

/// `GET /simulation` filters out records the requester doesn't own, and
/// `GET /simulation/<id>` denies access to them outright — covering the
/// permission boundary without needing a live actor/worker (records are
/// inserted straight into the registry, bypassing `POST /simulation`).
#[tokio::test]
async fn list_and_get_respect_record_ownership() {
    let state = Arc::new(AppState::new(Arc::new(FakeStorageClient::new())));
    state.registry.create(&create_request("exp-a"), "alice-token", "alice-token", chrono::Utc::now()).unwrap();
    state.registry.create(&create_request("exp-b"), "bob-token", "bob-token", chrono::Utc::now()).unwrap();

    let base = spawn_test_server(state).await;
    let client = reqwest::Client::new();

    let alices_view: Vec<serde_json::Value> = client
        .get(format!("{base}/simulation"))
        .bearer_auth("alice-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(alices_view.len(), 1);
    assert_eq!(alices_view[0]["experiment_id"], "exp-a");

    let bobs_view: Vec<serde_json::Value> = client
        .get(format!("{base}/simulation"))
        .bearer_auth("bob-token")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bobs_view.len(), 1);
    assert_eq!(bobs_view[0]["experiment_id"], "exp-b");

    let anonymous_view: Vec<serde_json::Value> =
        client.get(format!("{base}/simulation")).send().await.unwrap().json().await.unwrap();
    assert!(anonymous_view.is_empty(), "neither record is unclaimed, so an unauthenticated caller sees none");
}

/// `GET /simulation/<id>` on an unknown id is a 404; on someone else's
/// record it is a 401 (spec §7's "not authorized" / "not found" rows).
#[tokio::test]
async fn get_simulation_error_paths() {
    let state = Arc::new(AppState::new(Arc::new(FakeStorageClient::new())));
    let record = state.registry.create(&create_request("exp-a"), "alice-token", "alice-token", chrono::Utc::now()).unwrap();
    let sim_id = record.lock().id.clone();

    let base = spawn_test_server(state).await;
    let client = reqwest::Client::new();

    let not_found = client.get(format!("{base}/simulation/sim-does-not-exist")).send().await.unwrap();
    assert_eq!(not_found.status(), reqwest::StatusCode::NOT_FOUND);

    let denied = client
        .get(format!("{base}/simulation/{sim_id}"))
        .bearer_auth("bob-token")
        .send()
        .await
        .unwrap();
    assert_eq!(denied.status(), reqwest::StatusCode::UNAUTHORIZED);

    let allowed = client
        .get(format!("{base}/simulation/{sim_id}"))
        .bearer_auth("alice-token")
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), reqwest::StatusCode::OK);
}

/// `GET /version` needs no state at all and no ownership checks; it's the
/// simplest possible end-to-end smoke test for the HTTP layer itself.
#[tokio::test]
async fn version_endpoint_lists_workspace_crates() {
    let state = Arc::new(AppState::new(Arc::new(FakeStorageClient::new())));
    let base = spawn_test_server(state).await;

    let body: serde_json::Value =
        reqwest::get(format!("{base}/version")).await.unwrap().json().await.unwrap();
    assert!(body.get("nrp-core").is_some());
    assert!(body.get("nrp-backend").is_some());
}
