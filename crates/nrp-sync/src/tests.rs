use crate::{fake::FakeHub, lifecycle_topic, Broker, FakeBroker, Synchronizer};
use nrp_core::{HookError, Lifecycle, LifecycleHooks, LifecycleState, LifecycleTrigger};
use std::collections::HashSet;

struct NoopHooks;
impl LifecycleHooks for NoopHooks {}

fn backend_like(hub: FakeHub, sim_id: &str) -> Synchronizer<FakeBroker> {
    let propagated: HashSet<LifecycleState> =
        [LifecycleState::Paused, LifecycleState::Started].into_iter().collect();
    Synchronizer::new("nrp_backend", lifecycle_topic("", sim_id), propagated, FakeBroker::new(hub))
}

fn worker_like(hub: FakeHub, sim_id: &str) -> Synchronizer<FakeBroker> {
    let propagated: HashSet<LifecycleState> =
        [LifecycleState::Completed, LifecycleState::Failed].into_iter().collect();
    Synchronizer::new(
        "nrp_simulation_server",
        lifecycle_topic("", sim_id),
        propagated,
        FakeBroker::new(hub),
    )
}

#[test]
fn echo_suppression_drops_own_message() {
    let hub = FakeHub::new();
    let synchronizer = backend_like(hub, "sim-1");
    let mut fsm = Lifecycle::new(NoopHooks);

    let payload = br#"{"source_node":"nrp_backend","source_state":"created","event":"initialized","target_state":"paused"}"#;
    synchronizer.apply_incoming(payload, &mut fsm);

    assert_eq!(fsm.state(), LifecycleState::Created, "message from self must be dropped");
}

#[test]
fn empty_payload_is_ignored() {
    let hub = FakeHub::new();
    let synchronizer = backend_like(hub, "sim-1");
    let mut fsm = Lifecycle::new(NoopHooks);
    synchronizer.apply_incoming(b"", &mut fsm);
    assert_eq!(fsm.state(), LifecycleState::Created);
}

#[test]
fn malformed_payload_is_ignored() {
    let hub = FakeHub::new();
    let synchronizer = backend_like(hub, "sim-1");
    let mut fsm = Lifecycle::new(NoopHooks);
    synchronizer.apply_incoming(b"not json", &mut fsm);
    assert_eq!(fsm.state(), LifecycleState::Created);
}

#[test]
fn incoming_transition_applies_and_forces_divergent_state() {
    let hub = FakeHub::new();
    // This instance is the worker; the message comes "from" the backend.
    let synchronizer = worker_like(hub, "sim-1");
    let mut fsm = Lifecycle::new(NoopHooks);

    let payload = br#"{"source_node":"nrp_backend","source_state":"created","event":"initialized","target_state":"paused"}"#;
    synchronizer.apply_incoming(payload, &mut fsm);

    assert_eq!(fsm.state(), LifecycleState::Paused);
}

#[derive(Default)]
struct FailingStart;
impl LifecycleHooks for FailingStart {
    fn start(&mut self) -> Result<(), HookError> {
        Err(HookError::new("boom"))
    }
}

#[test]
fn incoming_trigger_failure_forces_target_then_fails() {
    let hub = FakeHub::new();
    let synchronizer = worker_like(hub, "sim-1");
    let mut fsm = Lifecycle::new(FailingStart);
    fsm.trigger(LifecycleTrigger::Initialized).unwrap();

    let payload = br#"{"source_node":"nrp_backend","source_state":"paused","event":"started","target_state":"started"}"#;
    synchronizer.apply_incoming(payload, &mut fsm);

    assert_eq!(fsm.state(), LifecycleState::Failed);
}

#[tokio::test]
async fn retained_bootstrap_then_clear_leaves_nothing_for_new_subscriber() {
    let hub = FakeHub::new();
    let mut publisher = FakeBroker::new(hub.clone());
    publisher.connect().await.unwrap();
    publisher.publish("topic", b"hello", true).await.unwrap();
    publisher.publish("topic", b"", true).await.unwrap(); // clear

    let mut subscriber = FakeBroker::new(hub);
    subscriber.connect().await.unwrap();
    subscriber.subscribe("topic").await.unwrap();

    let received = tokio::time::timeout(std::time::Duration::from_millis(50), subscriber.recv()).await;
    assert!(received.is_err(), "no retained message should be delivered after it was cleared");
}
