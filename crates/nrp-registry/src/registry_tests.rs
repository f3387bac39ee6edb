use crate::Registry;
use chrono::Utc;
use nrp_core::{CreateSimulationRequest, LifecycleState};

fn request(experiment_id: &str) -> CreateSimulationRequest {
    CreateSimulationRequest {
        experiment_id: experiment_id.to_string(),
        experiment_configuration: None,
        main_script: None,
        state: None,
        ctx_id: None,
    }
}

#[test]
fn create_assigns_dense_sequential_seq_and_defaults() {
    let registry = Registry::new();
    let first = registry.create(&request("exp-a"), "alice", "token", Utc::now()).unwrap();
    assert_eq!(first.lock().seq, 0);
    assert_eq!(first.lock().experiment_configuration, "simulation_config.json");
    assert_eq!(first.lock().main_script, "main_script.py");
    assert_eq!(first.lock().state, LifecycleState::Created);
}

#[test]
fn second_create_rejected_while_one_is_running() {
    let registry = Registry::new();
    let first = registry.create(&request("exp-a"), "alice", "token", Utc::now()).unwrap();
    first.lock().state = LifecycleState::Started;

    let err = registry.create(&request("exp-b"), "bob", "token", Utc::now()).unwrap_err();
    assert!(matches!(err, crate::RegistryError::AnotherRunning));
}

#[test]
fn create_allowed_once_previous_is_terminal() {
    let registry = Registry::new();
    let first = registry.create(&request("exp-a"), "alice", "token", Utc::now()).unwrap();
    first.lock().state = LifecycleState::Stopped;

    let second = registry.create(&request("exp-b"), "bob", "token", Utc::now()).unwrap();
    assert_eq!(second.lock().seq, 1);
}

#[test]
fn missing_experiment_id_is_rejected() {
    let registry = Registry::new();
    let err = registry.create(&request(""), "alice", "token", Utc::now()).unwrap_err();
    assert!(matches!(err, crate::RegistryError::MissingField("experimentID")));
}

#[test]
fn get_and_list_reflect_created_records() {
    let registry = Registry::new();
    let record = registry.create(&request("exp-a"), "alice", "token", Utc::now()).unwrap();
    let id = record.lock().id.clone();

    assert!(registry.get(&id).is_some());
    assert_eq!(registry.list().len(), 1);
}

#[test]
fn stale_reports_only_aged_non_terminal_records() {
    let registry = Registry::new();
    let now = Utc::now();
    let old = registry.create(&request("exp-a"), "alice", "token", now - chrono::Duration::hours(48)).unwrap();
    old.lock().state = LifecycleState::Started;

    let stale = registry.stale(now, chrono::Duration::hours(24));
    assert_eq!(stale.len(), 1);
}
