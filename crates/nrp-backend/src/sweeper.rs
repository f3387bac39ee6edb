// SPDX-License-Identifier: Apache-2.0

//! Background sweep for simulations nobody ever stopped (spec §4.3):
//! periodically scans the registry and stops any non-final record whose
//! age exceeds a configured cap. Off by default; enabled and tuned via
//! [`crate::env::sweep_enabled`]/`sweep_interval`/`sweep_max_age`.
//!
//! The sweep must use the same state accessor every other caller does —
//! each stale record is stopped through its [`crate::actor::ActorHandle`],
//! never by writing `record.lock().state` directly.

use crate::AppState;
use nrp_core::LifecycleTrigger;
use nrp_storage::StorageClient;
use std::sync::Arc;

pub async fn run<S: StorageClient + 'static>(state: Arc<AppState<S>>) {
    let interval = crate::env::sweep_interval();
    let max_age = crate::env::sweep_max_age();
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;
        sweep_once(&state, max_age).await;
    }
}

async fn sweep_once<S: StorageClient + 'static>(state: &AppState<S>, max_age: chrono::Duration) {
    let stale = state.registry.stale(chrono::Utc::now(), max_age);
    for record in stale {
        let id = record.lock().id.clone();
        let Some(handle) = state.actors.lock().get(&id).cloned() else {
            tracing::warn!(sim_id = %id, "stale simulation has no running actor, skipping sweep");
            continue;
        };
        tracing::info!(sim_id = %id, "sweeping stale simulation");
        if let Err(error) = handle.trigger(LifecycleTrigger::Stopped).await {
            tracing::warn!(%error, sim_id = %id, "failed to stop stale simulation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nrp_core::{CreateSimulationRequest, LifecycleState};
    use nrp_storage::FakeStorageClient;

    fn request(experiment_id: &str) -> CreateSimulationRequest {
        CreateSimulationRequest {
            experiment_id: experiment_id.to_string(),
            experiment_configuration: None,
            main_script: None,
            state: None,
            ctx_id: None,
        }
    }

    #[tokio::test]
    async fn sweep_skips_stale_records_with_no_actor() {
        let state = AppState::new(Arc::new(FakeStorageClient::new()));
        let old = chrono::Utc::now() - chrono::Duration::hours(48);
        let record = state.registry.create(&request("exp-a"), "alice", "token", old).unwrap();
        record.lock().state = LifecycleState::Started;

        sweep_once(&state, chrono::Duration::hours(24)).await;

        // No actor registered for this record, so the sweep must not touch
        // its state directly.
        assert_eq!(record.lock().state, LifecycleState::Started);
    }

    #[tokio::test]
    async fn sweep_ignores_records_within_the_age_cap() {
        let state = AppState::new(Arc::new(FakeStorageClient::new()));
        let record = state.registry.create(&request("exp-a"), "alice", "token", chrono::Utc::now()).unwrap();
        record.lock().state = LifecycleState::Started;

        sweep_once(&state, chrono::Duration::hours(24)).await;

        assert_eq!(record.lock().state, LifecycleState::Started);
    }
}
