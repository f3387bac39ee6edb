// SPDX-License-Identifier: Apache-2.0

//! The REST surface (spec §6): one handler per row of the operation table.
//! Every handler goes through the registry for lookups and, where a state
//! mutation is involved, through the owning simulation's [`ActorHandle`] —
//! never touching a record's `state` field directly.

use crate::actor::{self, ActorConfig};
use crate::auth;
use crate::error::ApiError;
use crate::version;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use nrp_core::{CreateSimulationRequest, LifecycleState, LifecycleTrigger, SimulationId, SimulationRecord, SimulationStateBody};
use nrp_storage::StorageClient;
use nrp_sync::MqttBroker;
use std::sync::Arc;

fn bearer_token(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).to_string())
        .unwrap_or_default()
}

/// `PUT /simulation/<id>/state` only accepts the three states a client may
/// request directly; `created`, `completed`, and `failed` are driven by the
/// lifecycle itself (spec §7's "invalid state requested" row).
fn trigger_for_requested_state(state: LifecycleState) -> Result<LifecycleTrigger, ApiError> {
    match state {
        LifecycleState::Started => Ok(LifecycleTrigger::Started),
        LifecycleState::Paused => Ok(LifecycleTrigger::Paused),
        LifecycleState::Stopped => Ok(LifecycleTrigger::Stopped),
        other => Err(ApiError::Client(format!("state `{other}` cannot be requested directly"))),
    }
}

pub async fn list_simulations<S: StorageClient + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
) -> Json<Vec<SimulationRecord>> {
    let requester = bearer_token(&headers);
    let records = state
        .registry
        .list()
        .into_iter()
        .map(|r| r.lock().clone())
        .filter(|r| auth::can_view(r, &requester))
        .collect();
    Json(records)
}

pub async fn create_simulation<S: StorageClient + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(request): Json<CreateSimulationRequest>,
) -> Result<Response, ApiError> {
    let token = bearer_token(&headers);
    let owner = token.clone();

    let shared = state.registry.create(&request, owner, token.clone(), chrono::Utc::now())?;
    let (sim_id, experiment_id, main_script, experiment_configuration) = {
        let record = shared.lock();
        (record.id.clone(), record.experiment_id.clone(), record.main_script.clone(), record.experiment_configuration.clone())
    };

    let config = ActorConfig {
        sim_id: sim_id.to_string(),
        experiment_id,
        token,
        main_script,
        experiment_configuration,
        verbose: false,
        interpreter: crate::env::simulation_server_binary(),
    };
    let broker_address = nrp_core::env::mqtt_broker_address();
    let handle = actor::spawn_actor(shared.clone(), state.storage.clone(), config, move |client_id| {
        MqttBroker::new(client_id, broker_address.clone())
    });
    state.actors.lock().insert(sim_id.clone(), handle.clone());

    // Fired synchronously so a client that immediately GETs the record sees
    // `paused`, not the transient `created` (spec §4.3: "outside the
    // critical section triggers `initialized`").
    if let Err(error) = handle.trigger(LifecycleTrigger::Initialized).await {
        tracing::error!(%error, sim_id = %sim_id, "failed to initialize new simulation");
        state.actors.lock().remove(&sim_id);
        return Err(error);
    }

    let record = shared.lock().clone();
    let location = format!("/simulation/{sim_id}");
    Ok((StatusCode::CREATED, [(axum::http::header::LOCATION, location)], Json(record)).into_response())
}

fn lookup<S: StorageClient + 'static>(state: &AppState<S>, id: &str) -> Result<nrp_registry::SharedRecord, ApiError> {
    let sim_id = SimulationId::from_string(id);
    state.registry.get(&sim_id).ok_or_else(|| ApiError::NotFound(id.to_string()))
}

pub async fn get_simulation<S: StorageClient + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SimulationRecord>, ApiError> {
    let requester = bearer_token(&headers);
    let shared = lookup(&state, &id)?;
    let record = shared.lock().clone();
    if !auth::can_view(&record, &requester) {
        return Err(ApiError::Permission);
    }
    Ok(Json(record))
}

pub async fn get_state<S: StorageClient + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<SimulationStateBody>, ApiError> {
    let requester = bearer_token(&headers);
    let shared = lookup(&state, &id)?;
    let record = shared.lock().clone();
    if !auth::can_view(&record, &requester) {
        return Err(ApiError::Permission);
    }
    Ok(Json(SimulationStateBody { state: record.state }))
}

pub async fn put_state<S: StorageClient + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SimulationStateBody>,
) -> Result<Json<SimulationStateBody>, ApiError> {
    let requester = bearer_token(&headers);
    let shared = lookup(&state, &id)?;
    let record = shared.lock().clone();
    if !auth::can_modify(&record, &requester) {
        return Err(ApiError::Permission);
    }

    let trigger = trigger_for_requested_state(body.state)?;
    let sim_id = record.id.clone();
    let handle = state.actors.lock().get(&sim_id).cloned().ok_or_else(|| ApiError::NotFound(id))?;
    let new_state = handle.trigger(trigger).await?;
    Ok(Json(SimulationStateBody { state: new_state }))
}

pub async fn get_version() -> Json<serde_json::Value> {
    Json(version::versions())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_strips_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer abc123"));
        assert_eq!(bearer_token(&headers), "abc123");
    }

    #[test]
    fn bearer_token_missing_header_is_empty() {
        assert_eq!(bearer_token(&HeaderMap::new()), "");
    }

    #[test]
    fn requested_state_accepts_client_triggerable_states() {
        assert_eq!(trigger_for_requested_state(LifecycleState::Started).unwrap(), LifecycleTrigger::Started);
        assert_eq!(trigger_for_requested_state(LifecycleState::Paused).unwrap(), LifecycleTrigger::Paused);
        assert_eq!(trigger_for_requested_state(LifecycleState::Stopped).unwrap(), LifecycleTrigger::Stopped);
    }

    #[test]
    fn requested_state_rejects_non_client_states() {
        assert!(trigger_for_requested_state(LifecycleState::Created).is_err());
        assert!(trigger_for_requested_state(LifecycleState::Completed).is_err());
        assert!(trigger_for_requested_state(LifecycleState::Failed).is_err());
    }
}
