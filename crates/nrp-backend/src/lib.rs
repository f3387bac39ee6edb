// SPDX-License-Identifier: Apache-2.0

//! The backend process (C4, C5): a REST surface in front of the simulation
//! registry, one [`actor::ActorHandle`]-driven task per live simulation,
//! and an optional background sweep for abandoned records.

pub mod actor;
pub mod auth;
pub mod env;
pub mod error;
pub mod handlers;
pub mod sweeper;
pub mod version;

use actor::ActorHandle;
use axum::routing::get;
use axum::Router;
use nrp_core::SimulationId;
use nrp_registry::Registry;
use nrp_storage::StorageClient;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared state behind every handler. Generic over the storage
/// collaborator so tests can plug in `nrp_storage::FakeStorageClient`.
pub struct AppState<S: StorageClient + 'static> {
    pub registry: Registry,
    pub storage: Arc<S>,
    pub actors: Mutex<HashMap<SimulationId, ActorHandle>>,
}

impl<S: StorageClient + 'static> AppState<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { registry: Registry::new(), storage, actors: Mutex::new(HashMap::new()) }
    }
}

pub fn build_router<S: StorageClient + 'static>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route(
            "/simulation",
            get(handlers::list_simulations::<S>).post(handlers::create_simulation::<S>),
        )
        .route("/simulation/:id", get(handlers::get_simulation::<S>))
        .route(
            "/simulation/:id/state",
            get(handlers::get_state::<S>).put(handlers::put_state::<S>),
        )
        .route("/version", get(handlers::get_version))
        .with_state(state)
}
