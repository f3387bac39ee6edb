// SPDX-License-Identifier: Apache-2.0

//! The in-memory simulation table (C3). One process-wide mutex guards the
//! "check no other simulation is running, then append" critical section
//! (spec §4.3, §5); the `initialized` trigger on the new record's FSM is
//! fired by the caller *outside* this lock, since the FSM itself lives in
//! `nrp-backend` alongside the supervisor hooks.

use crate::error::RegistryError;
use chrono::{DateTime, Utc};
use nrp_core::LifecycleState;
use nrp_core::{CreateSimulationRequest, SimulationId, SimulationRecord};
use parking_lot::Mutex;
use std::sync::Arc;

pub type SharedRecord = Arc<Mutex<SimulationRecord>>;

#[derive(Default)]
pub struct Registry {
    records: Mutex<Vec<SharedRecord>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new record, failing with [`RegistryError::AnotherRunning`]
    /// if any existing record is in a running (non-final) state. The check
    /// and the append happen under the same lock (I3).
    pub fn create(
        &self,
        request: &CreateSimulationRequest,
        owner: impl Into<String>,
        token: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<SharedRecord, RegistryError> {
        if request.experiment_id.trim().is_empty() {
            return Err(RegistryError::MissingField("experimentID"));
        }

        let mut records = self.records.lock();
        if records.iter().any(|r| r.lock().is_running()) {
            return Err(RegistryError::AnotherRunning);
        }

        let record = SimulationRecord {
            id: SimulationId::new(),
            seq: records.len() as u64,
            experiment_id: request.experiment_id.clone(),
            owner: owner.into(),
            created_at: now,
            main_script: request.main_script().to_string(),
            experiment_configuration: request.experiment_configuration().to_string(),
            token: token.into(),
            ctx_id: request.ctx_id.clone().unwrap_or_default(),
            broker_topic_prefix: String::new(),
            state: LifecycleState::Created,
        };
        let shared = Arc::new(Mutex::new(record));
        records.push(shared.clone());
        Ok(shared)
    }

    pub fn get(&self, id: &SimulationId) -> Option<SharedRecord> {
        self.records.lock().iter().find(|r| &r.lock().id == id).cloned()
    }

    pub fn list(&self) -> Vec<SharedRecord> {
        self.records.lock().clone()
    }

    /// Records whose age exceeds `max_age` and which are not yet in a
    /// terminal state — candidates for the optional background sweep. The
    /// registry only *reports* these; transitioning them to `stopped` goes
    /// through each record's FSM, owned by the caller.
    pub fn stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> Vec<SharedRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| {
                let record = r.lock();
                record.is_running() && now - record.created_at > max_age
            })
            .cloned()
            .collect()
    }
}
