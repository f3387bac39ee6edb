// SPDX-License-Identifier: Apache-2.0

//! The simulation record (C3 data model) and the request/response shapes
//! that wrap it at the REST boundary.

use crate::id::SimulationId;
use crate::lifecycle::LifecycleState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default relative path for the experiment configuration file.
pub const DEFAULT_EXPERIMENT_CONFIGURATION: &str = "simulation_config.json";
/// Default relative path for the user's main script.
pub const DEFAULT_MAIN_SCRIPT: &str = "main_script.py";

/// One simulation, as held by the registry. Everything but `state` is
/// immutable after creation (spec §3). The supervisor/FSM handle for this
/// record lives alongside it in the owning process (`nrp-backend`), not
/// here — this type is the plain, serializable data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub id: SimulationId,
    /// Dense, monotonically increasing — used only for ordering and the
    /// `Location` header; never exposed as the canonical identifier.
    #[serde(skip_serializing, skip_deserializing, default)]
    pub seq: u64,
    pub experiment_id: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub main_script: String,
    pub experiment_configuration: String,
    /// Opaque bearer token forwarded to the storage collaborator. May be empty.
    #[serde(skip_serializing)]
    pub token: String,
    /// Opaque context identifier. May be empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ctx_id: String,
    /// Broker topic prefix override. May be empty (meaning: no prefix).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub broker_topic_prefix: String,
    pub state: LifecycleState,
}

impl SimulationRecord {
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}

/// Body of `POST /simulation`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSimulationRequest {
    #[serde(rename = "experimentID")]
    pub experiment_id: String,
    #[serde(default)]
    pub experiment_configuration: Option<String>,
    #[serde(default)]
    pub main_script: Option<String>,
    /// Accepted for parity with the original request shape; a value other
    /// than the default is rejected by the registry (creation always
    /// starts in `created`).
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub ctx_id: Option<String>,
}

impl CreateSimulationRequest {
    pub fn experiment_configuration(&self) -> &str {
        self.experiment_configuration
            .as_deref()
            .unwrap_or(DEFAULT_EXPERIMENT_CONFIGURATION)
    }

    pub fn main_script(&self) -> &str {
        self.main_script.as_deref().unwrap_or(DEFAULT_MAIN_SCRIPT)
    }
}

/// Body of `GET/PUT /simulation/<id>/state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationStateBody {
    pub state: LifecycleState,
}

/// Error body shape shared by every REST error response (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Option<String>,
}
