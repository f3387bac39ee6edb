// SPDX-License-Identifier: Apache-2.0

//! Wire shapes for the two observer-facing topics the harness publishes on
//! (spec §3, §6): a 1 Hz status tick and on-error notifications. Distinct
//! from the lifecycle synchronization message in `nrp-sync`, which only
//! ever carries FSM transitions.

use nrp_core::LifecycleState;
use serde::{Deserialize, Serialize};

/// Published to `nrp_simulation/<sim_id>/status` at 1 Hz, plus once more
/// (after a brief grace period) on entering a final state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    #[serde(rename = "realTime")]
    pub real_time: f64,
    #[serde(rename = "simulationTime")]
    pub simulation_time: f64,
    pub state: LifecycleState,
    #[serde(rename = "simulationTimeLeft")]
    pub simulation_time_left: f64,
}

/// The taxonomy of worker-side script errors (spec §7's worker rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Script failed to parse, or instantiating/initializing the engine
    /// client failed (spec §4.5's "Engine failure is published as a
    /// `Loading` error").
    Compile,
    Loading,
    Runtime,
    SimTimeout,
}

nrp_core::simple_display! {
    ErrorKind {
        Compile => "Compile",
        Loading => "Loading",
        Runtime => "Runtime",
        SimTimeout => "SimTimeout",
    }
}

/// Published to `nrp_simulation/<sim_id>/runtime_error` whenever the
/// script harness encounters one of the above.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub sim_id: String,
    pub msg: String,
    pub error_type: ErrorKind,
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub line_number: usize,
    pub offset: usize,
    pub line_text: String,
}

impl ErrorMessage {
    /// A message that carries no source-position information — used for
    /// engine-client (`Loading`) and plain script `Runtime` errors, which
    /// have no line/column to report.
    pub fn without_position(sim_id: &str, file_name: &str, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            sim_id: sim_id.to_string(),
            msg: msg.into(),
            error_type: kind,
            file_name: file_name.to_string(),
            line_number: 0,
            offset: 0,
            line_text: String::new(),
        }
    }
}
