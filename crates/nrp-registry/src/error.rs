// SPDX-License-Identifier: Apache-2.0

use nrp_core::SimulationId;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Another simulation is already running")]
    AnotherRunning,
    #[error("simulation `{0}` not found")]
    NotFound(SimulationId),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}
