// SPDX-License-Identifier: Apache-2.0

//! The worker-side script harness (C5): compiles and runs the user's main
//! script against an opaque [`engine::EngineClient`], exposing `nrp` as a
//! cooperative step interface and feeding the result back into the worker's
//! lifecycle FSM — see spec §4.5.

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod harness;
pub mod messages;
pub mod wrapper;

pub use config::{EngineConfigEntry, ExperimentConfig};
pub use engine::{EngineClient, EngineClientArgs};
pub use error::HarnessError;
pub use executor::{ExecutorResult, ExecutorTrigger, ScriptFailure, ScriptLogger};
pub use harness::{FailurePhase, ScriptHarness, ScriptHarnessConfig};
pub use messages::{ErrorKind, ErrorMessage, StatusMessage};
pub use wrapper::{EngineWrapper, PauseGate, RunLoopSignal, SimulationTimeout, StopExecution, StopFlag};
