// SPDX-License-Identifier: Apache-2.0

//! The worker supervisor (C4): stages the simulation directory, clones
//! experiment files, spawns and monitors the worker child process, and
//! persists its logs on teardown.

pub mod error;
pub mod exit_code;
pub mod logs;
pub mod process;
pub mod staging;
pub mod supervisor;

pub use error::SupervisorError;
pub use exit_code::{ChildOutcome, ServerExitCode};
pub use process::{SpawnArgs, SupervisedChild};
pub use supervisor::{AsyncLifecycleHooks, UnexpectedExitNotifier, WorkerSupervisor, WorkerSupervisorConfig};

#[cfg(test)]
#[path = "process_tests.rs"]
mod process_tests;
