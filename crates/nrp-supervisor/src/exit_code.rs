// SPDX-License-Identifier: Apache-2.0

//! Re-exported from `nrp-core`, which also backs the worker binary's own
//! `std::process::exit` call — both sides of the child-process boundary
//! need the same vocabulary.
pub use nrp_core::{ChildOutcome, ServerExitCode};
