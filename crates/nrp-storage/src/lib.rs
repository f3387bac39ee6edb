// SPDX-License-Identifier: Apache-2.0

//! The storage collaborator client: the minimal interface `nrp-supervisor`
//! needs to clone experiment files and persist logs (spec §6).

pub mod client;
pub mod error;
pub mod excludes;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use client::{ExperimentClass, FileEntry, HttpStorageClient, StorageClient};
pub use error::StorageError;

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeStorageClient;
