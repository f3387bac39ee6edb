// SPDX-License-Identifier: Apache-2.0

//! In-memory [`StorageClient`] for tests.

use crate::client::{ExperimentClass, FileEntry, StorageClient};
use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct FakeStorageClient {
    class: Mutex<ExperimentClass>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    folders: Mutex<HashSet<String>>,
}

impl FakeStorageClient {
    pub fn new() -> Self {
        Self { class: Mutex::new(ExperimentClass::Private), files: Mutex::new(HashMap::new()), folders: Mutex::new(HashSet::new()) }
    }

    pub fn with_class(class: ExperimentClass) -> Self {
        Self { class: Mutex::new(class), files: Mutex::new(HashMap::new()), folders: Mutex::new(HashSet::new()) }
    }

    pub fn seed(&self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.files.lock().insert(name.into(), bytes.into());
    }

    /// Register a folder entry, returned by `list_files` only when
    /// `include_folders` is set (mirrors the storage collaborator's
    /// `includeFolders` query parameter).
    pub fn seed_folder(&self, name: impl Into<String>) {
        self.folders.lock().insert(name.into());
    }

    pub fn uploaded(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().get(name).cloned()
    }
}

#[async_trait]
impl StorageClient for FakeStorageClient {
    async fn experiment_class(&self, _token: &str, _experiment_id: &str) -> Result<ExperimentClass, StorageError> {
        Ok(*self.class.lock())
    }

    async fn list_files(
        &self,
        _token: &str,
        _experiment_id: &str,
        include_folders: bool,
    ) -> Result<Vec<FileEntry>, StorageError> {
        let mut entries: Vec<FileEntry> =
            self.files.lock().keys().map(|name| FileEntry { name: name.clone(), is_folder: false }).collect();
        if include_folders {
            entries.extend(self.folders.lock().iter().map(|name| FileEntry { name: name.clone(), is_folder: true }));
        }
        Ok(entries)
    }

    async fn get_file(
        &self,
        _token: &str,
        _experiment_id: &str,
        name: &str,
        _by_name: bool,
    ) -> Result<Vec<u8>, StorageError> {
        self.files.lock().get(name).cloned().ok_or_else(|| StorageError::Protocol(format!("no such file: {name}")))
    }

    async fn put_file(
        &self,
        _token: &str,
        _experiment_id: &str,
        name: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        self.files.lock().insert(name.to_string(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::excludes::DEFAULT_EXCLUDES;

    #[tokio::test]
    async fn clone_experiment_skips_excluded_and_writes_the_rest() {
        let client = FakeStorageClient::new();
        client.seed("main_script.py", b"print(1)".to_vec());
        client.seed("run.log", b"stale log".to_vec());

        let dest = tempfile::tempdir().unwrap();
        let excludes: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        client
            .clone_experiment("token", "exp-a", dest.path(), &excludes)
            .await
            .unwrap();

        assert!(dest.path().join("main_script.py").exists());
        assert!(!dest.path().join("run.log").exists());
    }

    #[tokio::test]
    async fn clone_experiment_rejects_non_private() {
        let client = FakeStorageClient::with_class(ExperimentClass::Shared);
        let dest = tempfile::tempdir().unwrap();
        let err = client.clone_experiment("token", "exp-a", dest.path(), &[]).await.unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedExperimentClass(_)));
    }

    /// `clone_experiment` lists with `include_folders: true` but must skip
    /// every folder entry rather than trying to fetch it as a file's bytes.
    #[tokio::test]
    async fn clone_experiment_skips_folder_entries() {
        let client = FakeStorageClient::new();
        client.seed("main_script.py", b"print(1)".to_vec());
        client.seed_folder("resources");

        let dest = tempfile::tempdir().unwrap();
        client.clone_experiment("token", "exp-a", dest.path(), &[]).await.unwrap();

        assert!(dest.path().join("main_script.py").exists());
        assert!(!dest.path().join("resources").exists());
    }
}
