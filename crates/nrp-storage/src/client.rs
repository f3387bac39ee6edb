// SPDX-License-Identifier: Apache-2.0

//! The minimal storage collaborator interface the core consumes (spec §6):
//! clone an experiment's files into a local directory, and put/get/list
//! individual files. Out of scope per spec §1; this crate exists only so
//! `nrp-supervisor` has something concrete to call.

use crate::error::StorageError;
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub is_folder: bool,
}

/// The experiment's access classification. Only `Private` experiments may
/// be cloned for a simulation run (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentClass {
    Private,
    Shared,
    Other,
}

impl ExperimentClass {
    fn label(self) -> &'static str {
        match self {
            ExperimentClass::Private => "private",
            ExperimentClass::Shared => "shared",
            ExperimentClass::Other => "other",
        }
    }
}

#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn experiment_class(&self, token: &str, experiment_id: &str) -> Result<ExperimentClass, StorageError>;

    async fn list_files(
        &self,
        token: &str,
        experiment_id: &str,
        include_folders: bool,
    ) -> Result<Vec<FileEntry>, StorageError>;

    async fn get_file(
        &self,
        token: &str,
        experiment_id: &str,
        name: &str,
        by_name: bool,
    ) -> Result<Vec<u8>, StorageError>;

    async fn put_file(
        &self,
        token: &str,
        experiment_id: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;

    /// Clone every non-excluded file of `experiment_id` into `dest_dir`.
    /// Rejects non-private experiments up front (`UserError` at the call
    /// site, per spec §4.4). Individual file-copy failures are logged and
    /// skipped rather than aborting the whole clone — only the initial
    /// class check is fatal.
    async fn clone_experiment(
        &self,
        token: &str,
        experiment_id: &str,
        dest_dir: &Path,
        exclude_globs: &[String],
    ) -> Result<(), StorageError> {
        let class = self.experiment_class(token, experiment_id).await?;
        if class != ExperimentClass::Private {
            return Err(StorageError::UnsupportedExperimentClass(class.label().to_string()));
        }

        let entries = self.list_files(token, experiment_id, true).await?;
        for entry in entries {
            if entry.is_folder || crate::excludes::is_excluded(&entry.name, exclude_globs) {
                continue;
            }
            match self.get_file(token, experiment_id, &entry.name, true).await {
                Ok(bytes) => {
                    if let Err(error) = write_into(dest_dir, &entry.name, &bytes).await {
                        tracing::warn!(file = %entry.name, %error, "failed to write cloned experiment file");
                    }
                }
                Err(error) => {
                    tracing::warn!(file = %entry.name, %error, "failed to fetch experiment file, skipping");
                }
            }
        }
        Ok(())
    }
}

async fn write_into(dest_dir: &Path, relative_name: &str, bytes: &[u8]) -> std::io::Result<()> {
    let path = dest_dir.join(relative_name);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

/// Production client speaking to the storage collaborator over HTTP.
pub struct HttpStorageClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpStorageClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), http: reqwest::Client::new() }
    }

    fn experiment_url(&self, experiment_id: &str, suffix: &str) -> String {
        format!("{}/experiment/{}/{}", self.base_url.trim_end_matches('/'), experiment_id, suffix)
    }

    fn bearer(request: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        if token.is_empty() {
            request
        } else {
            request.bearer_auth(token)
        }
    }
}

#[derive(serde::Deserialize)]
struct ClassificationResponse {
    classification: String,
}

#[derive(serde::Deserialize)]
struct FileEntryResponse {
    name: String,
    #[serde(default)]
    is_folder: bool,
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn experiment_class(&self, token: &str, experiment_id: &str) -> Result<ExperimentClass, StorageError> {
        let request = Self::bearer(self.http.get(self.experiment_url(experiment_id, "classification")), token);
        let response: ClassificationResponse = request.send().await?.error_for_status()?.json().await?;
        Ok(match response.classification.as_str() {
            "private" => ExperimentClass::Private,
            "shared" => ExperimentClass::Shared,
            _ => ExperimentClass::Other,
        })
    }

    async fn list_files(
        &self,
        token: &str,
        experiment_id: &str,
        include_folders: bool,
    ) -> Result<Vec<FileEntry>, StorageError> {
        let request = Self::bearer(
            self.http
                .get(self.experiment_url(experiment_id, "files"))
                .query(&[("includeFolders", include_folders)]),
            token,
        );
        let entries: Vec<FileEntryResponse> = request.send().await?.error_for_status()?.json().await?;
        Ok(entries.into_iter().map(|e| FileEntry { name: e.name, is_folder: e.is_folder }).collect())
    }

    async fn get_file(
        &self,
        token: &str,
        experiment_id: &str,
        name: &str,
        by_name: bool,
    ) -> Result<Vec<u8>, StorageError> {
        let request = Self::bearer(
            self.http
                .get(self.experiment_url(experiment_id, "file"))
                .query(&[("name", name), ("byName", if by_name { "true" } else { "false" })]),
            token,
        );
        let bytes = request.send().await?.error_for_status()?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn put_file(
        &self,
        token: &str,
        experiment_id: &str,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let request = Self::bearer(
            self.http
                .put(self.experiment_url(experiment_id, "file"))
                .query(&[("name", name)])
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(bytes),
            token,
        );
        request.send().await?.error_for_status()?;
        Ok(())
    }
}
