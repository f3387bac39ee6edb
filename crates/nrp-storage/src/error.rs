// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("storage returned an unexpected response: {0}")]
    Protocol(String),
    #[error("only private experiments are supported (got `{0}`)")]
    UnsupportedExperimentClass(String),
    #[error("local filesystem error: {0}")]
    Io(#[from] std::io::Error),
}
