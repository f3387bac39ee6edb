// SPDX-License-Identifier: Apache-2.0

//! Log persistence on teardown (spec §4.4): glob the staged directory for
//! log files, zip them flat, upload through the storage collaborator, and
//! clean up the temporary archive.

use nrp_storage::StorageClient;
use std::io::Write;
use std::path::Path;

fn find_log_files(sim_dir: &Path) -> Vec<std::path::PathBuf> {
    let mut found = Vec::new();
    for pattern in ["*.log", ".*.log"] {
        let full_pattern = sim_dir.join(pattern);
        let Some(pattern_str) = full_pattern.to_str() else { continue };
        let Ok(paths) = glob::glob(pattern_str) else { continue };
        for entry in paths.flatten() {
            if entry.is_file() {
                found.push(entry);
            }
        }
    }
    found
}

/// Zip every log file found in `sim_dir` (flat, no path preservation) and
/// upload it through `storage` as `simulation_<sim_id>.log.zip`. A no-op if
/// no log files exist. Returns whether an upload was attempted and its
/// outcome is only logged — callers must not let this fail teardown.
pub async fn persist_logs(
    storage: &dyn StorageClient,
    token: &str,
    experiment_id: &str,
    sim_id: &str,
    sim_dir: &Path,
) {
    let logs = find_log_files(sim_dir);
    if logs.is_empty() {
        return;
    }

    let archive_name = format!("simulation_{sim_id}.log.zip");
    let archive_path = std::env::temp_dir().join(&archive_name);

    match build_zip(&archive_path, &logs) {
        Ok(()) => {
            match tokio::fs::read(&archive_path).await {
                Ok(bytes) => {
                    if let Err(error) = storage
                        .put_file(token, experiment_id, &archive_name, bytes, "application/octet-stream")
                        .await
                    {
                        tracing::warn!(%error, "failed to upload simulation log archive");
                    }
                }
                Err(error) => tracing::warn!(%error, "failed to read built log archive"),
            }
        }
        Err(error) => tracing::warn!(%error, "failed to build simulation log archive"),
    }
    let _ = std::fs::remove_file(&archive_path);
}

fn build_zip(archive_path: &Path, logs: &[std::path::PathBuf]) -> std::io::Result<()> {
    let file = std::fs::File::create(archive_path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options: zip::write::FileOptions<'_, ()> =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for log in logs {
        let Some(name) = log.file_name().and_then(|n| n.to_str()) else { continue };
        let contents = std::fs::read(log)?;
        zip.start_file(name, options)?;
        zip.write_all(&contents)?;
    }
    zip.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nrp_storage::FakeStorageClient;

    #[tokio::test]
    async fn persist_logs_zips_and_uploads_when_logs_exist() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("simulation_sim-1.log"), b"hello").unwrap();

        let storage = FakeStorageClient::new();
        persist_logs(&storage, "token", "exp-a", "sim-1", dir.path()).await;

        assert!(storage.uploaded("simulation_sim-1.log.zip").is_some());
    }

    #[tokio::test]
    async fn persist_logs_is_a_noop_without_logs() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FakeStorageClient::new();
        persist_logs(&storage, "token", "exp-a", "sim-1", dir.path()).await;
        assert!(storage.uploaded("simulation_sim-1.log.zip").is_none());
    }
}
