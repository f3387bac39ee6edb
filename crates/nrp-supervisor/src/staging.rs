// SPDX-License-Identifier: Apache-2.0

//! Per-simulation working directory staging and teardown (spec §3, §4.4).

use crate::error::SupervisorError;
use std::path::{Path, PathBuf};

/// Create a fresh `nrp.<sim_id>.<rand>` directory under the system temp
/// root and re-point the well-known symlink at it, clearing any stale link
/// left by a previous simulation.
pub fn stage_directory(sim_id: &str, symlink_target: &Path) -> Result<PathBuf, SupervisorError> {
    let dir_name = format!("nrp.{sim_id}.{}", nanoid::nanoid!(8));
    let dir = std::env::temp_dir().join(dir_name);
    std::fs::create_dir_all(&dir)?;

    if symlink_target.exists() || symlink_target.symlink_metadata().is_ok() {
        let _ = std::fs::remove_file(symlink_target);
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(&dir, symlink_target)?;
    #[cfg(not(unix))]
    std::fs::create_dir_all(symlink_target)?;

    Ok(dir)
}

/// Remove a staged directory. Logged, not fatal — teardown proceeds
/// regardless (spec §4.4: log upload failure must not block teardown).
pub fn teardown_directory(dir: &Path) {
    if let Err(error) = std::fs::remove_dir_all(dir) {
        tracing::warn!(dir = %dir.display(), %error, "failed to remove staged simulation directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_directory_points_symlink_at_fresh_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let symlink = tmp.path().join("current");
        let dir = stage_directory("sim-1", &symlink).unwrap();
        assert!(dir.exists());
        assert_eq!(std::fs::canonicalize(&symlink).unwrap(), std::fs::canonicalize(&dir).unwrap());
    }

    #[test]
    fn stage_directory_replaces_stale_symlink() {
        let tmp = tempfile::tempdir().unwrap();
        let symlink = tmp.path().join("current");
        let _first = stage_directory("sim-1", &symlink).unwrap();
        let second = stage_directory("sim-2", &symlink).unwrap();
        assert_eq!(std::fs::canonicalize(&symlink).unwrap(), std::fs::canonicalize(&second).unwrap());
    }
}
