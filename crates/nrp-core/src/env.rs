// SPDX-License-Identifier: Apache-2.0

//! Centralized environment variable access (spec §6), shared by the
//! backend, the worker, and the supervisor so that every process resolves
//! the same defaults the same way.

use std::path::PathBuf;
use std::time::Duration;

/// Install root, used to locate the worker entry point.
pub fn hbp_root() -> Option<PathBuf> {
    std::env::var_os("HBP").map(PathBuf::from)
}

/// Symlink target updated to point at the currently staged simulation
/// directory (spec §3's "Simulation directory").
pub fn simulation_dir_symlink() -> PathBuf {
    std::env::var_os("NRP_SIMULATION_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp/nrp_simulation"))
}

/// `host:port` of the MQTT broker (default `localhost:1883`, spec §6).
pub fn mqtt_broker_address() -> String {
    std::env::var("NRP_MQTT_BROKER_ADDRESS").unwrap_or_else(|_| "localhost:1883".to_string())
}

/// Optional broker namespace prefix applied to every lifecycle/status/
/// error topic (spec §4.2: "optionally prefixed with a broker namespace").
pub fn broker_topic_prefix() -> String {
    std::env::var("NRP_BROKER_TOPIC_PREFIX").unwrap_or_default()
}

/// Base URL of the storage collaborator, built from `STORAGE_ADDRESS` and
/// `STORAGE_PORT` (spec §6).
pub fn storage_base_url() -> String {
    let address = std::env::var("STORAGE_ADDRESS").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("STORAGE_PORT").unwrap_or_else(|_| "8080".to_string());
    format!("http://{address}:{port}")
}

/// Graceful-then-forced termination grace period (default 30s, spec §4.4's `T_term`).
pub fn termination_grace() -> Duration {
    std::env::var("NRP_TERM_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30))
}

/// Executor-thread join timeout on `stop` (default 20s, spec §4.5).
pub fn executor_join_timeout() -> Duration {
    std::env::var("NRP_EXECUTOR_JOIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(20))
}

/// Terminal-state grace period before the `shutdown` hook runs (spec §4.1).
pub fn terminal_shutdown_grace() -> Duration {
    std::env::var("NRP_SHUTDOWN_GRACE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(1))
}

/// Whether the synchronizer clears its retained message on shutdown — the
/// parameter-controlled variant chosen as canonical (spec §9).
pub fn clear_synchronization_topic() -> bool {
    std::env::var("NRP_CLEAR_SYNCHRONIZATION_TOPIC")
        .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
        .unwrap_or(true)
}
