// SPDX-License-Identifier: Apache-2.0

//! Backend-only environment variables (spec §6's ambient stack): the REST
//! listen address, the worker binary location, and the optional
//! background sweep's cadence. Shared `nrp-core::env` covers everything
//! both processes need; this module covers what only the backend does.

use std::time::Duration;

/// `host:port` the REST surface binds to.
pub fn listen_address() -> String {
    std::env::var("NRP_BACKEND_LISTEN_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
}

/// Path (or bare name resolved via `PATH`) of the `nrp-simulation-server`
/// binary the supervisor spawns as the worker child process.
pub fn simulation_server_binary() -> String {
    std::env::var("NRP_SIMULATION_SERVER_BIN").unwrap_or_else(|_| "nrp-simulation-server".to_string())
}

/// Whether the background sweep (spec §4.3) runs at all. Off by default.
pub fn sweep_enabled() -> bool {
    std::env::var("NRP_SWEEP_ENABLED")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn sweep_interval() -> Duration {
    std::env::var("NRP_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(300))
}

/// Age after which a non-final record is swept to `stopped` (default 24h).
pub fn sweep_max_age() -> chrono::Duration {
    let secs = std::env::var("NRP_SWEEP_MAX_AGE_SECS")
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .unwrap_or(24 * 60 * 60);
    chrono::Duration::seconds(secs)
}
