// SPDX-License-Identifier: Apache-2.0

use nrp_core::{LifecycleState, LifecycleTrigger};
use serde::{Deserialize, Serialize};

/// The synchronization message published on `nrp_simulation/<sim_id>/lifecycle`
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    pub source_node: String,
    pub source_state: LifecycleState,
    pub event: LifecycleTrigger,
    pub target_state: LifecycleState,
}
