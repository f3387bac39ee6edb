// SPDX-License-Identifier: Apache-2.0

//! Ownership check backing the REST surface's view/modify permissions
//! (spec §4.3's Permissions note), simplified to the bearer token alone per
//! spec §1's Non-goals ("authentication beyond an opaque bearer token
//! forwarded to the storage collaborator" is out of scope). The token
//! supplied on `POST /simulation` becomes the record's `owner`; every later
//! request is compared against it. A record created with no token has an
//! empty owner and is treated as unclaimed.

use nrp_core::SimulationRecord;

pub fn can_view(record: &SimulationRecord, requester: &str) -> bool {
    record.owner.is_empty() || record.owner == requester
}

pub fn can_modify(record: &SimulationRecord, requester: &str) -> bool {
    can_view(record, requester)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nrp_core::{LifecycleState, SimulationId};

    fn record(owner: &str) -> SimulationRecord {
        SimulationRecord {
            id: SimulationId::new(),
            seq: 0,
            experiment_id: "exp-a".to_string(),
            owner: owner.to_string(),
            created_at: Utc::now(),
            main_script: "main_script.py".to_string(),
            experiment_configuration: "simulation_config.json".to_string(),
            token: owner.to_string(),
            ctx_id: String::new(),
            broker_topic_prefix: String::new(),
            state: LifecycleState::Created,
        }
    }

    #[test]
    fn owner_can_view_and_modify_their_own_record() {
        let record = record("alice-token");
        assert!(can_view(&record, "alice-token"));
        assert!(can_modify(&record, "alice-token"));
    }

    #[test]
    fn other_requester_is_denied() {
        let record = record("alice-token");
        assert!(!can_view(&record, "bob-token"));
        assert!(!can_modify(&record, "bob-token"));
    }

    #[test]
    fn unclaimed_record_is_viewable_by_anyone() {
        let record = record("");
        assert!(can_view(&record, "anyone"));
        assert!(can_modify(&record, "anyone"));
    }
}
