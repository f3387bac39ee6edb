// SPDX-License-Identifier: Apache-2.0

//! The lifecycle synchronizer (C2): bidirectional replication of FSM
//! transitions over a broker topic, with retained-message bootstrap,
//! echo suppression, and divergence recovery — see spec §4.2.

use crate::broker::Broker;
use crate::error::SyncError;
use crate::message::SyncMessage;
use nrp_core::{Lifecycle, LifecycleHooks, LifecycleState, LifecycleTrigger, StateChange};
use std::collections::HashSet;
use tokio::sync::mpsc;

/// Builds the per-simulation lifecycle topic, honoring an optional broker
/// namespace prefix (spec §6: "prefix optional, configured via env").
pub fn lifecycle_topic(prefix: &str, sim_id: &str) -> String {
    topic(prefix, sim_id, "lifecycle")
}

/// The 1 Hz status topic (spec §6), published by the harness's status
/// ticker — not part of the synchronizer proper, but sharing its prefixing
/// rule, so it lives alongside `lifecycle_topic`.
pub fn status_topic(prefix: &str, sim_id: &str) -> String {
    topic(prefix, sim_id, "status")
}

/// The on-error topic (spec §6), published by the harness when the script
/// fails to compile, the engine fails to load, or the script raises.
pub fn runtime_error_topic(prefix: &str, sim_id: &str) -> String {
    topic(prefix, sim_id, "runtime_error")
}

fn topic(prefix: &str, sim_id: &str, suffix: &str) -> String {
    if prefix.is_empty() {
        format!("nrp_simulation/{sim_id}/{suffix}")
    } else {
        format!("{prefix}/nrp_simulation/{sim_id}/{suffix}")
    }
}

/// A synchronizer instance. Each side of the backend/worker pair owns one,
/// configured with the subset of destination states it is authoritative
/// for publishing (spec: "Backend propagates transitions toward running
/// states only; worker propagates only `completed` and `failed`").
pub struct Synchronizer<B: Broker> {
    node_id: String,
    topic: String,
    propagated: HashSet<LifecycleState>,
    broker: B,
}

impl<B: Broker> Synchronizer<B> {
    pub fn new(
        node_id: impl Into<String>,
        topic: impl Into<String>,
        propagated: HashSet<LifecycleState>,
        broker: B,
    ) -> Self {
        Self { node_id: node_id.into(), topic: topic.into(), propagated, broker }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Connect and subscribe. `clear_retained` mirrors the flag `shutdown`
    /// takes: when set, any stale retained message on the topic is cleared
    /// (by publishing an empty retained payload) before subscribing, so a
    /// freshly (re)connecting node never bootstraps off a leftover message
    /// from a previous run (spec §4.2's connect hook).
    pub async fn connect(&mut self, clear_retained: bool) -> Result<(), SyncError> {
        self.broker.connect().await?;
        if clear_retained {
            let _ = self.broker.publish(&self.topic, &[], true).await;
        }
        self.broker.subscribe(&self.topic).await?;
        Ok(())
    }

    /// Connect without subscribing, for an instance dedicated to
    /// [`Synchronizer::publish_outgoing`]: a process drives its FSM's
    /// incoming half and outgoing half from two instances (one `recv`
    /// loop, one `publish_outgoing` caller) sharing the same `node_id` and
    /// topic but separate broker connections, since `recv` takes `&mut
    /// self` while transitions can fire from other tasks. Subscribing the
    /// publish-only side too would pile messages up in a channel nothing
    /// ever drains.
    pub async fn connect_publisher(&mut self) -> Result<(), SyncError> {
        self.broker.connect().await?;
        Ok(())
    }

    /// Clear any retained message and disconnect. Idempotent per spec.
    pub async fn shutdown(&mut self, clear_retained: bool) -> Result<(), SyncError> {
        if clear_retained {
            let _ = self.broker.publish(&self.topic, &[], true).await;
        }
        self.broker.disconnect().await?;
        Ok(())
    }

    /// A change-listener suitable for [`Lifecycle::set_on_change`]: forwards
    /// every transition to an async task (via `tx`) that calls
    /// [`Synchronizer::publish_outgoing`], since the FSM's callback itself
    /// must stay synchronous.
    pub fn change_listener(tx: mpsc::UnboundedSender<StateChange>) -> Box<dyn FnMut(&StateChange) + Send> {
        Box::new(move |change| {
            let _ = tx.send(*change);
        })
    }

    /// Publish a state change if it is non-silent and its destination is in
    /// our propagation set. Retain is set iff the *source* was `created`
    /// (spec §4.2's bootstrap rule).
    pub async fn publish_outgoing(&self, change: &StateChange) -> Result<(), SyncError> {
        if change.silent || !self.propagated.contains(&change.destination) {
            return Ok(());
        }
        let message = SyncMessage {
            source_node: self.node_id.clone(),
            source_state: change.source,
            event: change.trigger,
            target_state: change.destination,
        };
        let retain = change.source == LifecycleState::Created;
        let payload = serde_json::to_vec(&message)?;
        self.broker.publish(&self.topic, &payload, retain).await?;
        Ok(())
    }

    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.broker.recv().await.map(|m| m.payload)
    }

    /// Apply an incoming payload to the given FSM, per spec §4.2's
    /// five-step incoming algorithm. Pure and synchronous so it is testable
    /// without a broker or a runtime.
    pub fn apply_incoming<H: LifecycleHooks>(&self, payload: &[u8], fsm: &mut Lifecycle<H>) {
        if payload.is_empty() {
            return;
        }
        let message: SyncMessage = match serde_json::from_slice(payload) {
            Ok(m) => m,
            Err(error) => {
                tracing::debug!(%error, "dropping malformed synchronization message");
                return;
            }
        };

        if message.source_node == self.node_id {
            return; // echo suppression (I4)
        }

        if fsm.state() != message.source_state {
            tracing::warn!(
                local = %fsm.state(),
                remote = %message.source_state,
                "lifecycle divergence observed, forcing local state to match peer",
            );
            fsm.force_state(message.source_state);
        }

        if let Err(error) = fsm.trigger_silent(message.event) {
            tracing::warn!(%error, "incoming trigger failed, forcing target state and failing");
            fsm.force_state(message.target_state);
            let _ = fsm.trigger(LifecycleTrigger::Failed);
        }
    }
}
