// SPDX-License-Identifier: Apache-2.0

//! An in-process [`Broker`] used by tests to exercise two synchronizer
//! instances against each other without a running MQTT server. Mirrors
//! real broker behavior closely enough to matter: a client that
//! subscribes to a topic it publishes on receives its own messages back
//! (echo suppression is the synchronizer's job, not the broker's), and
//! retained messages are delivered to subscribers that attach later.

use crate::broker::{Broker, BrokerError, IncomingMessage};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct TopicState {
    retained: Option<Vec<u8>>,
    subscribers: Vec<mpsc::Sender<IncomingMessage>>,
}

/// Shared hub backing a set of [`FakeBroker`] instances. Clone to hand the
/// same in-memory bus to both ends of a simulated lifecycle pair.
#[derive(Clone, Default)]
pub struct FakeHub(Arc<Mutex<HashMap<String, TopicState>>>);

impl FakeHub {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct FakeBroker {
    hub: FakeHub,
    tx: mpsc::Sender<IncomingMessage>,
    rx: mpsc::Receiver<IncomingMessage>,
}

impl FakeBroker {
    pub fn new(hub: FakeHub) -> Self {
        let (tx, rx) = mpsc::channel(256);
        Self { hub, tx, rx }
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn connect(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BrokerError> {
        let mut hub = self.hub.0.lock();
        let state = hub.entry(topic.to_string()).or_default();
        if retain {
            state.retained = if payload.is_empty() { None } else { Some(payload.to_vec()) };
        }
        state.subscribers.retain(|sub| {
            sub.try_send(IncomingMessage { topic: topic.to_string(), payload: payload.to_vec() })
                .is_ok()
        });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        let mut hub = self.hub.0.lock();
        let state = hub.entry(topic.to_string()).or_default();
        state.subscribers.push(self.tx.clone());
        if let Some(retained) = state.retained.clone() {
            let _ = self.tx.try_send(IncomingMessage { topic: topic.to_string(), payload: retained });
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<IncomingMessage> {
        self.rx.recv().await
    }
}
