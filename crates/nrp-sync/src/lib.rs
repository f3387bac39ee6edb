// SPDX-License-Identifier: Apache-2.0

//! Broker-mediated replication of the lifecycle FSM (C2).

pub mod broker;
pub mod error;
pub mod message;
pub mod mqtt;
pub mod synchronizer;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use broker::{Broker, BrokerError, IncomingMessage};
pub use error::SyncError;
pub use message::SyncMessage;
pub use mqtt::MqttBroker;
pub use synchronizer::{lifecycle_topic, runtime_error_topic, status_topic, Synchronizer};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBroker, FakeHub};

#[cfg(test)]
mod tests;
