// SPDX-License-Identifier: Apache-2.0

//! The pub/sub abstraction the synchronizer talks to. [`MqttBroker`] is the
//! production implementation; [`crate::fake::FakeBroker`] (behind
//! `test-support`) lets two synchronizer instances exchange messages
//! in-process without a running broker.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker connect failed: {0}")]
    Connect(String),
    #[error("broker publish failed: {0}")]
    Publish(String),
    #[error("broker subscribe failed: {0}")]
    Subscribe(String),
    #[error("broker is not connected")]
    NotConnected,
}

/// One message delivered on a subscribed topic.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait Broker: Send {
    async fn connect(&mut self) -> Result<(), BrokerError>;
    async fn disconnect(&mut self) -> Result<(), BrokerError>;

    /// Publish `payload` on `topic`. When `retain` is set the broker keeps
    /// the message available to subscribers that attach later (used only
    /// for the `created`-sourced lifecycle bootstrap, per spec §4.2).
    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BrokerError>;

    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError>;

    /// Wait for the next message on any subscribed topic. Returns `None`
    /// once the underlying connection has been shut down.
    async fn recv(&mut self) -> Option<IncomingMessage>;
}
