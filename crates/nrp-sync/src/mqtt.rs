// SPDX-License-Identifier: Apache-2.0

//! Production [`Broker`] backed by `rumqttc`.

use crate::broker::{Broker, BrokerError, IncomingMessage};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const KEEP_ALIVE: Duration = Duration::from_secs(10);

pub struct MqttBroker {
    client_id: String,
    address: String,
    client: Option<AsyncClient>,
    rx: Option<mpsc::Receiver<IncomingMessage>>,
    pump: Option<JoinHandle<()>>,
}

impl MqttBroker {
    /// `address` is `host:port`, e.g. `localhost:1883` (spec §6 default,
    /// overridden by `NRP_MQTT_BROKER_ADDRESS`).
    pub fn new(client_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            address: address.into(),
            client: None,
            rx: None,
            pump: None,
        }
    }

    fn parse_address(&self) -> Result<(String, u16), BrokerError> {
        let (host, port) = self
            .address
            .rsplit_once(':')
            .ok_or_else(|| BrokerError::Connect(format!("invalid broker address `{}`", self.address)))?;
        let port: u16 = port
            .parse()
            .map_err(|_| BrokerError::Connect(format!("invalid broker port in `{}`", self.address)))?;
        Ok((host.to_string(), port))
    }
}

#[async_trait]
impl Broker for MqttBroker {
    async fn connect(&mut self) -> Result<(), BrokerError> {
        let (host, port) = self.parse_address()?;
        let mut options = MqttOptions::new(self.client_id.clone(), host, port);
        options.set_keep_alive(KEEP_ALIVE);

        let (client, mut event_loop) = AsyncClient::new(options, EVENT_CHANNEL_CAPACITY);
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let pump = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = IncomingMessage {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                        };
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(error) => {
                        tracing::warn!(%error, "mqtt event loop terminated");
                        break;
                    }
                }
            }
        });

        self.client = Some(client);
        self.rx = Some(rx);
        self.pump = Some(pump);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        if let Some(client) = self.client.take() {
            client
                .disconnect()
                .await
                .map_err(|e| BrokerError::Connect(e.to_string()))?;
        }
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.rx = None;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], retain: bool) -> Result<(), BrokerError> {
        let client = self.client.as_ref().ok_or(BrokerError::NotConnected)?;
        client
            .publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())
            .await
            .map_err(|e| BrokerError::Publish(e.to_string()))
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        let client = self.client.as_ref().ok_or(BrokerError::NotConnected)?;
        client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| BrokerError::Subscribe(e.to_string()))
    }

    async fn recv(&mut self) -> Option<IncomingMessage> {
        self.rx.as_mut()?.recv().await
    }
}
