/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: Apache-2.0
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

// src/client.rs
// The rumqttc-backed broker client. Each connected client runs one
// driver task that polls the rumqttc event loop; polling is what makes
// the library connect and reconnect, so cancelling the driver task is
// what "destroy" means here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, Transport,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::LinkError;
use crate::message::{LinkEvent, MqttMessage};

const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CHANNEL_CAPACITY: usize = 64;
const TCP_DEFAULT_PORT: u16 = 1883;
const TLS_DEFAULT_PORT: u16 = 8883;

// BrokerAddress is the parsed form of an `MqttServer.Address` string.
// The raw string stays the pool key; this is only for dialing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl BrokerAddress {
    pub fn parse(address: &str) -> Result<Self, LinkError> {
        let url = url::Url::parse(address)
            .map_err(|e| LinkError::invalid_address(address, e.to_string()))?;
        let tls = match url.scheme() {
            "tcp" | "mqtt" => false,
            "ssl" | "mqtts" | "tls" => true,
            other => {
                return Err(LinkError::invalid_address(
                    address,
                    format!("unsupported scheme {other}"),
                ));
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| LinkError::invalid_address(address, "missing host"))?
            .to_string();
        let port = url.port().unwrap_or(if tls {
            TLS_DEFAULT_PORT
        } else {
            TCP_DEFAULT_PORT
        });
        Ok(Self { host, port, tls })
    }
}

// to_qos maps the store's 0..2 integer onto the protocol QoS,
// clamping anything out of range down to at-most-once.
pub fn to_qos(qos: u8) -> QoS {
    match qos {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

// BrokerClient is the seam the pool owns. Tests swap in a fake; the
// production implementation below drives rumqttc.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    fn address(&self) -> &str;

    fn is_connected(&self) -> bool;

    // connect starts the client's driver task. A no-op when already
    // started; the library reconnects on its own as long as the
    // driver is alive.
    async fn connect(&self) -> Result<(), LinkError>;

    // disconnect is fire-and-forget: it requests a clean close and
    // stops the driver without waiting for in-flight traffic.
    async fn disconnect(&self) -> Result<(), LinkError>;

    async fn subscribe(&self, topic: &str, qos: u8) -> Result<(), LinkError>;

    async fn publish(
        &self,
        topic: &str,
        qos: u8,
        retained: bool,
        payload: Vec<u8>,
    ) -> Result<(), LinkError>;

    // shutdown destroys the client: the driver task is cancelled, so
    // nothing is left that could reconnect. Idempotent.
    async fn shutdown(&self);
}

// BrokerClientFactory makes clients for the pool. Construction does
// not connect; the reconciler decides when to.
pub trait BrokerClientFactory: Send + Sync {
    fn make(
        &self,
        address: &str,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<Arc<dyn BrokerClient>, LinkError>;
}

pub struct RumqttcFactory {
    keep_alive: Duration,
}

impl Default for RumqttcFactory {
    fn default() -> Self {
        Self {
            keep_alive: DEFAULT_KEEP_ALIVE,
        }
    }
}

impl RumqttcFactory {
    pub fn new(keep_alive: Duration) -> Self {
        Self { keep_alive }
    }
}

impl BrokerClientFactory for RumqttcFactory {
    fn make(
        &self,
        address: &str,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<Arc<dyn BrokerClient>, LinkError> {
        Ok(Arc::new(RumqttcClient::new(
            address,
            self.keep_alive,
            events,
        )?))
    }
}

struct Active {
    client: AsyncClient,
    cancel: CancellationToken,
}

pub struct RumqttcClient {
    address: String,
    broker: BrokerAddress,
    keep_alive: Duration,
    events: mpsc::Sender<LinkEvent>,
    connected: Arc<AtomicBool>,
    active: tokio::sync::Mutex<Option<Active>>,
}

impl RumqttcClient {
    pub fn new(
        address: &str,
        keep_alive: Duration,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<Self, LinkError> {
        let broker = BrokerAddress::parse(address)?;
        Ok(Self {
            address: address.to_string(),
            broker,
            keep_alive,
            events,
            connected: Arc::new(AtomicBool::new(false)),
            active: tokio::sync::Mutex::new(None),
        })
    }

    fn options(&self) -> MqttOptions {
        let client_id = format!("qmqtt-bridge-{}-{}", self.broker.host, self.broker.port);
        let mut options = MqttOptions::new(client_id, self.broker.host.clone(), self.broker.port);
        options.set_keep_alive(self.keep_alive);
        if self.broker.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }

    // driver polls the event loop until cancelled. Polling is what
    // performs connects and reconnects; errors back off with capped
    // doubling so a dead broker doesn't busy-loop us.
    async fn driver(
        address: String,
        mut event_loop: EventLoop,
        events: mpsc::Sender<LinkEvent>,
        connected: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) {
        let mut backoff = PollBackoff::new();
        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = event_loop.poll() => polled,
            };
            match polled {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != ConnectReturnCode::Success {
                        warn!("broker {address} refused connection: {:?}", ack.code);
                        continue;
                    }
                    backoff.reset();
                    connected.store(true, Ordering::SeqCst);
                    if events
                        .send(LinkEvent::ConnectionEstablished {
                            address: address.clone(),
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let message = MqttMessage::from(&publish);
                    if events
                        .send(LinkEvent::MessageReceived {
                            address: address.clone(),
                            message,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    // Only the transition out of connected is reported;
                    // every further failed poll is the same outage.
                    if connected.swap(false, Ordering::SeqCst)
                        && events
                            .send(LinkEvent::ConnectionLost {
                                address: address.clone(),
                                error: e.to_string(),
                            })
                            .await
                            .is_err()
                    {
                        break;
                    }
                    let delay = backoff.next_delay();
                    debug!("poll error on {address}: {e}; retrying in {delay:?}");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        connected.store(false, Ordering::SeqCst);
        debug!("driver for {address} stopped");
    }
}

#[async_trait]
impl BrokerClient for RumqttcClient {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<(), LinkError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Ok(());
        }
        let (client, event_loop) = AsyncClient::new(self.options(), REQUEST_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        tokio::spawn(Self::driver(
            self.address.clone(),
            event_loop,
            self.events.clone(),
            self.connected.clone(),
            cancel.clone(),
        ));
        *active = Some(Active { client, cancel });
        info!("broker client for {} started", self.address);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        let Some(active) = self.active.lock().await.take() else {
            return Ok(());
        };
        // Best effort close; the socket drops with the driver either way.
        if let Err(e) = active.client.disconnect().await {
            debug!("disconnect request for {} not delivered: {e}", self.address);
        }
        active.cancel.cancel();
        self.connected.store(false, Ordering::SeqCst);
        info!("broker client for {} disconnected", self.address);
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: u8) -> Result<(), LinkError> {
        let active = self.active.lock().await;
        let Some(active) = active.as_ref() else {
            return Err(LinkError::NotStarted(self.address.clone()));
        };
        active.client.subscribe(topic, to_qos(qos)).await?;
        debug!("subscribed to {topic} on {}", self.address);
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        qos: u8,
        retained: bool,
        payload: Vec<u8>,
    ) -> Result<(), LinkError> {
        let active = self.active.lock().await;
        let Some(active) = active.as_ref() else {
            return Err(LinkError::NotStarted(self.address.clone()));
        };
        active
            .client
            .publish(topic, to_qos(qos), retained, payload)
            .await?;
        Ok(())
    }

    async fn shutdown(&self) {
        if let Some(active) = self.active.lock().await.take() {
            active.cancel.cancel();
        }
        self.connected.store(false, Ordering::SeqCst);
        debug!("broker client for {} destroyed", self.address);
    }
}

// Capped doubling backoff between failed event-loop polls,
// 100ms up to 30s.
struct PollBackoff {
    current: Duration,
    max: Duration,
}

impl PollBackoff {
    fn new() -> Self {
        Self {
            current: Duration::from_millis(100),
            max: Duration::from_secs(30),
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = std::cmp::min(self.current * 2, self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = Duration::from_millis(100);
    }
}
