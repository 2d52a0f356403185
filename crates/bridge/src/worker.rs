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

// src/worker.rs
// The bridge worker: the single task that owns the client pool, the
// notification tokens and the leadership latch, and performs every
// store mutation. Broker driver tasks and the store reader only feed
// its channels.

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mqtt_link::{LinkEvent, MqttMessage};
use qstore::{
    Condition, EntityId, LeadershipEvent, Notification, NotifyConfig, NotifyToken, Store,
    StoreError, TokenId, WritePolicy,
};

use crate::devices::DeviceRegistry;
use crate::errors::BridgeError;
use crate::pool::ClientPool;

// Route ties a registered notification token back to the reaction it
// drives.
#[derive(Clone, Debug)]
enum Route {
    SchemaUpdate,
    AddressChanged,
    EnabledChanged,
    TxMessage,
    Device(String),
}

// TxMessage is the JSON document carried by MqttServer.TxMessage.
#[derive(Debug, Deserialize)]
struct TxMessage {
    topic: String,
    #[serde(default)]
    qos: u8,
    #[serde(default)]
    retained: bool,
    #[serde(default)]
    payload: serde_json::Value,
}

pub struct BridgeWorker {
    store: Store,
    registry: DeviceRegistry,
    pool: ClientPool,
    tokens: Vec<NotifyToken>,
    routes: std::collections::HashMap<TokenId, Route>,
    events_rx: mpsc::Receiver<LinkEvent>,
    notifications_rx: mpsc::Receiver<Notification>,
    leadership_rx: mpsc::Receiver<LeadershipEvent>,
    is_leader: bool,
    shutdown: CancellationToken,
}

impl BridgeWorker {
    pub fn new(
        store: Store,
        registry: DeviceRegistry,
        pool: ClientPool,
        events_rx: mpsc::Receiver<LinkEvent>,
        shutdown: CancellationToken,
    ) -> Result<Self, BridgeError> {
        let notifications_rx = store.take_notifications().ok_or(BridgeError::ChannelsTaken)?;
        let leadership_rx = store
            .take_leadership_events()
            .ok_or(BridgeError::ChannelsTaken)?;
        Ok(Self {
            store,
            registry,
            pool,
            tokens: Vec::new(),
            routes: std::collections::HashMap::new(),
            events_rx,
            notifications_rx,
            leadership_rx,
            is_leader: false,
            shutdown,
        })
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    pub fn pool(&self) -> &ClientPool {
        &self.pool
    }

    // run drives the worker until shutdown. Leadership changes win
    // over pending notifications and broker events.
    pub async fn run(mut self) {
        info!("bridge worker started");
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(event) = self.leadership_rx.recv() => {
                    self.on_leadership(event).await;
                }
                Some(notification) = self.notifications_rx.recv() => {
                    self.on_notification(notification).await;
                }
                Some(event) = self.events_rx.recv() => {
                    self.on_event(event).await;
                    self.drain_events().await;
                }
                else => break,
            }
        }
        if self.is_leader {
            // Same teardown as losing an election: close the sockets
            // and leave the observed state false.
            self.on_lost_leadership().await;
        }
        info!("bridge worker stopped");
    }

    // pump performs one cooperative pass over everything currently
    // queued, without blocking. run() is pump() plus waiting.
    pub async fn pump(&mut self) {
        while let Ok(event) = self.leadership_rx.try_recv() {
            self.on_leadership(event).await;
        }
        while let Ok(notification) = self.notifications_rx.try_recv() {
            self.on_notification(notification).await;
        }
        self.drain_events().await;
    }

    async fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.on_event(event).await;
        }
    }

    pub async fn on_leadership(&mut self, event: LeadershipEvent) {
        match event {
            LeadershipEvent::Became => {
                info!("became leader");
                self.is_leader = true;
                self.reinitialize().await;
            }
            LeadershipEvent::Lost => {
                warn!("lost leadership");
                self.is_leader = false;
                self.on_lost_leadership().await;
            }
        }
    }

    // reinitialize rebinds every notification and reconciles the pool
    // against the current MqttServer set. Safe to run repeatedly.
    //
    // Clients whose server entity no longer exists are left pooled
    // (idle); only an address change retires them.
    async fn reinitialize(&mut self) {
        debug!("reinitializing notifications and clients");
        for token in self.tokens.drain(..) {
            let _ = token.unbind().await;
        }
        self.routes.clear();

        self.register(
            NotifyConfig::new("Root", "SchemaUpdateTrigger"),
            Route::SchemaUpdate,
        )
        .await;
        self.register(
            NotifyConfig::new("MqttServer", "Address")
                .on_change()
                .with_context(["Enabled"]),
            Route::AddressChanged,
        )
        .await;
        self.register(
            NotifyConfig::new("MqttServer", "Enabled")
                .on_change()
                .with_context(["Address"]),
            Route::EnabledChanged,
        )
        .await;
        self.register(
            NotifyConfig::new("MqttServer", "TxMessage").with_context(["Address"]),
            Route::TxMessage,
        )
        .await;
        let device_watches: Vec<(NotifyConfig, Route)> = self
            .registry
            .all()
            .iter()
            .flat_map(|adapter| {
                let model = adapter.model().to_string();
                adapter
                    .notification_config()
                    .into_iter()
                    .map(move |config| (config, Route::Device(model.clone())))
            })
            .collect();
        for (config, route) in device_watches {
            self.register(config, route).await;
        }

        let servers = match self.store.query_all("MqttServer").await {
            Ok(servers) => servers,
            Err(e) => {
                error!("failed to query MqttServer entities: {e}");
                return;
            }
        };
        for server in servers {
            let address = match self.store.read_string(&server.id, "Address").await {
                Ok(address) => address,
                Err(e) => {
                    error!("server {} has no readable Address: {e}", server.id);
                    continue;
                }
            };
            let enabled = self
                .store
                .read_bool(&server.id, "Enabled")
                .await
                .unwrap_or(false);
            let client = match self.pool.install(&address) {
                Ok(client) => client,
                Err(e) => {
                    error!("cannot pool client for {address}: {e}");
                    continue;
                }
            };
            if enabled && !client.is_connected() && self.is_leader {
                if let Err(e) = client.connect().await {
                    error!("failed to connect client for {address}: {e}");
                }
            }
        }
    }

    async fn register(&mut self, config: NotifyConfig, route: Route) {
        match self.store.notify(config).await {
            Ok(token) => {
                self.routes.insert(token.id().clone(), route);
                self.tokens.push(token);
            }
            Err(e) => error!("failed to register notification: {e}"),
        }
    }

    // on_lost_leadership destroys every pooled client (their driver
    // tasks die with them, so nothing reconnects) and marks the
    // enabled servers disconnected.
    async fn on_lost_leadership(&mut self) {
        for client in self.pool.drain() {
            client.shutdown().await;
        }
        let servers = match self
            .store
            .query("MqttServer", vec![Condition::equals("Enabled", true)])
            .await
        {
            Ok(servers) => servers,
            Err(e) => {
                error!("failed to query enabled servers: {e}");
                return;
            }
        };
        let mut batch = self.store.batch();
        for server in &servers {
            batch.set(&server.id, "IsConnected", false);
        }
        if let Err(e) = batch.commit().await {
            error!("failed to mark servers disconnected: {e}");
        }
    }

    pub async fn on_notification(&mut self, notification: Notification) {
        if !self.is_leader {
            debug!("not leader, ignoring notification for {}", notification.field);
            return;
        }
        let Some(route) = self.routes.get(&notification.token).cloned() else {
            warn!("notification for unknown token {}", notification.token);
            return;
        };
        match route {
            Route::SchemaUpdate => {
                info!("schema updated, reinitializing");
                self.reinitialize().await;
            }
            Route::AddressChanged => self.on_address_changed(notification).await,
            Route::EnabledChanged => self.on_enabled_changed(notification).await,
            Route::TxMessage => self.on_tx_message(notification).await,
            Route::Device(model) => self.on_device_trigger(&model, notification).await,
        }
    }

    async fn on_address_changed(&mut self, notification: Notification) {
        let Some(previous) = notification.previous.as_str() else {
            warn!("address change without previous address");
            return;
        };
        let Some(current) = notification.current.as_str().map(str::to_string) else {
            warn!("address change without current address");
            return;
        };
        let enabled = notification
            .context(0)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        info!(
            "server {} address changed {previous} -> {current}",
            notification.entity
        );
        if let Some(old) = self.pool.remove(previous) {
            old.shutdown().await;
        }
        let client = match self.pool.install(&current) {
            Ok(client) => client,
            Err(e) => {
                error!("cannot pool client for {current}: {e}");
                return;
            }
        };
        if enabled {
            if let Err(e) = client.connect().await {
                error!("failed to connect client for {current}: {e}");
            }
        }
    }

    async fn on_enabled_changed(&mut self, notification: Notification) {
        let Some(address) = notification.context(0).and_then(|v| v.as_str()) else {
            warn!("enable toggle without address context");
            return;
        };
        let enabled = notification.current.as_bool().unwrap_or(false);
        let Some(client) = self.pool.get(address) else {
            error!("no pooled client for {address}");
            return;
        };
        if enabled {
            info!("enabling server at {address}");
            if let Err(e) = client.connect().await {
                error!("failed to connect client for {address}: {e}");
            }
        } else {
            info!("disabling server at {address}");
            if let Err(e) = client.disconnect().await {
                error!("failed to disconnect client for {address}: {e}");
            }
            // A deliberate close emits no ConnectionLost event, so the
            // observed state is corrected here.
            if let Err(e) = self
                .store
                .write_with(
                    &notification.entity,
                    "IsConnected",
                    false,
                    WritePolicy::Changes,
                )
                .await
            {
                error!("failed to clear IsConnected: {e}");
            }
        }
    }

    async fn on_tx_message(&mut self, notification: Notification) {
        let Some(address) = notification
            .context(0)
            .and_then(|v| v.as_str())
            .map(str::to_string)
        else {
            warn!("TxMessage without address context");
            return;
        };
        let Some(raw) = notification.current.as_str() else {
            warn!("TxMessage is not a string field");
            return;
        };
        let message: TxMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("undeliverable TxMessage on {address}: {e}");
                return;
            }
        };
        let payload = message.payload.to_string().into_bytes();
        self.publish(
            &address,
            &message.topic,
            message.qos,
            message.retained,
            payload,
        )
        .await;
    }

    async fn on_device_trigger(&mut self, model: &str, notification: Notification) {
        let Some(adapter) = self.registry.find(model) else {
            warn!("no adapter for model {model}");
            return;
        };
        let mut publishes = Vec::new();
        adapter.process_notification(&notification, &mut publishes);
        for request in publishes {
            self.publish(
                &request.address,
                &request.topic,
                request.qos,
                request.retained,
                request.payload,
            )
            .await;
        }
    }

    // publish is the one outbound path. Accounting per attempt: a
    // publish with no connected client counts one drop per matching
    // server, a delivered publish counts one send.
    async fn publish(&self, address: &str, topic: &str, qos: u8, retained: bool, payload: Vec<u8>) {
        let Some(client) = self.pool.get(address) else {
            error!("no pooled client for {address}");
            return;
        };
        let servers = match self
            .store
            .query("MqttServer", vec![Condition::equals("Address", address)])
            .await
        {
            Ok(servers) => servers,
            Err(e) => {
                error!("failed to query servers at {address}: {e}");
                return;
            }
        };
        if !client.is_connected() {
            debug!("dropping publish to {topic}: {address} is not connected");
            for server in &servers {
                self.bump(&server.id, "TotalDropped").await;
            }
            return;
        }
        match client.publish(topic, qos, retained, payload).await {
            Ok(()) => {
                for server in &servers {
                    self.bump(&server.id, "TotalSent").await;
                }
            }
            Err(e) => {
                warn!("publish to {topic} on {address} failed: {e}");
                if !client.is_connected() {
                    for server in &servers {
                        self.bump(&server.id, "TotalDropped").await;
                    }
                }
            }
        }
    }

    // bump is a read-modify-write increment. Safe because this worker
    // is the only writer of these counters.
    async fn bump(&self, entity: &EntityId, field: &str) {
        let current = match self.store.read(entity, field).await {
            Ok(value) => value.as_i64().unwrap_or(0),
            Err(StoreError::NoSuchField { .. }) => 0,
            Err(e) => {
                error!("failed to read counter {field} on {entity}: {e}");
                return;
            }
        };
        if let Err(e) = self.store.write(entity, field, current + 1).await {
            error!("failed to bump {field} on {entity}: {e}");
        }
    }

    pub async fn on_event(&mut self, event: LinkEvent) {
        if !self.is_leader {
            debug!("not leader, ignoring event from {}", event.address());
            return;
        }
        match event {
            LinkEvent::ConnectionEstablished { address } => {
                self.on_connection_established(&address).await;
            }
            LinkEvent::ConnectionLost { address, error } => {
                self.on_connection_lost(&address, &error).await;
            }
            LinkEvent::MessageReceived { address, message } => {
                self.on_message_received(&address, message).await;
            }
        }
    }

    // Subscriptions are installed here, on every establishment, so
    // they come back after each library-side reconnect.
    async fn on_connection_established(&mut self, address: &str) {
        let Some(client) = self.pool.get(address) else {
            warn!("connection event for unpooled address {address}");
            return;
        };
        info!("connected to broker at {address}");
        let servers = match self
            .store
            .query("MqttServer", vec![Condition::equals("Address", address)])
            .await
        {
            Ok(servers) => servers,
            Err(e) => {
                error!("failed to query servers at {address}: {e}");
                return;
            }
        };
        for server in servers {
            if let Err(e) = self
                .store
                .write_with(&server.id, "IsConnected", true, WritePolicy::Changes)
                .await
            {
                error!("failed to set IsConnected on {}: {e}", server.id);
            }
            let children = match self.store.children(&server.id).await {
                Ok(children) => children,
                Err(e) => {
                    error!("failed to list devices of {}: {e}", server.id);
                    continue;
                }
            };
            for child in children {
                let Some(adapter) = self.registry.find(&child.entity_type) else {
                    warn!("no adapter for model {}", child.entity_type);
                    continue;
                };
                let subscriptions = match adapter.subscription_config(&self.store, &child.id).await
                {
                    Ok(subscriptions) => subscriptions,
                    Err(e) => {
                        error!("no subscription config for {}: {e}", child.id);
                        continue;
                    }
                };
                for subscription in subscriptions {
                    if let Err(e) = client
                        .subscribe(&subscription.topic, subscription.qos)
                        .await
                    {
                        error!("failed to subscribe {} on {address}: {e}", subscription.topic);
                    }
                }
            }
        }
    }

    async fn on_connection_lost(&mut self, address: &str, error: &str) {
        warn!("connection to broker at {address} lost: {error}");
        let servers = match self
            .store
            .query("MqttServer", vec![Condition::equals("Address", address)])
            .await
        {
            Ok(servers) => servers,
            Err(e) => {
                error!("failed to query servers at {address}: {e}");
                return;
            }
        };
        let mut batch = self.store.batch();
        for server in &servers {
            batch.set(&server.id, "IsConnected", false);
        }
        if let Err(e) = batch.commit().await {
            error!("failed to mark {address} disconnected: {e}");
        }
    }

    async fn on_message_received(&mut self, address: &str, message: MqttMessage) {
        let servers = match self
            .store
            .query("MqttServer", vec![Condition::equals("Address", address)])
            .await
        {
            Ok(servers) => servers,
            Err(e) => {
                error!("failed to query servers at {address}: {e}");
                return;
            }
        };
        for server in servers {
            self.bump(&server.id, "TotalReceived").await;
            let children = match self.store.children(&server.id).await {
                Ok(children) => children,
                Err(e) => {
                    error!("failed to list devices of {}: {e}", server.id);
                    continue;
                }
            };
            for child in children {
                let topic = match self.store.read_string(&child.id, "Topic").await {
                    Ok(topic) => topic,
                    Err(_) => continue,
                };
                if topic != message.topic {
                    continue;
                }
                // First matching device consumes the message.
                if let Some(adapter) = self.registry.find(&child.entity_type) {
                    if let Err(e) = adapter
                        .process_message(&message, &self.store, &child.id)
                        .await
                    {
                        error!("adapter for {} failed: {e}", child.entity_type);
                    }
                    self.write_delivery_record(&child.id, &message).await;
                } else {
                    warn!("no adapter for model {}", child.entity_type);
                }
                break;
            }
        }
    }

    // The delivery record keeps the raw message next to the decoded
    // fields: parsed JSON when the payload is JSON, the UTF-8 text
    // otherwise.
    async fn write_delivery_record(&self, entity: &EntityId, message: &MqttMessage) {
        let payload = serde_json::from_slice::<serde_json::Value>(&message.payload)
            .unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(&message.payload).into_owned())
            });
        let record = serde_json::json!({
            "topic": message.topic,
            "qos": message.qos,
            "retained": message.retained,
            "payload": payload,
        });
        if let Err(e) = self
            .store
            .write(entity, "RxMessageFn", record.to_string())
            .await
        {
            error!("failed to write RxMessageFn on {entity}: {e}");
        }
    }
}
