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

// src/pool.rs
// The broker client pool: one client handle per MqttServer.Address,
// keyed by the exact address string. Only the worker touches it.

use std::collections::HashMap;
use std::sync::Arc;

use mqtt_link::{BrokerClient, BrokerClientFactory, LinkError, LinkEvent};
use tokio::sync::mpsc;
use tracing::debug;

pub struct ClientPool {
    factory: Arc<dyn BrokerClientFactory>,
    events: mpsc::Sender<LinkEvent>,
    clients: HashMap<String, Arc<dyn BrokerClient>>,
}

impl ClientPool {
    pub fn new(factory: Arc<dyn BrokerClientFactory>, events: mpsc::Sender<LinkEvent>) -> Self {
        Self {
            factory,
            events,
            clients: HashMap::new(),
        }
    }

    pub fn get(&self, address: &str) -> Option<Arc<dyn BrokerClient>> {
        self.clients.get(address).cloned()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.clients.contains_key(address)
    }

    // install returns the existing client for an address, or makes a
    // fresh one and pools it. At most one client per address, ever.
    pub fn install(&mut self, address: &str) -> Result<Arc<dyn BrokerClient>, LinkError> {
        if let Some(existing) = self.clients.get(address) {
            return Ok(existing.clone());
        }
        let client = self.factory.make(address, self.events.clone())?;
        self.clients.insert(address.to_string(), client.clone());
        debug!("pooled broker client for {address}");
        Ok(client)
    }

    pub fn remove(&mut self, address: &str) -> Option<Arc<dyn BrokerClient>> {
        let removed = self.clients.remove(address);
        if removed.is_some() {
            debug!("retired broker client for {address}");
        }
        removed
    }

    // drain empties the pool, handing every client back for teardown.
    pub fn drain(&mut self) -> Vec<Arc<dyn BrokerClient>> {
        self.clients.drain().map(|(_, client)| client).collect()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
