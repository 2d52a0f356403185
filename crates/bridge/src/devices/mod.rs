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

// src/devices/mod.rs
// The device catalog: one adapter per hardware model, dispatched by
// the exact entity-type string. Adding a device means adding one file
// here and one line to DeviceRegistry::new; the rest of the bridge
// has no model-specific branches.

mod aqara_llkzmk12lm;
mod aqara_mccgq11lm;
mod ikea_led2005r5;

use std::sync::Arc;

use async_trait::async_trait;
use mqtt_link::MqttMessage;
use qstore::{EntityId, Notification, NotifyConfig, Store, StoreError};
use tracing::warn;

pub use aqara_llkzmk12lm::AqaraLlkzmk12lm;
pub use aqara_mccgq11lm::AqaraMccgq11lm;
pub use ikea_led2005r5::IkeaLed2005r5;

// Subscription is one (topic, qos) pair a device wants on its
// server's broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub qos: u8,
}

// PublishRequest is an outbound publish produced by a trigger
// notification. The worker routes it through the pool and does the
// counter accounting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishRequest {
    pub address: String,
    pub topic: String,
    pub qos: u8,
    pub retained: bool,
    pub payload: Vec<u8>,
}

// DeviceAdapter translates one hardware model between MQTT JSON and
// entity fields.
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    // model returns the entity-type name this adapter serves.
    fn model(&self) -> &'static str;

    // subscription_config lists the broker subscriptions for one
    // device entity. Every current model subscribes its Topic at its
    // Qos, falling back to 0 when the field is absent.
    async fn subscription_config(
        &self,
        store: &Store,
        entity: &EntityId,
    ) -> Result<Vec<Subscription>, StoreError> {
        let topic = store.read_string(entity, "Topic").await?;
        let qos = store
            .read_i64(entity, "Qos")
            .await
            .unwrap_or(0)
            .clamp(0, 2) as u8;
        Ok(vec![Subscription { topic, qos }])
    }

    // notification_config lists the store-side triggers this adapter
    // reacts to. Each config watches this model's entity type and
    // captures [Server->Address, Topic] as context.
    fn notification_config(&self) -> Vec<NotifyConfig>;

    // process_message decodes an inbound payload into field writes.
    async fn process_message(
        &self,
        message: &MqttMessage,
        store: &Store,
        entity: &EntityId,
    ) -> Result<(), StoreError>;

    // process_notification turns a trigger firing into outbound
    // publishes.
    fn process_notification(&self, notification: &Notification, publishes: &mut Vec<PublishRequest>);
}

// trigger_config builds the standard trigger watch for a model.
fn trigger_config(model: &str, field: &str) -> NotifyConfig {
    NotifyConfig::new(model, field).with_context(["Server->Address", "Topic"])
}

// command translates a trigger notification into one publish against
// the device topic, using the context captured at trigger time.
// Zigbee2MQTT convention: commands go to `<topic>/set`, read requests
// to `<topic>/get` with an empty-string value.
fn command(
    notification: &Notification,
    suffix: &str,
    payload: serde_json::Value,
) -> Option<PublishRequest> {
    let address = notification.context(0).and_then(|v| v.as_str());
    let topic = notification.context(1).and_then(|v| v.as_str());
    let (Some(address), Some(topic)) = (address, topic) else {
        warn!(
            "trigger {} on {} is missing address/topic context",
            notification.field, notification.entity
        );
        return None;
    };
    Some(PublishRequest {
        address: address.to_string(),
        topic: format!("{topic}{suffix}"),
        qos: 0,
        retained: false,
        payload: payload.to_string().into_bytes(),
    })
}

// DeviceRegistry is the closed catalog, keyed by exact model string.
pub struct DeviceRegistry {
    adapters: Vec<Arc<dyn DeviceAdapter>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Arc::new(AqaraLlkzmk12lm),
                Arc::new(AqaraMccgq11lm),
                Arc::new(IkeaLed2005r5),
            ],
        }
    }

    pub fn all(&self) -> &[Arc<dyn DeviceAdapter>] {
        &self.adapters
    }

    pub fn all_models(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.model()).collect()
    }

    pub fn find(&self, model: &str) -> Option<Arc<dyn DeviceAdapter>> {
        self.adapters.iter().find(|a| a.model() == model).cloned()
    }
}
