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

// src/devices/aqara_llkzmk12lm.rs
//
// Model        LLKZMK12LM
// Vendor       Aqara
// Description  Dual relay module T2
// Exposes      switch (state), power, current, energy, voltage,
//              device_temperature, linkquality

use async_trait::async_trait;
use mqtt_link::MqttMessage;
use qstore::{EntityId, Notification, NotifyConfig, Store, StoreError};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::{command, trigger_config, DeviceAdapter, PublishRequest};

#[derive(Debug, Default, Deserialize)]
struct Report {
    #[serde(default)]
    state: String,
    #[serde(default)]
    state_l1: String,
    #[serde(default)]
    state_l2: String,
    #[serde(default)]
    power: f64,
    #[serde(default)]
    current: f64,
    #[serde(default)]
    energy: f64,
    #[serde(default)]
    voltage: f64,
    #[serde(default)]
    device_temperature: i64,
    #[serde(default)]
    linkquality: i64,
}

pub struct AqaraLlkzmk12lm;

#[async_trait]
impl DeviceAdapter for AqaraLlkzmk12lm {
    fn model(&self) -> &'static str {
        "AqaraLLKZMK12LM"
    }

    fn notification_config(&self) -> Vec<NotifyConfig> {
        vec![
            trigger_config(self.model(), "StateOnTrigger"),
            trigger_config(self.model(), "StateOffTrigger"),
            trigger_config(self.model(), "GetTrigger"),
        ]
    }

    async fn process_message(
        &self,
        message: &MqttMessage,
        store: &Store,
        entity: &EntityId,
    ) -> Result<(), StoreError> {
        let report: Report = match serde_json::from_slice(&message.payload) {
            Ok(report) => report,
            Err(e) => {
                warn!("{}: unparseable payload on {}: {e}", self.model(), message.topic);
                return Ok(());
            }
        };

        let mut batch = store.batch();
        batch.set(entity, "State", report.state);
        batch.set(entity, "StateL1", report.state_l1);
        batch.set(entity, "StateL2", report.state_l2);
        batch.set(entity, "Power", report.power);
        batch.set(entity, "Current", report.current);
        batch.set(entity, "Energy", report.energy);
        batch.set(entity, "Voltage", report.voltage);
        batch.set(entity, "DeviceTemperature", report.device_temperature);
        batch.set(entity, "LinkQuality", report.linkquality);
        batch.commit().await
    }

    fn process_notification(
        &self,
        notification: &Notification,
        publishes: &mut Vec<PublishRequest>,
    ) {
        match notification.field.as_str() {
            "StateOnTrigger" => {
                publishes.extend(command(notification, "/set", json!({"state_l1": "ON"})));
            }
            "StateOffTrigger" => {
                publishes.extend(command(notification, "/set", json!({"state_l1": "OFF"})));
            }
            "GetTrigger" => publishes.extend(command(notification, "/get", json!({"state": ""}))),
            other => warn!("{}: unknown trigger {other}", self.model()),
        }
    }
}
