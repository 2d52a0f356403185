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

// src/devices/aqara_mccgq11lm.rs
//
// Model        MCCGQ11LM
// Vendor       Aqara
// Description  Door and window sensor
// Exposes      battery, contact, device_temperature, voltage,
//              power_outage_count, trigger_count, linkquality

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
    battery: i64,
    #[serde(default)]
    contact: bool,
    #[serde(default)]
    device_temperature: i64,
    #[serde(default)]
    voltage: i64,
    #[serde(default)]
    power_outage_count: i64,
    #[serde(default)]
    linkquality: i64,
    #[serde(default)]
    trigger_count: i64,
}

pub struct AqaraMccgq11lm;

#[async_trait]
impl DeviceAdapter for AqaraMccgq11lm {
    fn model(&self) -> &'static str {
        "AqaraMCCGQ11LM"
    }

    fn notification_config(&self) -> Vec<NotifyConfig> {
        vec![trigger_config(self.model(), "GetTrigger")]
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
        batch.set(entity, "Battery", report.battery);
        batch.set(entity, "Contact", report.contact);
        batch.set(entity, "DeviceTemperature", report.device_temperature);
        batch.set(entity, "Voltage", report.voltage);
        batch.set(entity, "PowerOutageCount", report.power_outage_count);
        batch.set(entity, "LinkQuality", report.linkquality);
        batch.set(entity, "TriggerCount", report.trigger_count);
        batch.commit().await
    }

    fn process_notification(
        &self,
        notification: &Notification,
        publishes: &mut Vec<PublishRequest>,
    ) {
        match notification.field.as_str() {
            "GetTrigger" => publishes.extend(command(notification, "/get", json!({"contact": ""}))),
            other => warn!("{}: unknown trigger {other}", self.model()),
        }
    }
}
