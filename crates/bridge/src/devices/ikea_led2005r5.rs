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

// src/devices/ikea_led2005r5.rs
//
// Model        LED2005R5
// Vendor       IKEA
// Description  LED driver
// Exposes      state, brightness, color_temp, color_temp_startup,
//              color_mode, power_on_behavior, linkquality

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
    linkquality: i64,
    #[serde(default)]
    state: String,
    #[serde(default)]
    brightness: i64,
    #[serde(default)]
    color_temp: i64,
    #[serde(default)]
    color_temp_startup: i64,
    #[serde(default)]
    color_mode: String,
    #[serde(default)]
    power_on_behavior: String,
}

pub struct IkeaLed2005r5;

#[async_trait]
impl DeviceAdapter for IkeaLed2005r5 {
    fn model(&self) -> &'static str {
        "IkeaLED2005R5"
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
        batch.set(entity, "LinkQuality", report.linkquality);
        batch.set(entity, "State", report.state);
        batch.set(entity, "Brightness", report.brightness);
        batch.set(entity, "ColorTemp", report.color_temp);
        batch.set(entity, "ColorTempStartup", report.color_temp_startup);
        batch.set(entity, "ColorMode", report.color_mode);
        batch.set(entity, "PowerOnBehavior", report.power_on_behavior);
        batch.commit().await
    }

    fn process_notification(
        &self,
        notification: &Notification,
        publishes: &mut Vec<PublishRequest>,
    ) {
        match notification.field.as_str() {
            "StateOnTrigger" => {
                publishes.extend(command(notification, "/set", json!({"state": "ON"})));
            }
            "StateOffTrigger" => {
                publishes.extend(command(notification, "/set", json!({"state": "OFF"})));
            }
            "GetTrigger" => publishes.extend(command(notification, "/get", json!({"state": ""}))),
            other => warn!("{}: unknown trigger {other}", self.model()),
        }
    }
}
