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

// src/config.rs
// Service configuration: defaults, optional TOML file, then the
// Q_ADDR environment override on top.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

const DEFAULT_STORE_ADDR: &str = "ws://webgateway:20000/ws";
const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_MQTT_KEEP_ALIVE: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    // store_addr is the websocket endpoint of the store gateway.
    // Overridden by the Q_ADDR environment variable.
    pub store_addr: String,
    // event_queue_capacity bounds the broker-event channel. Producers
    // block when it is full.
    pub event_queue_capacity: usize,
    #[serde(with = "humantime_serde")]
    pub mqtt_keep_alive: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_addr: DEFAULT_STORE_ADDR.to_string(),
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            mqtt_keep_alive: DEFAULT_MQTT_KEEP_ALIVE,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::raw().only(&["Q_ADDR"]).map(|_| "store_addr".into()))
            .extract()
    }
}
