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

// src/lib.rs
// The leader-elected MQTT <-> entity-store bridge. One elected replica
// holds the broker connections and mirrors traffic into entity fields;
// everyone else stays dormant until the store grants leadership.

pub mod config;
pub mod devices;
pub mod errors;
pub mod pool;
pub mod worker;

use std::sync::Arc;

use mqtt_link::RumqttcFactory;
use qstore::Store;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use config::Config;
pub use errors::BridgeError;

pub const SERVICE_NAME: &str = "qmqtt-bridge";

// run_service connects to the store, enters the election and runs the
// worker until SIGINT/SIGTERM. The store connection is the only
// failure that aborts startup.
pub async fn run_service(config: Config) -> Result<(), BridgeError> {
    let store = Store::connect(&config.store_addr).await?;
    store.announce_candidacy(SERVICE_NAME).await?;

    let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity);
    let factory = Arc::new(RumqttcFactory::new(config.mqtt_keep_alive));
    let pool = pool::ClientPool::new(factory, events_tx);

    let shutdown = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
            _ = sigterm.recv() => info!("SIGTERM received"),
        }
        trigger.cancel();
    });

    let worker = worker::BridgeWorker::new(
        store,
        devices::DeviceRegistry::new(),
        pool,
        events_rx,
        shutdown,
    )?;
    worker.run().await;
    Ok(())
}
