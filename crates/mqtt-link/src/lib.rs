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
// Broker client handles for the bridge: the BrokerClient seam, the
// rumqttc-backed production client and the events it produces.

pub mod client;
pub mod errors;
pub mod message;

pub use client::{BrokerAddress, BrokerClient, BrokerClientFactory, RumqttcClient, RumqttcFactory};
pub use errors::LinkError;
pub use message::{LinkEvent, MqttMessage};
pub use rumqttc::QoS;
