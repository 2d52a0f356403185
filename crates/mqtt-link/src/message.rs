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

// src/message.rs
// Owned message and event types crossing from broker driver tasks to
// the bridge worker.

use rumqttc::Publish;

// MqttMessage is an owned copy of a received publish packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retained: bool,
    pub duplicate: bool,
}

impl From<&Publish> for MqttMessage {
    fn from(publish: &Publish) -> Self {
        Self {
            topic: publish.topic.clone(),
            payload: publish.payload.to_vec(),
            qos: publish.qos as u8,
            retained: publish.retain,
            duplicate: publish.dup,
        }
    }
}

// LinkEvent is what a broker driver task reports to the single
// consumer on the bridge side. Producers block when the queue is
// full; silently dropping a connection-state event would leave the
// store's view of the link wrong.
#[derive(Clone, Debug)]
pub enum LinkEvent {
    ConnectionEstablished {
        address: String,
    },
    ConnectionLost {
        address: String,
        error: String,
    },
    MessageReceived {
        address: String,
        message: MqttMessage,
    },
}

impl LinkEvent {
    pub fn address(&self) -> &str {
        match self {
            LinkEvent::ConnectionEstablished { address } => address,
            LinkEvent::ConnectionLost { address, .. } => address,
            LinkEvent::MessageReceived { address, .. } => address,
        }
    }
}
