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

// src/errors.rs
// Error types for broker client handling.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    // InvalidAddress occurs when a broker address string cannot be
    // parsed into scheme/host/port.
    #[error("invalid broker address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
    // Client occurs when the underlying MQTT client rejects a request
    // (its request channel is closed or full).
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
    // NotStarted occurs when subscribe/publish is attempted on a
    // client whose driver task is not running.
    #[error("broker client for {0} is not started")]
    NotStarted(String),
}

impl LinkError {
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }
}
