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
// Service-level errors. Everything here is fatal to startup; once the
// worker runs, failures are logged and swallowed instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),
    #[error(transparent)]
    Store(#[from] qstore::StoreError),
    #[error(transparent)]
    Link(#[from] mqtt_link::LinkError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    // ChannelsTaken occurs when the store's notification or leadership
    // channel was already consumed by another worker.
    #[error("store channels already taken")]
    ChannelsTaken,
}
