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
// Error types for the store client.

use thiserror::Error;

use crate::types::EntityId;

// StoreError covers every failure mode of the store client, from
// transport problems up to typed-read mismatches.
#[derive(Error, Debug)]
pub enum StoreError {
    // Transport occurs when the underlying websocket fails
    // (connect refused, TLS problems, mid-stream I/O errors).
    #[error("store transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    // Disconnected occurs when an operation is attempted after the
    // gateway connection has gone away, or when the connection drops
    // while a call is in flight.
    #[error("store connection is closed")]
    Disconnected,
    // Rejected occurs when the gateway answers a request with an
    // error body instead of a result.
    #[error("store rejected request: {0}")]
    Rejected(String),
    // Protocol occurs when the gateway answers with a frame we cannot
    // make sense of (missing result payload, unknown shape).
    #[error("store protocol error: {0}")]
    Protocol(String),
    #[error("no such entity: {0}")]
    NoSuchEntity(EntityId),
    #[error("entity {entity} has no field {field}")]
    NoSuchField { entity: EntityId, field: String },
    // TypeMismatch occurs on typed reads when the stored value has a
    // different type than the caller asked for.
    #[error("field {field}: expected {expected}, found {actual}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("store codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
