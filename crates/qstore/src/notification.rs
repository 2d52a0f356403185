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

// src/notification.rs
// Change-notification configuration, payloads and registration tokens.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backend::StoreBackend;
use crate::errors::StoreError;
use crate::types::{EntityId, Value};

// NotifyConfig describes one change subscription: which entity type
// and field to watch, whether equal-value writes are suppressed, and
// which context fields to capture at the instant of the change.
//
// Context field names may traverse entity references with `->`:
// `Server->Address` reads `Address` from the entity referenced by the
// watched entity's `Server` field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub entity_type: String,
    pub field: String,
    #[serde(default)]
    pub notify_on_change: bool,
    #[serde(default)]
    pub context: Vec<String>,
}

impl NotifyConfig {
    pub fn new(entity_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            field: field.into(),
            notify_on_change: false,
            context: Vec::new(),
        }
    }

    // on_change suppresses callbacks where previous == current.
    pub fn on_change(mut self) -> Self {
        self.notify_on_change = true;
        self
    }

    pub fn with_context<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.context = fields.into_iter().map(Into::into).collect();
        self
    }
}

// TokenId identifies a registered notification on the backend side.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Notification is the payload delivered when a watched field is
// written. `context` values line up index-for-index with the
// `context` names of the registering NotifyConfig.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub token: TokenId,
    pub entity: EntityId,
    pub entity_type: String,
    pub field: String,
    pub previous: Value,
    pub current: Value,
    #[serde(default)]
    pub context: Vec<Value>,
}

impl Notification {
    pub fn context(&self, index: usize) -> Option<&Value> {
        self.context.get(index)
    }
}

// NotifyToken keeps a registration alive. Calling unbind stops the
// callbacks; unbind is idempotent.
pub struct NotifyToken {
    id: TokenId,
    backend: Arc<dyn StoreBackend>,
    released: AtomicBool,
}

impl NotifyToken {
    pub fn new(id: TokenId, backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            id,
            backend,
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &TokenId {
        &self.id
    }

    pub async fn unbind(&self) -> Result<(), StoreError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match self.backend.unregister_notification(&self.id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("failed to unregister notification {}: {e}", self.id);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for NotifyToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyToken")
            .field("id", &self.id)
            .field("released", &self.released.load(Ordering::SeqCst))
            .finish()
    }
}
