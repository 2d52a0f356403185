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

// src/backend.rs
// The backend seam: everything the typed facade needs from a concrete
// store transport.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::StoreError;
use crate::notification::{Notification, NotifyConfig, TokenId};
use crate::types::{Entity, EntityId, Value, WriteRequest};

// Condition is one equality predicate of a query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub equals: Value,
}

impl Condition {
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            equals: value.into(),
        }
    }
}

// LeadershipEvent is pushed by the store's election primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeadershipEvent {
    Became,
    Lost,
}

// StoreBackend is the raw, object-safe store interface. The Store
// facade wraps it with typed helpers; tests swap in MemoryBackend.
//
// Writes are batched: the whole Vec is applied atomically, and
// notifications for it fire only after every write has landed.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn read(&self, entity: &EntityId, field: &str) -> Result<Value, StoreError>;

    async fn write(&self, writes: Vec<WriteRequest>) -> Result<(), StoreError>;

    async fn query(
        &self,
        entity_type: &str,
        conditions: Vec<Condition>,
    ) -> Result<Vec<Entity>, StoreError>;

    async fn children(&self, entity: &EntityId) -> Result<Vec<Entity>, StoreError>;

    async fn register_notification(&self, config: NotifyConfig) -> Result<TokenId, StoreError>;

    // Unregistering an unknown token is not an error; tokens are
    // released at-most-once by NotifyToken.
    async fn unregister_notification(&self, token: &TokenId) -> Result<(), StoreError>;

    // announce_candidacy enters this process into the store-side
    // leader election for the named service. Grants and revocations
    // arrive on the leadership event channel.
    async fn announce_candidacy(&self, service: &str) -> Result<(), StoreError>;

    // The notification and leadership channels can each be taken
    // exactly once, by whoever runs the consuming loop.
    fn take_notifications(&self) -> Option<mpsc::Receiver<Notification>>;

    fn take_leadership_events(&self) -> Option<mpsc::Receiver<LeadershipEvent>>;
}
