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

// src/store.rs
// The typed facade over a StoreBackend: typed reads and writes,
// queries, child enumeration, write batches and notification
// registration.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backend::{Condition, LeadershipEvent, StoreBackend};
use crate::errors::StoreError;
use crate::notification::{Notification, NotifyConfig, NotifyToken};
use crate::types::{Entity, EntityId, Value, WritePolicy, WriteRequest};
use crate::ws::WsBackend;

#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn StoreBackend>,
}

impl Store {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self { backend }
    }

    // connect dials the store gateway over its websocket dialect.
    pub async fn connect(addr: &str) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(WsBackend::connect(addr).await?)))
    }

    pub async fn read(&self, entity: &EntityId, field: &str) -> Result<Value, StoreError> {
        self.backend.read(entity, field).await
    }

    pub async fn read_string(&self, entity: &EntityId, field: &str) -> Result<String, StoreError> {
        let value = self.read(entity, field).await?;
        match value {
            Value::Str(s) => Ok(s),
            other => Err(StoreError::TypeMismatch {
                field: field.to_string(),
                expected: "string",
                actual: other.type_name(),
            }),
        }
    }

    pub async fn read_i64(&self, entity: &EntityId, field: &str) -> Result<i64, StoreError> {
        let value = self.read(entity, field).await?;
        value.as_i64().ok_or_else(|| StoreError::TypeMismatch {
            field: field.to_string(),
            expected: "int",
            actual: value.type_name(),
        })
    }

    pub async fn read_bool(&self, entity: &EntityId, field: &str) -> Result<bool, StoreError> {
        let value = self.read(entity, field).await?;
        value.as_bool().ok_or_else(|| StoreError::TypeMismatch {
            field: field.to_string(),
            expected: "bool",
            actual: value.type_name(),
        })
    }

    pub async fn read_f64(&self, entity: &EntityId, field: &str) -> Result<f64, StoreError> {
        let value = self.read(entity, field).await?;
        value.as_f64().ok_or_else(|| StoreError::TypeMismatch {
            field: field.to_string(),
            expected: "float",
            actual: value.type_name(),
        })
    }

    pub async fn write(
        &self,
        entity: &EntityId,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<(), StoreError> {
        self.write_with(entity, field, value, WritePolicy::Always)
            .await
    }

    pub async fn write_with(
        &self,
        entity: &EntityId,
        field: &str,
        value: impl Into<Value>,
        policy: WritePolicy,
    ) -> Result<(), StoreError> {
        self.backend
            .write(vec![WriteRequest {
                entity: entity.clone(),
                field: field.to_string(),
                value: value.into(),
                policy,
            }])
            .await
    }

    pub async fn query(
        &self,
        entity_type: &str,
        conditions: Vec<Condition>,
    ) -> Result<Vec<Entity>, StoreError> {
        self.backend.query(entity_type, conditions).await
    }

    // query_all lists every entity of a type.
    pub async fn query_all(&self, entity_type: &str) -> Result<Vec<Entity>, StoreError> {
        self.backend.query(entity_type, Vec::new()).await
    }

    pub async fn children(&self, entity: &EntityId) -> Result<Vec<Entity>, StoreError> {
        self.backend.children(entity).await
    }

    pub fn batch(&self) -> WriteBatch {
        WriteBatch {
            backend: self.backend.clone(),
            writes: Vec::new(),
        }
    }

    pub async fn notify(&self, config: NotifyConfig) -> Result<NotifyToken, StoreError> {
        let token = self.backend.register_notification(config).await?;
        Ok(NotifyToken::new(token, self.backend.clone()))
    }

    pub async fn announce_candidacy(&self, service: &str) -> Result<(), StoreError> {
        self.backend.announce_candidacy(service).await
    }

    pub fn take_notifications(&self) -> Option<mpsc::Receiver<Notification>> {
        self.backend.take_notifications()
    }

    pub fn take_leadership_events(&self) -> Option<mpsc::Receiver<LeadershipEvent>> {
        self.backend.take_leadership_events()
    }
}

// WriteBatch collects writes and commits them in one atomic request.
// Dropping an uncommitted batch discards it.
pub struct WriteBatch {
    backend: Arc<dyn StoreBackend>,
    writes: Vec<WriteRequest>,
}

impl WriteBatch {
    pub fn set(&mut self, entity: &EntityId, field: &str, value: impl Into<Value>) -> &mut Self {
        self.push(entity, field, value, WritePolicy::Always)
    }

    pub fn set_if_changed(
        &mut self,
        entity: &EntityId,
        field: &str,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push(entity, field, value, WritePolicy::Changes)
    }

    fn push(
        &mut self,
        entity: &EntityId,
        field: &str,
        value: impl Into<Value>,
        policy: WritePolicy,
    ) -> &mut Self {
        self.writes.push(WriteRequest {
            entity: entity.clone(),
            field: field.to_string(),
            value: value.into(),
            policy,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub async fn commit(self) -> Result<(), StoreError> {
        if self.writes.is_empty() {
            return Ok(());
        }
        self.backend.write(self.writes).await
    }
}
