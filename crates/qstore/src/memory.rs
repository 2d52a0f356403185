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

// src/memory.rs
// A complete in-process backend. Every test in the workspace runs
// against this; leadership is granted and revoked by hand.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::backend::{Condition, LeadershipEvent, StoreBackend};
use crate::errors::StoreError;
use crate::notification::{Notification, NotifyConfig, TokenId};
use crate::types::{Entity, EntityId, Value, WritePolicy, WriteRequest};

const NOTIFY_CHANNEL_CAPACITY: usize = 1024;
const LEADERSHIP_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug)]
struct EntityRecord {
    entity_type: String,
    fields: HashMap<String, Value>,
    children: Vec<EntityId>,
}

#[derive(Default)]
struct Inner {
    entities: HashMap<EntityId, EntityRecord>,
    watchers: HashMap<TokenId, NotifyConfig>,
    next_entity: u64,
    next_token: u64,
}

pub struct MemoryBackend {
    inner: Mutex<Inner>,
    notify_tx: mpsc::Sender<Notification>,
    notify_rx: Mutex<Option<mpsc::Receiver<Notification>>>,
    leader_tx: mpsc::Sender<LeadershipEvent>,
    leader_rx: Mutex<Option<mpsc::Receiver<LeadershipEvent>>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_CHANNEL_CAPACITY);
        let (leader_tx, leader_rx) = mpsc::channel(LEADERSHIP_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(Inner::default()),
            notify_tx,
            notify_rx: Mutex::new(Some(notify_rx)),
            leader_tx,
            leader_rx: Mutex::new(Some(leader_rx)),
        }
    }

    // create_entity seeds an entity with the given fields. When a
    // parent is passed the new entity is appended to its child list;
    // reference fields (e.g. `Server`) are the caller's to set.
    pub fn create_entity(
        &self,
        entity_type: &str,
        parent: Option<&EntityId>,
        fields: Vec<(&str, Value)>,
    ) -> EntityId {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.next_entity += 1;
        let id = EntityId::new(format!("{}-{}", entity_type, inner.next_entity));
        inner.entities.insert(
            id.clone(),
            EntityRecord {
                entity_type: entity_type.to_string(),
                fields: fields
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value))
                    .collect(),
                children: Vec::new(),
            },
        );
        if let Some(parent) = parent {
            if let Some(record) = inner.entities.get_mut(parent) {
                record.children.push(id.clone());
            }
        }
        id
    }

    // peek reads a field without going through the async trait.
    // Convenient for assertions.
    pub fn peek(&self, entity: &EntityId, field: &str) -> Option<Value> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.entities.get(entity)?.fields.get(field).cloned()
    }

    pub fn grant_leadership(&self) {
        if self.leader_tx.try_send(LeadershipEvent::Became).is_err() {
            warn!("leadership channel full or closed, dropping grant");
        }
    }

    pub fn revoke_leadership(&self) {
        if self.leader_tx.try_send(LeadershipEvent::Lost).is_err() {
            warn!("leadership channel full or closed, dropping revocation");
        }
    }

    // resolve_context reads one context field, following `->` through
    // entity references. Unresolvable paths yield an empty string so
    // the payload keeps its positional shape.
    fn resolve_context(inner: &Inner, entity: &EntityId, path: &str) -> Value {
        let mut current = entity.clone();
        let mut segments = path.split("->").peekable();
        while let Some(segment) = segments.next() {
            let Some(record) = inner.entities.get(&current) else {
                break;
            };
            let Some(value) = record.fields.get(segment) else {
                break;
            };
            if segments.peek().is_none() {
                return value.clone();
            }
            match value.as_entity_ref() {
                Some(next) => current = next.clone(),
                None => break,
            }
        }
        warn!("context field {path} unresolvable from {entity}");
        Value::Str(String::new())
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn read(&self, entity: &EntityId, field: &str) -> Result<Value, StoreError> {
        let inner = self.inner.lock().expect("lock poisoned");
        let record = inner
            .entities
            .get(entity)
            .ok_or_else(|| StoreError::NoSuchEntity(entity.clone()))?;
        record
            .fields
            .get(field)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchField {
                entity: entity.clone(),
                field: field.to_string(),
            })
    }

    async fn write(&self, writes: Vec<WriteRequest>) -> Result<(), StoreError> {
        let notifications = {
            let mut inner = self.inner.lock().expect("lock poisoned");

            // Validate the whole batch up front so it applies atomically.
            for w in &writes {
                if !inner.entities.contains_key(&w.entity) {
                    return Err(StoreError::NoSuchEntity(w.entity.clone()));
                }
            }

            let mut applied = Vec::new();
            for w in writes {
                let record = inner.entities.get_mut(&w.entity).expect("validated above");
                let previous = record
                    .fields
                    .get(&w.field)
                    .cloned()
                    .unwrap_or_else(|| w.value.zero_like());
                if w.policy == WritePolicy::Changes && previous == w.value {
                    continue;
                }
                record.fields.insert(w.field.clone(), w.value.clone());
                applied.push((w.entity, record.entity_type.clone(), w.field, previous, w.value));
            }

            // Fan out to watchers only after the full batch has landed,
            // reading context at the post-batch instant.
            let mut notifications = Vec::new();
            for (entity, entity_type, field, previous, current) in applied {
                for (token, config) in &inner.watchers {
                    if config.entity_type != entity_type || config.field != field {
                        continue;
                    }
                    if config.notify_on_change && previous == current {
                        continue;
                    }
                    let context = config
                        .context
                        .iter()
                        .map(|path| Self::resolve_context(&inner, &entity, path))
                        .collect();
                    notifications.push(Notification {
                        token: token.clone(),
                        entity: entity.clone(),
                        entity_type: entity_type.clone(),
                        field: field.clone(),
                        previous: previous.clone(),
                        current: current.clone(),
                        context,
                    });
                }
            }
            notifications
        };

        for notification in notifications {
            if self.notify_tx.try_send(notification).is_err() {
                warn!("notification channel full or closed, dropping notification");
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        entity_type: &str,
        conditions: Vec<Condition>,
    ) -> Result<Vec<Entity>, StoreError> {
        let inner = self.inner.lock().expect("lock poisoned");
        let mut matches: Vec<Entity> = inner
            .entities
            .iter()
            .filter(|(_, record)| record.entity_type == entity_type)
            .filter(|(_, record)| {
                conditions
                    .iter()
                    .all(|c| record.fields.get(&c.field) == Some(&c.equals))
            })
            .map(|(id, record)| Entity {
                id: id.clone(),
                entity_type: record.entity_type.clone(),
            })
            .collect();
        matches.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(matches)
    }

    async fn children(&self, entity: &EntityId) -> Result<Vec<Entity>, StoreError> {
        let inner = self.inner.lock().expect("lock poisoned");
        let record = inner
            .entities
            .get(entity)
            .ok_or_else(|| StoreError::NoSuchEntity(entity.clone()))?;
        Ok(record
            .children
            .iter()
            .filter_map(|id| {
                inner.entities.get(id).map(|child| Entity {
                    id: id.clone(),
                    entity_type: child.entity_type.clone(),
                })
            })
            .collect())
    }

    async fn register_notification(&self, config: NotifyConfig) -> Result<TokenId, StoreError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.next_token += 1;
        let token = TokenId::new(format!("tok-{}", inner.next_token));
        inner.watchers.insert(token.clone(), config);
        Ok(token)
    }

    async fn unregister_notification(&self, token: &TokenId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.watchers.remove(token);
        Ok(())
    }

    async fn announce_candidacy(&self, _service: &str) -> Result<(), StoreError> {
        // Election is driven by grant_leadership / revoke_leadership.
        Ok(())
    }

    fn take_notifications(&self) -> Option<mpsc::Receiver<Notification>> {
        self.notify_rx.lock().expect("lock poisoned").take()
    }

    fn take_leadership_events(&self) -> Option<mpsc::Receiver<LeadershipEvent>> {
        self.leader_rx.lock().expect("lock poisoned").take()
    }
}
