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

// src/ws.rs
// The production backend: JSON frames over a websocket to the store
// gateway. Requests carry a correlation id; the gateway pushes
// notification and leadership frames at any time, so a reader task
// routes incoming frames either to the waiting caller or onto the
// push channels.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::backend::{Condition, LeadershipEvent, StoreBackend};
use crate::errors::StoreError;
use crate::notification::{Notification, NotifyConfig, TokenId};
use crate::types::{Entity, EntityId, Value, WriteRequest};

const NOTIFY_CHANNEL_CAPACITY: usize = 1024;
const LEADERSHIP_CHANNEL_CAPACITY: usize = 16;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<OkBody, StoreError>>>>>;

#[derive(Serialize)]
struct ClientFrame {
    id: u64,
    #[serde(flatten)]
    op: RequestOp,
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
enum RequestOp {
    Read {
        entity: EntityId,
        field: String,
    },
    Write {
        writes: Vec<WriteRequest>,
    },
    Query {
        entity_type: String,
        conditions: Vec<Condition>,
    },
    Children {
        entity: EntityId,
    },
    Notify {
        config: NotifyConfig,
    },
    Unnotify {
        token: TokenId,
    },
    Candidate {
        service: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ServerFrame {
    Push(PushFrame),
    Response {
        id: u64,
        #[serde(default)]
        ok: Option<OkBody>,
        #[serde(default)]
        err: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(tag = "push", rename_all = "lowercase")]
enum PushFrame {
    Notification(Notification),
    Leadership { leader: bool },
}

#[derive(Default, Deserialize)]
struct OkBody {
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    entities: Option<Vec<Entity>>,
    #[serde(default)]
    token: Option<TokenId>,
}

pub struct WsBackend {
    writer: tokio::sync::Mutex<WsSink>,
    pending: Pending,
    next_id: AtomicU64,
    connected: Arc<AtomicBool>,
    notify_rx: Mutex<Option<mpsc::Receiver<Notification>>>,
    leader_rx: Mutex<Option<mpsc::Receiver<LeadershipEvent>>>,
}

impl WsBackend {
    // connect dials the gateway and starts the reader task. Failure
    // here is the one fatal error of the service.
    pub async fn connect(addr: &str) -> Result<Self, StoreError> {
        let (stream, _) = tokio_tungstenite::connect_async(addr).await?;
        info!("connected to store gateway at {addr}");
        let (writer, reader) = stream.split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_CHANNEL_CAPACITY);
        let (leader_tx, leader_rx) = mpsc::channel(LEADERSHIP_CHANNEL_CAPACITY);

        tokio::spawn(Self::read_loop(
            reader,
            pending.clone(),
            connected.clone(),
            notify_tx,
            leader_tx,
        ));

        Ok(Self {
            writer: tokio::sync::Mutex::new(writer),
            pending,
            next_id: AtomicU64::new(1),
            connected,
            notify_rx: Mutex::new(Some(notify_rx)),
            leader_rx: Mutex::new(Some(leader_rx)),
        })
    }

    async fn read_loop(
        mut reader: futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
        pending: Pending,
        connected: Arc<AtomicBool>,
        notify_tx: mpsc::Sender<Notification>,
        leader_tx: mpsc::Sender<LeadershipEvent>,
    ) {
        loop {
            let message = match reader.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    warn!("store gateway stream error: {e}");
                    break;
                }
                None => {
                    warn!("store gateway closed the connection");
                    break;
                }
            };
            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => break,
                // Ping/pong are handled by the library; binary frames
                // are not part of the gateway dialect.
                _ => continue,
            };
            let frame: ServerFrame = match serde_json::from_str(text.as_str()) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("unparseable gateway frame: {e}");
                    continue;
                }
            };
            match frame {
                ServerFrame::Response { id, ok, err } => {
                    let Some(caller) = pending.lock().expect("lock poisoned").remove(&id) else {
                        debug!("response for unknown request id {id}");
                        continue;
                    };
                    let result = match err {
                        Some(err) => Err(StoreError::Rejected(err)),
                        None => Ok(ok.unwrap_or_default()),
                    };
                    let _ = caller.send(result);
                }
                ServerFrame::Push(PushFrame::Notification(notification)) => {
                    if notify_tx.try_send(notification).is_err() {
                        warn!("notification channel full or closed, dropping notification");
                    }
                }
                ServerFrame::Push(PushFrame::Leadership { leader }) => {
                    let event = if leader {
                        LeadershipEvent::Became
                    } else {
                        LeadershipEvent::Lost
                    };
                    if leader_tx.try_send(event).is_err() {
                        warn!("leadership channel full or closed, dropping event");
                    }
                }
            }
        }

        // The connection is gone. Leadership cannot be held without
        // the store, so a revocation is synthesized before the
        // in-flight callers see the failure.
        connected.store(false, Ordering::SeqCst);
        let _ = leader_tx.try_send(LeadershipEvent::Lost);
        let callers = std::mem::take(&mut *pending.lock().expect("lock poisoned"));
        for (_, caller) in callers {
            let _ = caller.send(Err(StoreError::Disconnected));
        }
    }

    async fn request(&self, op: RequestOp) -> Result<OkBody, StoreError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(StoreError::Disconnected);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("lock poisoned")
            .insert(id, tx);

        let payload = serde_json::to_string(&ClientFrame { id, op })?;
        let sent = {
            let mut writer = self.writer.lock().await;
            writer.send(Message::text(payload)).await
        };
        if let Err(e) = sent {
            self.pending.lock().expect("lock poisoned").remove(&id);
            return Err(StoreError::Transport(e));
        }

        rx.await.unwrap_or(Err(StoreError::Disconnected))
    }
}

#[async_trait]
impl StoreBackend for WsBackend {
    async fn read(&self, entity: &EntityId, field: &str) -> Result<Value, StoreError> {
        let body = self
            .request(RequestOp::Read {
                entity: entity.clone(),
                field: field.to_string(),
            })
            .await?;
        body.value
            .ok_or_else(|| StoreError::Protocol("read response without value".to_string()))
    }

    async fn write(&self, writes: Vec<WriteRequest>) -> Result<(), StoreError> {
        self.request(RequestOp::Write { writes }).await.map(|_| ())
    }

    async fn query(
        &self,
        entity_type: &str,
        conditions: Vec<Condition>,
    ) -> Result<Vec<Entity>, StoreError> {
        let body = self
            .request(RequestOp::Query {
                entity_type: entity_type.to_string(),
                conditions,
            })
            .await?;
        Ok(body.entities.unwrap_or_default())
    }

    async fn children(&self, entity: &EntityId) -> Result<Vec<Entity>, StoreError> {
        let body = self
            .request(RequestOp::Children {
                entity: entity.clone(),
            })
            .await?;
        Ok(body.entities.unwrap_or_default())
    }

    async fn register_notification(&self, config: NotifyConfig) -> Result<TokenId, StoreError> {
        let body = self.request(RequestOp::Notify { config }).await?;
        body.token
            .ok_or_else(|| StoreError::Protocol("notify response without token".to_string()))
    }

    async fn unregister_notification(&self, token: &TokenId) -> Result<(), StoreError> {
        self.request(RequestOp::Unnotify {
            token: token.clone(),
        })
        .await
        .map(|_| ())
    }

    async fn announce_candidacy(&self, service: &str) -> Result<(), StoreError> {
        self.request(RequestOp::Candidate {
            service: service.to_string(),
        })
        .await
        .map(|_| ())
    }

    fn take_notifications(&self) -> Option<mpsc::Receiver<Notification>> {
        self.notify_rx.lock().expect("lock poisoned").take()
    }

    fn take_leadership_events(&self) -> Option<mpsc::Receiver<LeadershipEvent>> {
        self.leader_rx.lock().expect("lock poisoned").take()
    }
}
