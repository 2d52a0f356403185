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
// tests/bridge.rs
// End-to-end worker behavior against the in-memory store and a fake
// broker client: leadership gating, reconciliation, counters and the
// inbound/outbound translation paths.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mqtt_link::{BrokerClient, BrokerClientFactory, LinkError, LinkEvent, MqttMessage};
use qmqtt_bridge::devices::DeviceRegistry;
use qmqtt_bridge::pool::ClientPool;
use qmqtt_bridge::worker::BridgeWorker;
use qstore::{EntityId, MemoryBackend, Store, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// FakeBroker stands in for a rumqttc-backed client. Connecting emits
// the same ConnectionEstablished event the real driver would; message
// arrival is injected with deliver().
struct FakeBroker {
    address: String,
    events: mpsc::Sender<LinkEvent>,
    auto_establish: bool,
    started: AtomicBool,
    connected: AtomicBool,
    destroyed: AtomicBool,
    connect_count: AtomicUsize,
    subscriptions: Mutex<Vec<(String, u8)>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeBroker {
    fn new(address: &str, events: mpsc::Sender<LinkEvent>, auto_establish: bool) -> Self {
        Self {
            address: address.to_string(),
            events,
            auto_establish,
            started: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            connect_count: AtomicUsize::new(0),
            subscriptions: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
        }
    }

    async fn deliver(&self, topic: &str, payload: &[u8]) {
        self.events
            .send(LinkEvent::MessageReceived {
                address: self.address.clone(),
                message: MqttMessage {
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                    qos: 0,
                    retained: false,
                    duplicate: false,
                },
            })
            .await
            .expect("event channel open");
    }

    fn subscribed_topics(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerClient for FakeBroker {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<(), LinkError> {
        self.started.store(true, Ordering::SeqCst);
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        if self.auto_establish {
            self.connected.store(true, Ordering::SeqCst);
            let _ = self
                .events
                .send(LinkEvent::ConnectionEstablished {
                    address: self.address.clone(),
                })
                .await;
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        self.started.store(false, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, topic: &str, qos: u8) -> Result<(), LinkError> {
        self.subscriptions
            .lock()
            .unwrap()
            .push((topic.to_string(), qos));
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        _qos: u8,
        _retained: bool,
        payload: Vec<u8>,
    ) -> Result<(), LinkError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn shutdown(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }
}

struct FakeFactory {
    auto_establish: AtomicBool,
    made: Mutex<Vec<Arc<FakeBroker>>>,
}

impl FakeFactory {
    fn new() -> Self {
        Self {
            auto_establish: AtomicBool::new(true),
            made: Mutex::new(Vec::new()),
        }
    }

    // client_for returns the most recently made client for an address.
    fn client_for(&self, address: &str) -> Option<Arc<FakeBroker>> {
        self.made
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.address == address)
            .cloned()
    }

    fn made_count(&self, address: &str) -> usize {
        self.made
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.address == address)
            .count()
    }
}

impl BrokerClientFactory for FakeFactory {
    fn make(
        &self,
        address: &str,
        events: mpsc::Sender<LinkEvent>,
    ) -> Result<Arc<dyn BrokerClient>, LinkError> {
        let client = Arc::new(FakeBroker::new(
            address,
            events,
            self.auto_establish.load(Ordering::SeqCst),
        ));
        self.made.lock().unwrap().push(client.clone());
        Ok(client)
    }
}

struct Harness {
    backend: Arc<MemoryBackend>,
    store: Store,
    factory: Arc<FakeFactory>,
    events_tx: mpsc::Sender<LinkEvent>,
    worker: BridgeWorker,
}

fn harness() -> Harness {
    let backend = Arc::new(MemoryBackend::new());
    let store = Store::new(backend.clone());
    let (events_tx, events_rx) = mpsc::channel(1024);
    let factory = Arc::new(FakeFactory::new());
    let pool = ClientPool::new(factory.clone(), events_tx.clone());
    let worker = BridgeWorker::new(
        store.clone(),
        DeviceRegistry::new(),
        pool,
        events_rx,
        CancellationToken::new(),
    )
    .expect("store channels available");
    Harness {
        backend,
        store,
        factory,
        events_tx,
        worker,
    }
}

const BROKER: &str = "tcp://b:1883";

fn seed_server(h: &Harness, address: &str, enabled: bool) -> EntityId {
    h.backend.create_entity("Root", None, vec![("SchemaUpdateTrigger", Value::from(0i64))]);
    h.backend.create_entity("MqttController", None, vec![]);
    h.backend.create_entity(
        "MqttServer",
        None,
        vec![
            ("Address", Value::from(address)),
            ("Enabled", Value::from(enabled)),
            ("IsConnected", Value::from(false)),
            ("TotalSent", Value::from(0i64)),
            ("TotalReceived", Value::from(0i64)),
            ("TotalDropped", Value::from(0i64)),
            ("TxMessage", Value::from("")),
        ],
    )
}

fn seed_door_sensor(h: &Harness, server: &EntityId, topic: &str) -> EntityId {
    h.backend.create_entity(
        "AqaraMCCGQ11LM",
        Some(server),
        vec![
            ("Server", Value::Ref(server.clone())),
            ("Topic", Value::from(topic)),
            ("Qos", Value::from(0i64)),
            ("RxMessageFn", Value::from("")),
            ("Contact", Value::from(true)),
            ("Battery", Value::from(0i64)),
            ("GetTrigger", Value::from(0i64)),
        ],
    )
}

fn seed_relay(h: &Harness, server: &EntityId, topic: &str) -> EntityId {
    h.backend.create_entity(
        "AqaraLLKZMK12LM",
        Some(server),
        vec![
            ("Server", Value::Ref(server.clone())),
            ("Topic", Value::from(topic)),
            ("Qos", Value::from(0i64)),
            ("RxMessageFn", Value::from("")),
            ("StateOnTrigger", Value::from(0i64)),
            ("StateOffTrigger", Value::from(0i64)),
            ("GetTrigger", Value::from(0i64)),
        ],
    )
}

fn counter(h: &Harness, entity: &EntityId, field: &str) -> i64 {
    h.backend
        .peek(entity, field)
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
}

#[tokio::test]
async fn cold_leader_start_connects_enabled_server() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);

    h.backend.grant_leadership();
    h.worker.pump().await;

    assert!(h.worker.is_leader());
    assert_eq!(h.worker.pool().len(), 1);
    assert!(h.worker.pool().contains(BROKER));

    let client = h.factory.client_for(BROKER).expect("client made");
    assert_eq!(client.connect_count.load(Ordering::SeqCst), 1);
    assert!(client.is_connected());
    assert_eq!(h.backend.peek(&server, "IsConnected"), Some(Value::Bool(true)));
}

#[tokio::test]
async fn never_leader_means_no_sockets_and_no_writes() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);
    seed_door_sensor(&h, &server, "sensors/door1");

    // Traffic arrives without this replica ever being elected.
    h.store
        .write(
            &server,
            "TxMessage",
            r#"{"topic":"t","qos":0,"retained":false,"payload":{"x":1}}"#,
        )
        .await
        .unwrap();
    h.events_tx
        .send(LinkEvent::MessageReceived {
            address: BROKER.to_string(),
            message: MqttMessage {
                topic: "sensors/door1".to_string(),
                payload: br#"{"contact":false}"#.to_vec(),
                qos: 0,
                retained: false,
                duplicate: false,
            },
        })
        .await
        .unwrap();
    h.worker.pump().await;

    assert!(h.worker.pool().is_empty());
    assert!(h.factory.client_for(BROKER).is_none());
    assert_eq!(h.backend.peek(&server, "IsConnected"), Some(Value::Bool(false)));
    assert_eq!(counter(&h, &server, "TotalReceived"), 0);
    assert_eq!(counter(&h, &server, "TotalSent"), 0);
    assert_eq!(counter(&h, &server, "TotalDropped"), 0);
}

#[tokio::test]
async fn disabled_server_is_pooled_but_not_connected() {
    let mut h = harness();
    seed_server(&h, BROKER, false);

    h.backend.grant_leadership();
    h.worker.pump().await;

    assert!(h.worker.pool().contains(BROKER));
    let client = h.factory.client_for(BROKER).expect("client made");
    assert_eq!(client.connect_count.load(Ordering::SeqCst), 0);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn reinitialize_is_idempotent_on_the_pool() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);

    h.backend.grant_leadership();
    h.worker.pump().await;

    // A schema update reruns the whole reconcile; the pooled client
    // must be reused, not replaced.
    let root = h.store.query_all("Root").await.unwrap();
    h.store
        .write(&root[0].id, "SchemaUpdateTrigger", 1i64)
        .await
        .unwrap();
    h.worker.pump().await;

    assert_eq!(h.factory.made_count(BROKER), 1);
    assert_eq!(h.worker.pool().len(), 1);

    // Tokens were rebound, not duplicated: one TxMessage write causes
    // exactly one publish.
    h.store
        .write(
            &server,
            "TxMessage",
            r#"{"topic":"cmd","qos":0,"retained":false,"payload":"ping"}"#,
        )
        .await
        .unwrap();
    h.worker.pump().await;
    let client = h.factory.client_for(BROKER).unwrap();
    assert_eq!(client.published().len(), 1);
    assert_eq!(counter(&h, &server, "TotalSent"), 1);
}

#[tokio::test]
async fn address_rename_retires_the_old_client() {
    let mut h = harness();
    let server = seed_server(&h, "tcp://a:1883", true);

    h.backend.grant_leadership();
    h.worker.pump().await;
    let old = h.factory.client_for("tcp://a:1883").expect("old client");
    assert!(old.is_connected());

    h.store.write(&server, "Address", BROKER).await.unwrap();
    h.worker.pump().await;

    assert!(old.destroyed.load(Ordering::SeqCst));
    assert!(!h.worker.pool().contains("tcp://a:1883"));
    assert!(h.worker.pool().contains(BROKER));
    let new = h.factory.client_for(BROKER).expect("new client");
    assert!(new.is_connected());
    assert_eq!(h.worker.pool().len(), 1);
}

#[tokio::test]
async fn disable_while_connected_closes_but_keeps_the_pool_entry() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);

    h.backend.grant_leadership();
    h.worker.pump().await;
    assert_eq!(h.backend.peek(&server, "IsConnected"), Some(Value::Bool(true)));

    h.store.write(&server, "Enabled", false).await.unwrap();
    h.worker.pump().await;

    let client = h.factory.client_for(BROKER).unwrap();
    assert!(!client.is_connected());
    assert!(!client.destroyed.load(Ordering::SeqCst));
    assert!(h.worker.pool().contains(BROKER));
    assert_eq!(h.backend.peek(&server, "IsConnected"), Some(Value::Bool(false)));
}

#[tokio::test]
async fn enable_toggle_reconnects_the_pooled_client() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, false);

    h.backend.grant_leadership();
    h.worker.pump().await;

    h.store.write(&server, "Enabled", true).await.unwrap();
    h.worker.pump().await;

    let client = h.factory.client_for(BROKER).unwrap();
    assert!(client.is_connected());
    assert_eq!(h.backend.peek(&server, "IsConnected"), Some(Value::Bool(true)));
}

#[tokio::test]
async fn subscriptions_are_installed_on_every_establishment() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);
    seed_door_sensor(&h, &server, "sensors/door1");
    seed_relay(&h, &server, "relays/r1");

    h.backend.grant_leadership();
    h.worker.pump().await;

    let client = h.factory.client_for(BROKER).unwrap();
    assert_eq!(
        client.subscribed_topics(),
        vec!["sensors/door1".to_string(), "relays/r1".to_string()]
    );

    // A reconnect redelivers ConnectionEstablished; the same topics
    // are installed again on the fresh session.
    h.events_tx
        .send(LinkEvent::ConnectionEstablished {
            address: BROKER.to_string(),
        })
        .await
        .unwrap();
    h.worker.pump().await;
    assert_eq!(client.subscribed_topics().len(), 4);
}

#[tokio::test]
async fn connection_lost_clears_observed_state() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);

    h.backend.grant_leadership();
    h.worker.pump().await;

    h.events_tx
        .send(LinkEvent::ConnectionLost {
            address: BROKER.to_string(),
            error: "connection reset by peer".to_string(),
        })
        .await
        .unwrap();
    h.worker.pump().await;

    assert_eq!(h.backend.peek(&server, "IsConnected"), Some(Value::Bool(false)));
}

#[tokio::test]
async fn received_messages_increment_exactly_once_each() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);

    h.backend.grant_leadership();
    h.worker.pump().await;
    let client = h.factory.client_for(BROKER).unwrap();

    for _ in 0..5 {
        client.deliver("sensors/door1", br#"{"contact":true}"#).await;
    }
    h.worker.pump().await;

    assert_eq!(counter(&h, &server, "TotalReceived"), 5);
}

#[tokio::test]
async fn door_sensor_round_trip_is_idempotent() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);
    let sensor = seed_door_sensor(&h, &server, "sensors/door1");

    h.backend.grant_leadership();
    h.worker.pump().await;
    let client = h.factory.client_for(BROKER).unwrap();

    let payload = br#"{"contact":false,"battery":97,"voltage":2995,"linkquality":84}"#;
    client.deliver("sensors/door1", payload).await;
    h.worker.pump().await;

    assert_eq!(h.backend.peek(&sensor, "Contact"), Some(Value::Bool(false)));
    assert_eq!(h.backend.peek(&sensor, "Battery"), Some(Value::Int(97)));
    assert_eq!(h.backend.peek(&sensor, "Voltage"), Some(Value::Int(2995)));
    // Fields absent from the payload are written as their zero value.
    assert_eq!(h.backend.peek(&sensor, "DeviceTemperature"), Some(Value::Int(0)));

    let record = h
        .backend
        .peek(&sensor, "RxMessageFn")
        .and_then(|v| v.as_str().map(str::to_string))
        .expect("delivery record written");
    let record: serde_json::Value = serde_json::from_str(&record).unwrap();
    assert_eq!(record["topic"], "sensors/door1");
    assert_eq!(record["payload"]["contact"], false);
    assert_eq!(record["payload"]["battery"], 97);

    // Re-delivering the same message changes nothing but the counter.
    client.deliver("sensors/door1", payload).await;
    h.worker.pump().await;
    assert_eq!(h.backend.peek(&sensor, "Contact"), Some(Value::Bool(false)));
    assert_eq!(counter(&h, &server, "TotalReceived"), 2);
}

#[tokio::test]
async fn non_json_payload_is_recorded_as_string() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);
    let sensor = seed_door_sensor(&h, &server, "sensors/door1");

    h.backend.grant_leadership();
    h.worker.pump().await;
    let client = h.factory.client_for(BROKER).unwrap();

    client.deliver("sensors/door1", b"OFFLINE").await;
    h.worker.pump().await;

    let record = h
        .backend
        .peek(&sensor, "RxMessageFn")
        .and_then(|v| v.as_str().map(str::to_string))
        .expect("delivery record written");
    let record: serde_json::Value = serde_json::from_str(&record).unwrap();
    assert_eq!(record["payload"], "OFFLINE");
    // The undecodable payload left the typed fields alone.
    assert_eq!(h.backend.peek(&sensor, "Contact"), Some(Value::Bool(true)));
}

#[tokio::test]
async fn fanout_first_matching_child_wins() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);
    let first = seed_door_sensor(&h, &server, "sensors/door1");
    let twin = seed_door_sensor(&h, &server, "sensors/door1");
    let other = seed_door_sensor(&h, &server, "sensors/door2");

    h.backend.grant_leadership();
    h.worker.pump().await;
    let client = h.factory.client_for(BROKER).unwrap();

    client.deliver("sensors/door1", br#"{"contact":false}"#).await;
    h.worker.pump().await;

    assert_eq!(h.backend.peek(&first, "Contact"), Some(Value::Bool(false)));
    assert_eq!(h.backend.peek(&twin, "Contact"), Some(Value::Bool(true)));
    assert_eq!(h.backend.peek(&other, "Contact"), Some(Value::Bool(true)));
    assert_eq!(counter(&h, &server, "TotalReceived"), 1);
}

#[tokio::test]
async fn tx_message_publishes_while_connected() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);

    h.backend.grant_leadership();
    h.worker.pump().await;

    for _ in 0..3 {
        h.store
            .write(
                &server,
                "TxMessage",
                r#"{"topic":"house/cmd","qos":1,"retained":true,"payload":{"x":1}}"#,
            )
            .await
            .unwrap();
    }
    h.worker.pump().await;

    let client = h.factory.client_for(BROKER).unwrap();
    let published = client.published();
    assert_eq!(published.len(), 3);
    assert_eq!(published[0].0, "house/cmd");
    let body: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
    assert_eq!(body, serde_json::json!({"x": 1}));
    assert_eq!(counter(&h, &server, "TotalSent"), 3);
    assert_eq!(counter(&h, &server, "TotalDropped"), 0);
}

#[tokio::test]
async fn tx_message_while_disconnected_counts_a_drop() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);
    h.factory.auto_establish.store(false, Ordering::SeqCst);

    h.backend.grant_leadership();
    h.worker.pump().await;
    let client = h.factory.client_for(BROKER).unwrap();
    assert!(!client.is_connected());

    h.store
        .write(
            &server,
            "TxMessage",
            r#"{"topic":"t","qos":0,"retained":false,"payload":{"x":1}}"#,
        )
        .await
        .unwrap();
    h.worker.pump().await;

    assert!(client.published().is_empty());
    assert_eq!(counter(&h, &server, "TotalDropped"), 1);
    assert_eq!(counter(&h, &server, "TotalSent"), 0);
}

#[tokio::test]
async fn malformed_tx_message_is_dropped_without_counting() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);

    h.backend.grant_leadership();
    h.worker.pump().await;

    h.store
        .write(&server, "TxMessage", "this is not json")
        .await
        .unwrap();
    h.worker.pump().await;

    let client = h.factory.client_for(BROKER).unwrap();
    assert!(client.published().is_empty());
    assert_eq!(counter(&h, &server, "TotalSent"), 0);
    assert_eq!(counter(&h, &server, "TotalDropped"), 0);
}

#[tokio::test]
async fn relay_triggers_publish_zigbee_commands() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);
    let relay = seed_relay(&h, &server, "relays/r1");

    h.backend.grant_leadership();
    h.worker.pump().await;
    let client = h.factory.client_for(BROKER).unwrap();

    h.store.write(&relay, "StateOnTrigger", 1i64).await.unwrap();
    h.store.write(&relay, "StateOffTrigger", 1i64).await.unwrap();
    h.store.write(&relay, "GetTrigger", 1i64).await.unwrap();
    h.worker.pump().await;

    let published = client.published();
    assert_eq!(published.len(), 3);
    assert_eq!(published[0].0, "relays/r1/set");
    assert_eq!(published[0].1, br#"{"state_l1":"ON"}"#.to_vec());
    assert_eq!(published[1].0, "relays/r1/set");
    assert_eq!(published[1].1, br#"{"state_l1":"OFF"}"#.to_vec());
    assert_eq!(published[2].0, "relays/r1/get");
    assert_eq!(published[2].1, br#"{"state":""}"#.to_vec());
    assert_eq!(counter(&h, &server, "TotalSent"), 3);
}

#[tokio::test]
async fn repeated_trigger_writes_fire_every_time() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);
    let relay = seed_relay(&h, &server, "relays/r1");

    h.backend.grant_leadership();
    h.worker.pump().await;

    // Same value written twice: a trigger is about the write, not the
    // value change.
    h.store.write(&relay, "StateOnTrigger", 1i64).await.unwrap();
    h.store.write(&relay, "StateOnTrigger", 1i64).await.unwrap();
    h.worker.pump().await;

    let client = h.factory.client_for(BROKER).unwrap();
    assert_eq!(client.published().len(), 2);
    assert_eq!(counter(&h, &server, "TotalSent"), 2);
}

#[tokio::test]
async fn lost_leadership_destroys_clients_and_gates_the_queue() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);

    h.backend.grant_leadership();
    h.worker.pump().await;
    let client = h.factory.client_for(BROKER).unwrap();

    for _ in 0..4 {
        client.deliver("any/topic", b"{}").await;
    }
    h.worker.pump().await;
    assert_eq!(counter(&h, &server, "TotalReceived"), 4);

    // Leadership is revoked with six more messages still queued; the
    // revocation is handled first and everything after short-circuits.
    for _ in 0..6 {
        client.deliver("any/topic", b"{}").await;
    }
    h.backend.revoke_leadership();
    h.worker.pump().await;

    assert!(!h.worker.is_leader());
    assert!(client.destroyed.load(Ordering::SeqCst));
    assert!(h.worker.pool().is_empty());
    assert_eq!(h.backend.peek(&server, "IsConnected"), Some(Value::Bool(false)));
    assert_eq!(counter(&h, &server, "TotalReceived"), 4);
}

#[tokio::test]
async fn regaining_leadership_reconnects_from_scratch() {
    let mut h = harness();
    let server = seed_server(&h, BROKER, true);

    h.backend.grant_leadership();
    h.worker.pump().await;
    h.backend.revoke_leadership();
    h.worker.pump().await;
    assert!(h.worker.pool().is_empty());

    h.backend.grant_leadership();
    h.worker.pump().await;

    assert_eq!(h.factory.made_count(BROKER), 2);
    let client = h.factory.client_for(BROKER).unwrap();
    assert!(client.is_connected());
    assert_eq!(h.backend.peek(&server, "IsConnected"), Some(Value::Bool(true)));
}
