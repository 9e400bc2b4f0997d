// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! Mock implementations of the platform's external collaborators: the OPC
//! UA subscription stack, the endpoint inventory, and the message sink.
//!
//! ## Design Principles
//!
//! - Configurable behavior for different test scenarios
//! - Recording of interactions for verification
//! - Thread-safe for concurrent testing
//! - Easy to set up error injection

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use pulse_core::endpoint::{Endpoint, EndpointQuery, EndpointRegistry};
use pulse_core::error::{EngineError, EngineResult, RegistryError, RegistryResult, SinkError};
use pulse_core::message::{
    EventSample, MonitoredItemSample, NetworkMessage, NotificationPayload, OutboundMessage,
};
use pulse_core::model::WriterGroup;
use pulse_core::types::{ConnectionState, EndpointId, StatusCode};
use pulse_engine::client::{
    MonitoredItemRequest, MonitoredItemResult, SessionInfo, SubscriptionClient,
    SubscriptionHandle, SubscriptionListener, SubscriptionModel, SubscriptionNotification,
};
use pulse_engine::engine::SinkFactory;
use pulse_engine::sink::{MessageSink, SinkSettings};

// =============================================================================
// Endpoint Inventory
// =============================================================================

/// A fixed in-memory endpoint inventory.
pub struct InMemoryEndpoints {
    endpoints: RwLock<Vec<Endpoint>>,
}

impl InMemoryEndpoints {
    /// Creates an inventory holding the given endpoints.
    pub fn new(endpoints: Vec<Endpoint>) -> Arc<Self> {
        Arc::new(Self {
            endpoints: RwLock::new(endpoints),
        })
    }

    /// Adds an endpoint to the inventory.
    pub fn add(&self, endpoint: Endpoint) {
        self.endpoints.write().push(endpoint);
    }
}

#[async_trait]
impl EndpointRegistry for InMemoryEndpoints {
    async fn get_endpoint(&self, id: &EndpointId) -> RegistryResult<Endpoint> {
        self.endpoints
            .read()
            .iter()
            .find(|e| &e.id == id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found("endpoint", id))
    }

    async fn query_endpoints(&self, query: &EndpointQuery) -> RegistryResult<Vec<Endpoint>> {
        Ok(self
            .endpoints
            .read()
            .iter()
            .filter(|e| {
                e.url == query.url
                    && e.security_mode == query.security_mode
                    && e.security_policy == query.security_policy
            })
            .cloned()
            .collect())
    }
}

// =============================================================================
// Mock Subscription Stack
// =============================================================================

/// A configurable mock of the OPC UA subscription client.
///
/// Tests inject faults (connection refusal, unknown nodes) and drive
/// notifications through the handles the engine opened.
pub struct MockSubscriptionClient {
    /// Node ids (string form) that report `BadNodeIdUnknown` on apply.
    bad_nodes: Arc<RwLock<HashSet<String>>>,

    /// Refuse all create-subscription calls.
    fail_connection: AtomicBool,

    /// Hand out subscriptions that do not report themselves enabled.
    create_disabled: AtomicBool,

    /// Create count for verification.
    create_count: AtomicU64,

    /// Every handle ever created, in creation order.
    handles: Mutex<Vec<Arc<MockSubscriptionHandle>>>,

    next_subscription_id: AtomicU32,
}

impl MockSubscriptionClient {
    /// Creates a healthy mock client.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            bad_nodes: Arc::new(RwLock::new(HashSet::new())),
            fail_connection: AtomicBool::new(false),
            create_disabled: AtomicBool::new(false),
            create_count: AtomicU64::new(0),
            handles: Mutex::new(Vec::new()),
            next_subscription_id: AtomicU32::new(0),
        })
    }

    /// Makes the given node id report `BadNodeIdUnknown` when applied.
    pub fn mark_bad_node(&self, node_id: &str) {
        self.bad_nodes.write().insert(node_id.to_string());
    }

    /// Refuses all subsequent create-subscription calls.
    pub fn fail_connection(&self, fail: bool) {
        self.fail_connection.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequently created subscriptions report themselves not
    /// enabled, as a stack that defers enabling to its keep-alive path does.
    pub fn create_disabled(&self, disabled: bool) {
        self.create_disabled.store(disabled, Ordering::SeqCst);
    }

    /// Number of subscriptions created.
    pub fn create_count(&self) -> u64 {
        self.create_count.load(Ordering::SeqCst)
    }

    /// Every handle created, in creation order.
    pub fn handles(&self) -> Vec<Arc<MockSubscriptionHandle>> {
        self.handles.lock().clone()
    }

    /// The most recent open (not yet closed) handle, if any.
    pub fn live_handle(&self) -> Option<Arc<MockSubscriptionHandle>> {
        self.handles
            .lock()
            .iter()
            .rev()
            .find(|h| !h.is_closed())
            .cloned()
    }

    /// The most recent open handle connected to the given endpoint URL.
    pub fn live_handle_for(&self, endpoint_url: &str) -> Option<Arc<MockSubscriptionHandle>> {
        self.handles
            .lock()
            .iter()
            .rev()
            .find(|h| !h.is_closed() && h.endpoint_url() == endpoint_url)
            .cloned()
    }
}

#[async_trait]
impl SubscriptionClient for MockSubscriptionClient {
    async fn create_subscription(
        &self,
        model: SubscriptionModel,
        listener: Arc<dyn SubscriptionListener>,
    ) -> EngineResult<Arc<dyn SubscriptionHandle>> {
        if self.fail_connection.load(Ordering::SeqCst) {
            return Err(EngineError::service_fault(StatusCode::BAD_NOT_CONNECTED));
        }
        self.create_count.fetch_add(1, Ordering::SeqCst);
        let handle = Arc::new(MockSubscriptionHandle {
            subscription_id: self.next_subscription_id.fetch_add(1, Ordering::SeqCst) + 1,
            model,
            listener,
            bad_nodes: Arc::clone(&self.bad_nodes),
            items: RwLock::new(Vec::new()),
            enabled: AtomicBool::new(!self.create_disabled.load(Ordering::SeqCst)),
            closed: AtomicBool::new(false),
            apply_count: AtomicU64::new(0),
            activate_count: AtomicU64::new(0),
            close_count: AtomicU64::new(0),
            next_server_id: AtomicU32::new(100),
        });
        self.handles.lock().push(Arc::clone(&handle));
        Ok(handle)
    }
}

/// A mock live subscription.
pub struct MockSubscriptionHandle {
    subscription_id: u32,
    model: SubscriptionModel,
    listener: Arc<dyn SubscriptionListener>,
    bad_nodes: Arc<RwLock<HashSet<String>>>,
    items: RwLock<Vec<MonitoredItemRequest>>,
    enabled: AtomicBool,
    closed: AtomicBool,
    apply_count: AtomicU64,
    activate_count: AtomicU64,
    close_count: AtomicU64,
    next_server_id: AtomicU32,
}

impl MockSubscriptionHandle {
    /// The URL this handle is connected to.
    pub fn endpoint_url(&self) -> &str {
        &self.model.endpoint.url
    }

    /// Whether the handle has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// How often `apply` was called.
    pub fn apply_count(&self) -> u64 {
        self.apply_count.load(Ordering::SeqCst)
    }

    /// How often `activate` was called.
    pub fn activate_count(&self) -> u64 {
        self.activate_count.load(Ordering::SeqCst)
    }

    /// How often `close` was called.
    pub fn close_count(&self) -> u64 {
        self.close_count.load(Ordering::SeqCst)
    }

    /// The monitored items currently applied.
    pub fn applied_items(&self) -> Vec<MonitoredItemRequest> {
        self.items.read().clone()
    }

    /// Delivers a data-change notification for the item monitoring the
    /// given node.
    ///
    /// # Panics
    ///
    /// Panics if no applied item monitors the node.
    pub async fn emit_value(&self, node_id: &str, value: serde_json::Value) {
        let item = {
            self.items
                .read()
                .iter()
                .find(|i| !i.is_event && i.node_id.to_string() == node_id)
                .cloned()
                .unwrap_or_else(|| panic!("no monitored item for node '{}'", node_id))
        };
        let sample = MonitoredItemSample {
            client_handle: item.client_handle,
            node_id: Some(item.node_id.clone()),
            display_name: item.display_name.clone(),
            value,
            status: StatusCode::GOOD,
            source_timestamp: Some(Utc::now()),
            server_timestamp: None,
        };
        self.listener
            .on_notification(SubscriptionNotification {
                subscription_id: self.subscription_id,
                payload: NotificationPayload::DataChange(vec![sample]),
                string_table: Vec::new(),
            })
            .await;
    }

    /// Delivers an event notification for the applied event item.
    ///
    /// # Panics
    ///
    /// Panics if no applied item is an event item.
    pub async fn emit_event(&self, fields: Vec<(&str, serde_json::Value)>) {
        let item = {
            self.items
                .read()
                .iter()
                .find(|i| i.is_event)
                .cloned()
                .expect("no event monitored item applied")
        };
        let sample = EventSample {
            client_handle: item.client_handle,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        self.listener
            .on_notification(SubscriptionNotification {
                subscription_id: self.subscription_id,
                payload: NotificationPayload::Event(vec![sample]),
                string_table: Vec::new(),
            })
            .await;
    }

    /// Delivers a connectivity-change callback.
    pub async fn emit_connectivity(&self, state: ConnectionState) {
        self.listener.on_connectivity_change(state).await;
    }

    /// Delivers a subscription-status callback.
    pub async fn emit_subscription_status(&self, status: StatusCode) {
        self.listener.on_subscription_status(status).await;
    }
}

#[async_trait]
impl SubscriptionHandle for MockSubscriptionHandle {
    async fn apply(
        &self,
        items: Vec<MonitoredItemRequest>,
    ) -> EngineResult<Vec<MonitoredItemResult>> {
        self.apply_count.fetch_add(1, Ordering::SeqCst);
        let bad = self.bad_nodes.read().clone();
        let results = items
            .iter()
            .map(|item| {
                if bad.contains(&item.node_id.to_string()) {
                    MonitoredItemResult {
                        client_handle: item.client_handle,
                        server_id: None,
                        status: StatusCode::BAD_NODE_ID_UNKNOWN,
                    }
                } else {
                    MonitoredItemResult {
                        client_handle: item.client_handle,
                        server_id: Some(self.next_server_id.fetch_add(1, Ordering::SeqCst)),
                        status: StatusCode::GOOD,
                    }
                }
            })
            .collect();
        *self.items.write() = items;
        Ok(results)
    }

    async fn activate(&self) -> EngineResult<()> {
        self.activate_count.fetch_add(1, Ordering::SeqCst);
        self.enabled.store(true, Ordering::SeqCst);
        self.listener
            .on_connectivity_change(ConnectionState::Connected)
            .await;
        Ok(())
    }

    async fn close(&self) -> EngineResult<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst) && !self.is_closed()
    }

    fn session(&self) -> SessionInfo {
        SessionInfo {
            endpoint_url: self.model.endpoint.url.clone(),
            application_uri: self.model.endpoint.application_uri.clone(),
        }
    }
}

// =============================================================================
// Collecting Sink
// =============================================================================

/// A sink that records every flushed network message in memory.
pub struct CollectingSink {
    messages: Arc<Mutex<Vec<NetworkMessage>>>,
    buffer: Mutex<Vec<OutboundMessage>>,
    batch_size: AtomicUsize,
    accept_events: bool,
    closed: AtomicBool,
}

impl CollectingSink {
    fn new(messages: Arc<Mutex<Vec<NetworkMessage>>>, accept_events: bool) -> Arc<Self> {
        Arc::new(Self {
            messages,
            buffer: Mutex::new(Vec::new()),
            batch_size: AtomicUsize::new(1),
            accept_events,
            closed: AtomicBool::new(false),
        })
    }

    /// Whether the sink has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn flush(&self, batch: Vec<OutboundMessage>) {
        if !batch.is_empty() {
            self.messages.lock().push(NetworkMessage::from_batch(&batch));
        }
    }
}

impl MessageSink for CollectingSink {
    fn enqueue(&self, message: OutboundMessage) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        let batch = {
            let mut buffer = self.buffer.lock();
            buffer.push(message);
            if buffer.len() >= self.batch_size.load(Ordering::SeqCst) {
                std::mem::take(&mut *buffer)
            } else {
                Vec::new()
            }
        };
        self.flush(batch);
        Ok(())
    }

    fn apply_settings(&self, settings: SinkSettings) {
        self.batch_size
            .store(settings.batch_size.max(1), Ordering::SeqCst);
    }

    fn accepts_events(&self) -> bool {
        self.accept_events
    }

    fn close(&self) -> Result<(), SinkError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let remaining = std::mem::take(&mut *self.buffer.lock());
            self.flush(remaining);
        }
        Ok(())
    }
}

/// Factory handing one [`CollectingSink`] per created pipeline, with all
/// messages aggregated for inspection.
pub struct CollectingSinkFactory {
    messages: Arc<Mutex<Vec<NetworkMessage>>>,
    sinks: Mutex<Vec<Arc<CollectingSink>>>,
    accept_events: bool,
}

impl CollectingSinkFactory {
    /// Creates a factory whose sinks accept both data and event envelopes.
    pub fn new() -> Arc<Self> {
        Self::with_events(true)
    }

    /// Creates a factory whose sinks reject event envelopes.
    pub fn data_only() -> Arc<Self> {
        Self::with_events(false)
    }

    fn with_events(accept_events: bool) -> Arc<Self> {
        Arc::new(Self {
            messages: Arc::new(Mutex::new(Vec::new())),
            sinks: Mutex::new(Vec::new()),
            accept_events,
        })
    }

    /// Every network message flushed so far, across all sinks.
    pub fn messages(&self) -> Vec<NetworkMessage> {
        self.messages.lock().clone()
    }

    /// Number of network messages flushed so far.
    pub fn message_count(&self) -> usize {
        self.messages.lock().len()
    }

    /// Forgets all recorded messages.
    pub fn clear(&self) {
        self.messages.lock().clear();
    }

    /// Every sink created so far, in creation order.
    pub fn sinks(&self) -> Vec<Arc<CollectingSink>> {
        self.sinks.lock().clone()
    }
}

impl SinkFactory for CollectingSinkFactory {
    fn create_sink(&self, _group: &WriterGroup) -> Arc<dyn MessageSink> {
        let sink = CollectingSink::new(Arc::clone(&self.messages), self.accept_events);
        self.sinks.lock().push(Arc::clone(&sink));
        sink
    }
}
