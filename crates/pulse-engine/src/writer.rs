// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-writer subscription lifecycle.
//!
//! A [`DataSetWriterSubscription`] owns one live OPC UA subscription for one
//! dataset writer: it applies the writer's published items as monitored
//! items, translates stack callbacks into state reports, and turns
//! notifications into [`OutboundMessage`] envelopes with a monotonic
//! per-writer sequence number.
//!
//! Reconfiguration is tear-down-before-rebuild: the previous handle is
//! closed before a new subscription is created, so two live subscriptions
//! never sample the same writer. The envelope path is lock-free: everything
//! it needs is cached in a [`WriterContext`] at configure time.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, warn};

use pulse_core::endpoint::Endpoint;
use pulse_core::error::EngineResult;
use pulse_core::message::{MetaDataVersion, OutboundMessage};
use pulse_core::model::{
    DataSetWriter, PublishedDataSetEvents, PublishedDataSetVariable, PublishedItemState,
    SourceState,
};
use pulse_core::types::{
    ConnectionState, DataSetWriterId, VariableId, WriterGroupId, WriterGroupState,
};
use pulse_registry::WriterGroupRegistry;

use crate::client::{
    MonitoredItemRequest, MonitoredItemResult, SubscriptionClient, SubscriptionHandle,
    SubscriptionListener, SubscriptionModel, SubscriptionNotification,
};

// =============================================================================
// Contracts
// =============================================================================

/// Where the engine delivers runtime state observations.
///
/// Implemented over the registry's state-update path in production; test
/// doubles record the calls instead.
#[async_trait]
pub trait StateReporter: Send + Sync {
    /// Reports a writer-level source state.
    async fn source_state(&self, writer_id: &DataSetWriterId, state: SourceState);

    /// Reports a published variable's monitored-item state.
    async fn variable_state(
        &self,
        writer_id: &DataSetWriterId,
        variable_id: &VariableId,
        state: PublishedItemState,
    );

    /// Reports an event dataset's monitored-item state.
    async fn events_state(&self, writer_id: &DataSetWriterId, state: PublishedItemState);

    /// Reports a group state observed by the pipeline.
    async fn group_state(&self, group_id: &WriterGroupId, state: WriterGroupState);
}

/// Receiver of translated dataset envelopes.
///
/// The writer group data source implements this; writers hold it weakly so
/// a torn-down source cannot be kept alive by late notifications.
#[async_trait]
pub trait DataSetNotificationSink: Send + Sync {
    /// Accepts one outbound envelope.
    async fn on_dataset_message(&self, message: OutboundMessage);
}

// =============================================================================
// Resolved Writer
// =============================================================================

/// A dataset writer with its endpoint and published items resolved from the
/// registry: everything needed to open and configure its subscription.
#[derive(Debug, Clone)]
pub struct ResolvedWriter {
    /// The writer's configuration.
    pub writer: DataSetWriter,
    /// The endpoint the subscription connects to.
    pub endpoint: Endpoint,
    /// The writer's published variables.
    pub variables: Vec<PublishedDataSetVariable>,
    /// The writer's event dataset, if it publishes events.
    pub events: Option<PublishedDataSetEvents>,
}

impl ResolvedWriter {
    /// Builds the subscription model for this writer.
    pub fn subscription_model(&self) -> SubscriptionModel {
        let settings = self
            .writer
            .dataset
            .subscription_settings
            .clone()
            .unwrap_or_default();
        SubscriptionModel {
            endpoint: self.endpoint.clone(),
            publishing_interval: settings.publishing_interval,
            keep_alive_count: settings.keep_alive_count,
            lifetime_count: settings.lifetime_count,
            priority: settings.priority,
            max_notifications_per_publish: settings.max_notifications_per_publish,
            resolve_display_name: settings.resolve_display_name.unwrap_or(false),
        }
    }

    /// Builds the monitored item set and the handle-to-item index.
    ///
    /// Client handles are assigned densely from 1; the event item, if any,
    /// takes the handle after the last variable.
    pub fn monitored_items(&self) -> (Vec<MonitoredItemRequest>, HashMap<u32, ItemBinding>) {
        let mut requests = Vec::with_capacity(self.variables.len() + 1);
        let mut bindings = HashMap::new();
        let mut handle = 0u32;

        for variable in &self.variables {
            handle += 1;
            bindings.insert(handle, ItemBinding::Variable(variable.id.clone()));
            requests.push(MonitoredItemRequest {
                client_handle: handle,
                node_id: variable.node_id.clone(),
                display_name: variable.display_name.clone(),
                is_event: false,
                sampling_interval: variable.sampling_interval,
                queue_size: variable.queue_size,
                discard_new: variable.discard_new,
                monitoring_mode: variable.monitoring_mode,
                deadband_type: variable.deadband_type,
                deadband_value: variable.deadband_value,
                data_change_trigger: variable.data_change_trigger,
                selected_fields: Vec::new(),
                filter: None,
            });
        }

        if let Some(events) = &self.events {
            handle += 1;
            bindings.insert(handle, ItemBinding::Events);
            requests.push(MonitoredItemRequest {
                client_handle: handle,
                node_id: events.notifier.clone(),
                display_name: None,
                is_event: true,
                sampling_interval: None,
                queue_size: events.queue_size,
                discard_new: events.discard_new,
                monitoring_mode: events.monitoring_mode,
                deadband_type: None,
                deadband_value: None,
                data_change_trigger: None,
                selected_fields: events.selected_fields.clone(),
                filter: events.filter.clone(),
            });
        }

        (requests, bindings)
    }

    /// Returns `true` if the writer publishes an event dataset.
    pub fn publishes_events(&self) -> bool {
        self.events.is_some()
    }
}

/// What a client handle is bound to.
#[derive(Debug, Clone)]
pub enum ItemBinding {
    /// A published variable.
    Variable(VariableId),
    /// The writer's event dataset.
    Events,
}

// =============================================================================
// Writer Context
// =============================================================================

/// Immutable per-writer data cached for the envelope hot path.
#[derive(Debug, Clone)]
pub struct WriterContext {
    /// The writer's id.
    pub writer_id: DataSetWriterId,
    /// The writer's group.
    pub writer_group_id: WriterGroupId,
    /// Publisher id stamped on every envelope.
    pub publisher_id: String,
    /// The sampled endpoint's URL.
    pub endpoint_url: String,
    /// Static extension fields merged into every dataset message.
    pub extension_fields: BTreeMap<String, serde_json::Value>,
}

impl WriterContext {
    /// Builds the context for a resolved writer.
    pub fn new(resolved: &ResolvedWriter, publisher_id: &str) -> Self {
        Self {
            writer_id: resolved.writer.id.clone(),
            writer_group_id: resolved.writer.writer_group_id.clone(),
            publisher_id: publisher_id.to_string(),
            endpoint_url: resolved.endpoint.url.clone(),
            extension_fields: resolved
                .writer
                .dataset
                .extension_fields
                .clone()
                .unwrap_or_default(),
        }
    }
}

// =============================================================================
// Writer Subscription
// =============================================================================

/// One writer's live subscription.
pub struct DataSetWriterSubscription {
    inner: Arc<WriterSubscriptionInner>,
}

struct WriterSubscriptionInner {
    context: WriterContext,
    reporter: Arc<dyn StateReporter>,
    sink: Weak<dyn DataSetNotificationSink>,
    sequence: AtomicU64,
    connect_retries: AtomicU64,
    disposed: AtomicBool,
    connection: RwLock<ConnectionState>,
    handle: tokio::sync::Mutex<Option<Arc<dyn SubscriptionHandle>>>,
    items: RwLock<HashMap<u32, ItemBinding>>,
}

impl DataSetWriterSubscription {
    /// Creates an unconfigured subscription for a resolved writer.
    pub fn new(
        resolved: &ResolvedWriter,
        publisher_id: &str,
        sink: Weak<dyn DataSetNotificationSink>,
        reporter: Arc<dyn StateReporter>,
    ) -> Self {
        Self {
            inner: Arc::new(WriterSubscriptionInner {
                context: WriterContext::new(resolved, publisher_id),
                reporter,
                sink,
                sequence: AtomicU64::new(0),
                connect_retries: AtomicU64::new(0),
                disposed: AtomicBool::new(false),
                connection: RwLock::new(ConnectionState::Disconnected),
                handle: tokio::sync::Mutex::new(None),
                items: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The writer this subscription samples.
    pub fn writer_id(&self) -> &DataSetWriterId {
        &self.inner.context.writer_id
    }

    /// How often the session re-entered `Connecting`. Diagnostic only.
    pub fn connect_retries(&self) -> u64 {
        self.inner.connect_retries.load(Ordering::Relaxed)
    }

    /// Opens (or reopens) the subscription and applies the writer's items.
    ///
    /// An existing subscription is closed first. Per-item apply results are
    /// reported through the state reporter before activation, and only a
    /// subscription that reports itself enabled is activated here.
    pub async fn configure(
        &self,
        client: &Arc<dyn SubscriptionClient>,
        resolved: &ResolvedWriter,
    ) -> EngineResult<()> {
        let mut slot = self.inner.handle.lock().await;
        if let Some(previous) = slot.take() {
            if let Err(e) = previous.close().await {
                warn!(writer_id = %self.writer_id(), error = %e, "Closing stale subscription failed");
            }
        }

        let (requests, bindings) = resolved.monitored_items();
        *self.inner.items.write() = bindings;

        let listener: Arc<dyn SubscriptionListener> = Arc::new(SubscriptionEventBridge {
            inner: Arc::downgrade(&self.inner),
        });
        let handle = client
            .create_subscription(resolved.subscription_model(), listener)
            .await?;

        let results = handle.apply(requests).await?;
        for result in results {
            self.inner.report_item_result(result).await;
        }

        // A subscription that does not yet report itself enabled gets
        // activated by the stack's keep-alive path, not here.
        if handle.enabled() {
            handle.activate().await?;
        } else {
            debug!(writer_id = %self.writer_id(), "Subscription not enabled; activation deferred to the stack");
        }
        *slot = Some(handle);
        debug!(writer_id = %self.writer_id(), "Writer subscription configured");
        Ok(())
    }

    /// Closes the subscription and drops the handle. Idempotent; late
    /// callbacks after disposal are discarded.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut slot = self.inner.handle.lock().await;
        if let Some(handle) = slot.take() {
            if let Err(e) = handle.close().await {
                warn!(writer_id = %self.writer_id(), error = %e, "Subscription close failed");
            }
        }
        debug!(writer_id = %self.writer_id(), "Writer subscription disposed");
    }
}

impl WriterSubscriptionInner {
    async fn report_item_result(&self, result: MonitoredItemResult) {
        let binding = self.items.read().get(&result.client_handle).cloned();
        let state = WriterGroupRegistry::item_state_from_report(
            Some(result.client_handle),
            result.server_id,
            result.status,
        );
        match binding {
            Some(ItemBinding::Variable(variable_id)) => {
                self.reporter
                    .variable_state(&self.context.writer_id, &variable_id, state)
                    .await;
            }
            Some(ItemBinding::Events) => {
                self.reporter
                    .events_state(&self.context.writer_id, state)
                    .await;
            }
            None => {
                debug!(
                    writer_id = %self.context.writer_id,
                    client_handle = result.client_handle,
                    "Item result for unknown handle"
                );
            }
        }
    }
}

// =============================================================================
// Callback Bridge
// =============================================================================

/// Adapts stack callbacks onto the subscription's state. Holds the inner
/// weakly so a disposed subscription can be dropped while the stack still
/// references its listener.
struct SubscriptionEventBridge {
    inner: Weak<WriterSubscriptionInner>,
}

#[async_trait]
impl SubscriptionListener for SubscriptionEventBridge {
    async fn on_connectivity_change(&self, state: ConnectionState) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if inner.disposed.load(Ordering::Acquire) {
            return;
        }
        if state == ConnectionState::Connecting {
            inner.connect_retries.fetch_add(1, Ordering::Relaxed);
        }
        *inner.connection.write() = state;
        inner
            .reporter
            .source_state(&inner.context.writer_id, SourceState::connected(state))
            .await;
    }

    async fn on_item_status(&self, result: MonitoredItemResult, _is_event: bool) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if inner.disposed.load(Ordering::Acquire) {
            return;
        }
        inner.report_item_result(result).await;
    }

    async fn on_subscription_status(&self, status: pulse_core::types::StatusCode) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if inner.disposed.load(Ordering::Acquire) {
            return;
        }
        let connection = *inner.connection.read();
        inner
            .reporter
            .source_state(
                &inner.context.writer_id,
                SourceState::with_result(connection, status),
            )
            .await;
    }

    async fn on_notification(&self, notification: SubscriptionNotification) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if inner.disposed.load(Ordering::Acquire) {
            return;
        }
        if matches!(
            notification.payload,
            pulse_core::message::NotificationPayload::KeepAlive
        ) {
            debug!(writer_id = %inner.context.writer_id, "Keep-alive");
            return;
        }

        let sequence = inner.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let message = OutboundMessage {
            writer_id: inner.context.writer_id.clone(),
            writer_group_id: inner.context.writer_group_id.clone(),
            sequence_number: sequence,
            publisher_id: inner.context.publisher_id.clone(),
            endpoint_url: inner.context.endpoint_url.clone(),
            timestamp: Utc::now(),
            meta_data_version: MetaDataVersion::default(),
            payload: notification.payload,
            string_table: notification.string_table,
            subscription_id: notification.subscription_id,
            extension_fields: inner.context.extension_fields.clone(),
        };

        match inner.sink.upgrade() {
            Some(sink) => sink.on_dataset_message(message).await,
            None => {
                debug!(writer_id = %inner.context.writer_id, "Notification after source teardown")
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::model::{DataSetWriterRequest, PublishedVariableRequest, SubscriptionSettings};
    use pulse_core::types::{EndpointId, NodeId};
    use std::time::Duration;

    fn resolved(variables: usize, events: bool) -> ResolvedWriter {
        let mut request = DataSetWriterRequest::for_endpoint(EndpointId::new("endpoint1"));
        request.dataset = Some(pulse_core::model::PublishedDataSet {
            name: Some("plant".to_string()),
            extension_fields: None,
            subscription_settings: Some(SubscriptionSettings {
                publishing_interval: Some(Duration::from_millis(500)),
                priority: Some(3),
                ..Default::default()
            }),
        });
        let writer = DataSetWriter::from_request(
            DataSetWriterId::new("w1"),
            WriterGroupId::new("g1"),
            request,
        );

        let variables = (0..variables)
            .map(|i| {
                PublishedDataSetVariable::from_request(
                    VariableId::new(format!("v{i}")),
                    writer.id.clone(),
                    PublishedVariableRequest::for_node(
                        NodeId::parse(&format!("ns=2;s=Var{i}")).unwrap(),
                    ),
                )
            })
            .collect();

        let events = events.then(|| {
            PublishedDataSetEvents::from_request(
                writer.id.clone(),
                pulse_core::model::PublishedEventsRequest {
                    notifier: NodeId::parse("i=2253").unwrap(),
                    selected_fields: Vec::new(),
                    filter: None,
                    monitoring_mode: None,
                    queue_size: None,
                    discard_new: None,
                },
            )
        });

        ResolvedWriter {
            writer,
            endpoint: Endpoint::insecure("endpoint1", "opc.tcp://one"),
            variables,
            events,
        }
    }

    #[test]
    fn test_monitored_items_handles_are_dense() {
        let (requests, bindings) = resolved(3, true).monitored_items();
        assert_eq!(requests.len(), 4);
        assert_eq!(bindings.len(), 4);

        let handles: Vec<u32> = requests.iter().map(|r| r.client_handle).collect();
        assert_eq!(handles, vec![1, 2, 3, 4]);

        assert!(matches!(bindings[&1], ItemBinding::Variable(_)));
        assert!(matches!(bindings[&4], ItemBinding::Events));
        assert!(requests[3].is_event);
    }

    #[test]
    fn test_subscription_model_from_settings() {
        let model = resolved(1, false).subscription_model();
        assert_eq!(model.publishing_interval, Some(Duration::from_millis(500)));
        assert_eq!(model.priority, Some(3));
        assert_eq!(model.endpoint.url, "opc.tcp://one");
        assert!(!model.resolve_display_name);
    }

    #[test]
    fn test_writer_context_caches_envelope_fields() {
        let context = WriterContext::new(&resolved(1, false), "urn:pulse:test");
        assert_eq!(context.writer_id.as_str(), "w1");
        assert_eq!(context.writer_group_id.as_str(), "g1");
        assert_eq!(context.endpoint_url, "opc.tcp://one");
        assert_eq!(context.publisher_id, "urn:pulse:test");
        assert!(context.extension_fields.is_empty());
    }
}
