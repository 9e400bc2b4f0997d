// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The writer group engine.
//!
//! The engine bridges the registry's configuration events to live
//! pipelines: group activation builds a sink and a data source, writer
//! events reconfigure the affected subscription incrementally, deactivation
//! tears the pipeline down sink-first. All pipelines live in a map owned by
//! the engine instance; there is no ambient global state.
//!
//! Per-group transitions are serialized on the group's record mutex, so an
//! activate racing a deactivate resolves in delivery order.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use pulse_core::broker::{DataSetWriterEvent, WriterGroupEvent, WriterGroupListener};
use pulse_core::endpoint::EndpointRegistry;
use pulse_core::model::{
    DataSetWriter, DataSetWriterFilter, PublishedItemState, PublishedVariableFilter, SourceState,
    WriterGroup, WriterGroupFilter,
};
use pulse_core::repository::ContinuationToken;
use pulse_core::types::{DataSetWriterId, VariableId, WriterGroupId, WriterGroupState};
use pulse_registry::WriterGroupRegistry;

use crate::client::SubscriptionClient;
use crate::sink::{MessageSink, SinkSettings};
use crate::source::WriterGroupDataSource;
use crate::writer::{ResolvedWriter, StateReporter};

// =============================================================================
// Registry Reporter
// =============================================================================

/// [`StateReporter`] over the registry's state-update path.
pub struct RegistryStateReporter {
    registry: Arc<WriterGroupRegistry>,
}

impl RegistryStateReporter {
    /// Creates a reporter delivering into the given registry.
    pub fn new(registry: Arc<WriterGroupRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl StateReporter for RegistryStateReporter {
    async fn source_state(&self, writer_id: &DataSetWriterId, state: SourceState) {
        self.registry.report_source_state(writer_id, state).await;
    }

    async fn variable_state(
        &self,
        writer_id: &DataSetWriterId,
        variable_id: &VariableId,
        state: PublishedItemState,
    ) {
        if let Err(e) = self
            .registry
            .report_variable_state(writer_id, variable_id, state)
            .await
        {
            warn!(writer_id = %writer_id, variable_id = %variable_id, error = %e, "Variable state report failed");
        }
    }

    async fn events_state(&self, writer_id: &DataSetWriterId, state: PublishedItemState) {
        if let Err(e) = self.registry.report_events_state(writer_id, state).await {
            warn!(writer_id = %writer_id, error = %e, "Events state report failed");
        }
    }

    async fn group_state(&self, group_id: &WriterGroupId, state: WriterGroupState) {
        if let Err(e) = self
            .registry
            .report_writer_group_state(group_id, state)
            .await
        {
            warn!(group_id = %group_id, error = %e, "Group state report failed");
        }
    }
}

// =============================================================================
// Sink Factory
// =============================================================================

/// Builds the message sink for a group when its pipeline comes up.
pub trait SinkFactory: Send + Sync {
    /// Creates a sink for the given group.
    fn create_sink(&self, group: &WriterGroup) -> Arc<dyn MessageSink>;
}

// =============================================================================
// Engine
// =============================================================================

#[derive(Default)]
struct EngineRecord {
    pipeline: Option<Pipeline>,
}

struct Pipeline {
    sink: Arc<dyn MessageSink>,
    source: Arc<WriterGroupDataSource>,
}

/// The publishing engine: one live pipeline per activated writer group.
pub struct WriterGroupEngine {
    registry: Arc<WriterGroupRegistry>,
    endpoints: Arc<dyn EndpointRegistry>,
    client: Arc<dyn SubscriptionClient>,
    sinks: Arc<dyn SinkFactory>,
    reporter: Arc<dyn StateReporter>,
    publisher_id: String,
    records: DashMap<WriterGroupId, Arc<tokio::sync::Mutex<EngineRecord>>>,
}

impl WriterGroupEngine {
    /// Creates an engine reporting into the given registry.
    pub fn new(
        registry: Arc<WriterGroupRegistry>,
        endpoints: Arc<dyn EndpointRegistry>,
        client: Arc<dyn SubscriptionClient>,
        sinks: Arc<dyn SinkFactory>,
        publisher_id: impl Into<String>,
    ) -> Arc<Self> {
        let reporter: Arc<dyn StateReporter> =
            Arc::new(RegistryStateReporter::new(Arc::clone(&registry)));
        Arc::new(Self {
            registry,
            endpoints,
            client,
            sinks,
            reporter,
            publisher_id: publisher_id.into(),
            records: DashMap::new(),
        })
    }

    /// Registers the engine on the registry's event broker. Call once after
    /// construction.
    pub fn attach(self: &Arc<Self>) {
        let broker = self.registry.broker();
        broker.register_group_listener(Arc::clone(self) as Arc<dyn WriterGroupListener>);
        broker.register_writer_listener(
            Arc::clone(self) as Arc<dyn pulse_core::broker::DataSetWriterListener>
        );
        info!("Engine attached to registry events");
    }

    /// Builds pipelines for every group that is already active. Used at
    /// startup, after the registry has been loaded.
    pub async fn resync(&self) {
        for state in [WriterGroupState::Pending, WriterGroupState::Publishing] {
            let filter = WriterGroupFilter {
                state: Some(state),
                ..Default::default()
            };
            let mut continuation: Option<ContinuationToken> = None;
            loop {
                let page = match self
                    .registry
                    .list_writer_groups(&filter, continuation.as_ref(), None)
                    .await
                {
                    Ok(page) => page,
                    Err(e) => {
                        warn!(error = %e, "Group resync query failed");
                        break;
                    }
                };
                for group in page.items {
                    self.activate_group(group).await;
                }
                match page.continuation {
                    Some(token) => continuation = Some(token),
                    None => break,
                }
            }
        }
    }

    /// Whether the group currently has a live pipeline.
    pub async fn is_connected(&self, group_id: &WriterGroupId) -> bool {
        // Detach from the map guard before awaiting the record lock.
        let record = match self.records.get(group_id) {
            Some(record) => Arc::clone(record.value()),
            None => return false,
        };
        let connected = record.lock().await.pipeline.is_some();
        connected
    }

    fn record(&self, group_id: &WriterGroupId) -> Arc<tokio::sync::Mutex<EngineRecord>> {
        self.records
            .entry(group_id.clone())
            .or_default()
            .value()
            .clone()
    }

    async fn teardown(pipeline: Pipeline, group_id: &WriterGroupId) {
        // Sink first: envelopes racing the teardown fail fast instead of
        // landing in a sink nobody drains.
        if let Err(e) = pipeline.sink.close() {
            warn!(group_id = %group_id, error = %e, "Sink close failed");
        }
        pipeline.source.remove_all().await;
    }

    async fn activate_group(&self, group: WriterGroup) {
        let record = self.record(&group.id);
        let mut record = record.lock().await;

        // Re-activation rebuilds the full pipeline from the registry.
        if let Some(previous) = record.pipeline.take() {
            debug!(group_id = %group.id, "Rebuilding existing pipeline");
            Self::teardown(previous, &group.id).await;
        }

        let sink = self.sinks.create_sink(&group);
        sink.apply_settings(SinkSettings::from_group(&group));
        let source = WriterGroupDataSource::new(
            group.clone(),
            Arc::clone(&self.client),
            Arc::clone(&sink),
            Arc::clone(&self.reporter),
            self.publisher_id.clone(),
        );

        let resolved = self.resolve_group_writers(&group.id).await;
        let writer_count = resolved.len();
        source.add_writers(resolved).await;

        record.pipeline = Some(Pipeline { sink, source });
        info!(group_id = %group.id, writers = writer_count, "Writer group connected");
    }

    async fn deactivate_group(&self, group_id: &WriterGroupId) {
        let record = self.record(group_id);
        let mut record = record.lock().await;
        match record.pipeline.take() {
            Some(pipeline) => {
                Self::teardown(pipeline, group_id).await;
                info!(group_id = %group_id, "Writer group disconnected");
            }
            None => debug!(group_id = %group_id, "Deactivate for idle group"),
        }
    }

    async fn propagate_settings(&self, group: &WriterGroup) {
        let record = self.record(&group.id);
        let record = record.lock().await;
        if let Some(pipeline) = &record.pipeline {
            pipeline.source.apply_group(group.clone());
        }
    }

    /// Reconfigures one writer on its group's pipeline, removing it from any
    /// pipeline it moved away from.
    async fn sync_writer(&self, writer: &DataSetWriter) {
        let others: Vec<(WriterGroupId, Arc<tokio::sync::Mutex<EngineRecord>>)> = self
            .records
            .iter()
            .filter(|entry| entry.key() != &writer.writer_group_id)
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        for (group_id, record) in others {
            let record = record.lock().await;
            if let Some(pipeline) = &record.pipeline {
                if pipeline.source.remove_writer(&writer.id).await {
                    debug!(group_id = %group_id, writer_id = %writer.id, "Writer moved off group");
                }
            }
        }

        let record = self.record(&writer.writer_group_id);
        let record = record.lock().await;
        let Some(pipeline) = &record.pipeline else {
            return;
        };
        if let Some(resolved) = self.resolve_writer(writer.clone()).await {
            pipeline.source.add_writers(vec![resolved]).await;
        }
    }

    async fn detach_writer(&self, writer_id: &DataSetWriterId, group_id: &WriterGroupId) {
        let record = self.record(group_id);
        let record = record.lock().await;
        if let Some(pipeline) = &record.pipeline {
            pipeline.source.remove_writer(writer_id).await;
        }
    }

    async fn resolve_group_writers(&self, group_id: &WriterGroupId) -> Vec<ResolvedWriter> {
        let filter = DataSetWriterFilter {
            writer_group_id: Some(group_id.clone()),
            ..Default::default()
        };
        let mut writers = Vec::new();
        let mut continuation: Option<ContinuationToken> = None;
        loop {
            let page = match self
                .registry
                .list_dataset_writers(&filter, continuation.as_ref(), None)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(group_id = %group_id, error = %e, "Writer query failed");
                    break;
                }
            };
            writers.extend(page.items);
            match page.continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        let mut resolved = Vec::with_capacity(writers.len());
        for writer in writers {
            if let Some(writer) = self.resolve_writer(writer).await {
                resolved.push(writer);
            }
        }
        resolved
    }

    async fn resolve_writer(&self, writer: DataSetWriter) -> Option<ResolvedWriter> {
        let endpoint = match self.endpoints.get_endpoint(&writer.endpoint_id).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!(writer_id = %writer.id, endpoint_id = %writer.endpoint_id, error = %e, "Endpoint unresolvable");
                return None;
            }
        };

        let filter = PublishedVariableFilter {
            writer_id: Some(writer.id.clone()),
            ..Default::default()
        };
        let mut variables = Vec::new();
        let mut continuation: Option<ContinuationToken> = None;
        loop {
            let page = match self
                .registry
                .list_dataset_variables(&filter, continuation.as_ref(), None)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(writer_id = %writer.id, error = %e, "Variable query failed");
                    break;
                }
            };
            variables.extend(page.items);
            match page.continuation {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        let events = match self.registry.get_event_dataset(&writer.id).await {
            Ok(events) => Some(events),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!(writer_id = %writer.id, error = %e, "Event dataset query failed");
                None
            }
        };

        Some(ResolvedWriter {
            writer,
            endpoint,
            variables,
            events,
        })
    }
}

// =============================================================================
// Event Wiring
// =============================================================================

#[async_trait]
impl WriterGroupListener for WriterGroupEngine {
    async fn on_writer_group_event(&self, event: &WriterGroupEvent) {
        match event {
            WriterGroupEvent::Activated(group) => self.activate_group(group.clone()).await,
            WriterGroupEvent::Deactivated(group) => self.deactivate_group(&group.id).await,
            WriterGroupEvent::Removed { id } => {
                // The registry guards removal of non-empty groups, but a
                // lingering pipeline is still disposed here.
                self.deactivate_group(id).await;
                self.records.remove(id);
            }
            WriterGroupEvent::Updated(group) => self.propagate_settings(group).await,
            // State reports originate in the engine itself.
            WriterGroupEvent::Added(_) | WriterGroupEvent::StateChanged { .. } => {}
        }
    }
}

#[async_trait]
impl pulse_core::broker::DataSetWriterListener for WriterGroupEngine {
    async fn on_dataset_writer_event(&self, event: &DataSetWriterEvent) {
        match event {
            DataSetWriterEvent::Added(writer) | DataSetWriterEvent::Updated(writer) => {
                self.sync_writer(writer).await;
            }
            DataSetWriterEvent::Removed {
                id,
                writer_group_id,
            } => {
                self.detach_writer(id, writer_group_id).await;
            }
            // Source states originate in the engine itself.
            DataSetWriterEvent::SourceStateChanged { .. } => {}
        }
    }
}
