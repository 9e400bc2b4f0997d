// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Writer group data source.
//!
//! One [`WriterGroupDataSource`] exists per connected writer group. It owns
//! the group's writer subscriptions, feeds their envelopes into the group's
//! [`MessageSink`], and reports the group-level lifecycle: `Pending` while
//! the writer set is empty, `Publishing` once the first envelope reaches
//! the sink.
//!
//! Writer mutations are serialized on one async mutex; removal awaits the
//! disposed subscription so the caller observes a quiesced writer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use pulse_core::message::OutboundMessage;
use pulse_core::model::{SourceState, WriterGroup};
use pulse_core::types::{ConnectionState, DataSetWriterId, StatusCode, WriterGroupId, WriterGroupState};
use pulse_registry::WriterGroupRegistry;

use crate::client::SubscriptionClient;
use crate::sink::{MessageSink, SinkSettings};
use crate::writer::{DataSetNotificationSink, DataSetWriterSubscription, ResolvedWriter, StateReporter};

// =============================================================================
// Data Source
// =============================================================================

/// The live data source of one writer group.
pub struct WriterGroupDataSource {
    group_id: WriterGroupId,
    group: RwLock<WriterGroup>,
    client: Arc<dyn SubscriptionClient>,
    sink: Arc<dyn MessageSink>,
    reporter: Arc<dyn StateReporter>,
    publisher_id: String,
    writers: tokio::sync::Mutex<HashMap<DataSetWriterId, DataSetWriterSubscription>>,
    first_message: AtomicBool,
}

impl WriterGroupDataSource {
    /// Creates an empty data source for a group.
    pub fn new(
        group: WriterGroup,
        client: Arc<dyn SubscriptionClient>,
        sink: Arc<dyn MessageSink>,
        reporter: Arc<dyn StateReporter>,
        publisher_id: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            group_id: group.id.clone(),
            group: RwLock::new(group),
            client,
            sink,
            reporter,
            publisher_id: publisher_id.into(),
            writers: tokio::sync::Mutex::new(HashMap::new()),
            first_message: AtomicBool::new(false),
        })
    }

    /// The group this source serves.
    pub fn group_id(&self) -> &WriterGroupId {
        &self.group_id
    }

    /// Adds (or replaces) writers. An existing subscription for the same
    /// writer is disposed before the replacement is configured.
    ///
    /// A writer whose subscription fails to open is not retained; the
    /// failure is reported as its source state and the rest of the batch
    /// proceeds.
    pub async fn add_writers(self: &Arc<Self>, resolved: Vec<ResolvedWriter>) {
        let mut writers = self.writers.lock().await;
        for writer in resolved {
            let writer_id = writer.writer.id.clone();
            if let Some(previous) = writers.remove(&writer_id) {
                previous.dispose().await;
            }

            let sink: Arc<dyn DataSetNotificationSink> = Arc::clone(self) as _;
            let weak: Weak<dyn DataSetNotificationSink> = Arc::downgrade(&sink);
            drop(sink);

            let subscription = DataSetWriterSubscription::new(
                &writer,
                &self.publisher_id,
                weak,
                Arc::clone(&self.reporter),
            );
            match subscription.configure(&self.client, &writer).await {
                Ok(()) => {
                    info!(group_id = %self.group_id, writer_id = %writer_id, "Writer connected");
                    writers.insert(writer_id, subscription);
                }
                Err(e) => {
                    warn!(
                        group_id = %self.group_id,
                        writer_id = %writer_id,
                        error = %e,
                        "Writer subscription failed"
                    );
                    subscription.dispose().await;
                    self.reporter
                        .source_state(
                            &writer_id,
                            SourceState::with_result(
                                ConnectionState::Failed,
                                StatusCode::BAD_NOT_CONNECTED,
                            ),
                        )
                        .await;
                }
            }
        }

        if writers.is_empty() {
            self.reporter
                .group_state(&self.group_id, WriterGroupState::Pending)
                .await;
        }
    }

    /// Removes one writer, awaiting its teardown. Returns `true` if the
    /// writer was present.
    pub async fn remove_writer(&self, writer_id: &DataSetWriterId) -> bool {
        let mut writers = self.writers.lock().await;
        let Some(subscription) = writers.remove(writer_id) else {
            return false;
        };
        subscription.dispose().await;
        info!(group_id = %self.group_id, writer_id = %writer_id, "Writer disconnected");

        if writers.is_empty() {
            self.first_message.store(false, Ordering::Release);
            self.reporter
                .group_state(&self.group_id, WriterGroupState::Pending)
                .await;
        }
        true
    }

    /// Tears down every writer. The set is snapshotted and cleared first so
    /// late notifications find no writer, then each subscription is
    /// disposed in turn.
    pub async fn remove_all(&self) {
        let drained: Vec<DataSetWriterSubscription> = {
            let mut writers = self.writers.lock().await;
            writers.drain().map(|(_, s)| s).collect()
        };
        for subscription in drained {
            subscription.dispose().await;
        }
        self.first_message.store(false, Ordering::Release);
        debug!(group_id = %self.group_id, "Data source drained");
    }

    /// Applies an updated group configuration to the running pipeline.
    pub fn apply_group(&self, group: WriterGroup) {
        self.sink.apply_settings(SinkSettings::from_group(&group));
        *self.group.write() = group;
        debug!(group_id = %self.group_id, "Group settings propagated");
    }

    /// Number of connected writers.
    pub async fn writer_count(&self) -> usize {
        self.writers.lock().await.len()
    }
}

#[async_trait]
impl DataSetNotificationSink for WriterGroupDataSource {
    async fn on_dataset_message(&self, message: OutboundMessage) {
        if message.payload.is_event() && !self.sink.accepts_events() {
            warn!(
                group_id = %self.group_id,
                writer_id = %message.writer_id,
                "Event notification rejected by data-only sink"
            );
            let state = WriterGroupRegistry::item_state_from_report(
                None,
                None,
                StatusCode::BAD_NOT_SUPPORTED,
            );
            self.reporter.events_state(&message.writer_id, state).await;
            return;
        }

        let writer_id = message.writer_id.clone();
        match self.sink.enqueue(message) {
            Ok(()) => {
                if !self.first_message.swap(true, Ordering::AcqRel) {
                    self.reporter
                        .group_state(&self.group_id, WriterGroupState::Publishing)
                        .await;
                }
            }
            Err(e) => {
                warn!(
                    group_id = %self.group_id,
                    writer_id = %writer_id,
                    error = %e,
                    "Envelope dropped"
                );
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
