// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Message sinks: where outbound envelopes leave the engine.
//!
//! A sink receives [`OutboundMessage`] envelopes from a data source,
//! batches them into [`NetworkMessage`]s per the group's settings, and
//! hands the wire form to whatever transport sits behind it. `enqueue` is
//! called from the notification hot path and must never block.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use pulse_core::error::SinkError;
use pulse_core::message::{NetworkMessage, OutboundMessage};
use pulse_core::model::WriterGroup;

/// Batch size used when the group does not configure one.
const DEFAULT_BATCH_SIZE: usize = 1;

// =============================================================================
// Sink Settings
// =============================================================================

/// Group-level knobs a sink honors. Reapplied whenever the group's
/// configuration changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSettings {
    /// Number of envelopes batched into one network message.
    pub batch_size: usize,
}

impl SinkSettings {
    /// Derives sink settings from a writer group's configuration.
    pub fn from_group(group: &WriterGroup) -> Self {
        Self {
            batch_size: group
                .batch_size
                .map(|n| n.max(1) as usize)
                .unwrap_or(DEFAULT_BATCH_SIZE),
        }
    }
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

// =============================================================================
// Sink Trait
// =============================================================================

/// Consumer of outbound envelopes for one writer group pipeline.
pub trait MessageSink: Send + Sync {
    /// Accepts one envelope. Must not block; a full or closed sink returns
    /// an error and the envelope is dropped.
    fn enqueue(&self, message: OutboundMessage) -> Result<(), SinkError>;

    /// Applies updated group-level settings to the running sink.
    fn apply_settings(&self, settings: SinkSettings);

    /// Whether the sink can carry event notifications. Sources reject event
    /// payloads destined for a data-only sink.
    fn accepts_events(&self) -> bool;

    /// Closes the sink, flushing any partial batch. Enqueues after close
    /// fail with [`SinkError::Closed`].
    fn close(&self) -> Result<(), SinkError>;
}

// =============================================================================
// JSON Sink
// =============================================================================

/// Sink producing `ua-data` JSON network messages on an in-process channel.
///
/// Envelopes are buffered until the configured batch size is reached, then
/// bundled into one [`NetworkMessage`] and pushed to the receiver returned
/// by [`JsonMessageSink::new`].
pub struct JsonMessageSink {
    buffer: Mutex<Vec<OutboundMessage>>,
    batch_size: AtomicUsize,
    accept_events: bool,
    closed: AtomicBool,
    output: mpsc::UnboundedSender<NetworkMessage>,
}

impl JsonMessageSink {
    /// Creates a sink accepting both data-change and event envelopes.
    pub fn new(settings: SinkSettings) -> (Arc<Self>, mpsc::UnboundedReceiver<NetworkMessage>) {
        Self::with_events(settings, true)
    }

    /// Creates a sink that rejects event envelopes.
    pub fn data_only(
        settings: SinkSettings,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<NetworkMessage>) {
        Self::with_events(settings, false)
    }

    fn with_events(
        settings: SinkSettings,
        accept_events: bool,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<NetworkMessage>) {
        let (output, receiver) = mpsc::unbounded_channel();
        let sink = Arc::new(Self {
            buffer: Mutex::new(Vec::new()),
            batch_size: AtomicUsize::new(settings.batch_size.max(1)),
            accept_events,
            closed: AtomicBool::new(false),
            output,
        });
        (sink, receiver)
    }

    fn flush_batch(&self, batch: Vec<OutboundMessage>) -> Result<(), SinkError> {
        if batch.is_empty() {
            return Ok(());
        }
        let message = NetworkMessage::from_batch(&batch);
        debug!(
            message_id = %message.message_id,
            datasets = message.messages.len(),
            "Network message flushed"
        );
        self.output.send(message).map_err(|_| SinkError::Closed)
    }
}

impl MessageSink for JsonMessageSink {
    fn enqueue(&self, message: OutboundMessage) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        let batch = {
            let mut buffer = self.buffer.lock();
            buffer.push(message);
            if buffer.len() >= self.batch_size.load(Ordering::Relaxed) {
                std::mem::take(&mut *buffer)
            } else {
                Vec::new()
            }
        };
        self.flush_batch(batch)
    }

    fn apply_settings(&self, settings: SinkSettings) {
        self.batch_size
            .store(settings.batch_size.max(1), Ordering::Relaxed);
    }

    fn accepts_events(&self) -> bool {
        self.accept_events
    }

    fn close(&self) -> Result<(), SinkError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let remaining = std::mem::take(&mut *self.buffer.lock());
        self.flush_batch(remaining)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_core::message::{MetaDataVersion, MonitoredItemSample, NotificationPayload};
    use pulse_core::types::{DataSetWriterId, NodeId, StatusCode, WriterGroupId};
    use std::collections::BTreeMap;

    fn envelope(sequence: u64) -> OutboundMessage {
        OutboundMessage {
            writer_id: DataSetWriterId::new("w1"),
            writer_group_id: WriterGroupId::new("g1"),
            sequence_number: sequence,
            publisher_id: "urn:pulse:test".to_string(),
            endpoint_url: "opc.tcp://localhost:4840".to_string(),
            timestamp: Utc::now(),
            meta_data_version: MetaDataVersion::default(),
            payload: NotificationPayload::DataChange(vec![MonitoredItemSample {
                client_handle: 1,
                node_id: NodeId::parse("i=2258"),
                display_name: None,
                value: serde_json::json!(sequence),
                status: StatusCode::GOOD,
                source_timestamp: None,
                server_timestamp: None,
            }]),
            string_table: Vec::new(),
            subscription_id: 1,
            extension_fields: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_batch_size_one_flushes_immediately() {
        let (sink, mut rx) = JsonMessageSink::new(SinkSettings::default());
        sink.enqueue(envelope(1)).unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message.message_type, "ua-data");
        assert_eq!(message.messages.len(), 1);
        assert_eq!(message.messages[0].sequence_number, 1);
    }

    #[tokio::test]
    async fn test_batching_holds_until_full() {
        let (sink, mut rx) = JsonMessageSink::new(SinkSettings { batch_size: 3 });
        sink.enqueue(envelope(1)).unwrap();
        sink.enqueue(envelope(2)).unwrap();
        assert!(rx.try_recv().is_err());

        sink.enqueue(envelope(3)).unwrap();
        let message = rx.recv().await.unwrap();
        assert_eq!(message.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_close_flushes_partial_batch() {
        let (sink, mut rx) = JsonMessageSink::new(SinkSettings { batch_size: 10 });
        sink.enqueue(envelope(1)).unwrap();
        sink.close().unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message.messages.len(), 1);

        let err = sink.enqueue(envelope(2)).unwrap_err();
        assert!(matches!(err, SinkError::Closed));
    }

    #[tokio::test]
    async fn test_settings_change_applies_to_running_sink() {
        let (sink, mut rx) = JsonMessageSink::new(SinkSettings { batch_size: 5 });
        sink.enqueue(envelope(1)).unwrap();
        assert!(rx.try_recv().is_err());

        sink.apply_settings(SinkSettings { batch_size: 2 });
        sink.enqueue(envelope(2)).unwrap();
        let message = rx.recv().await.unwrap();
        assert_eq!(message.messages.len(), 2);
    }

    #[test]
    fn test_data_only_sink_rejects_events() {
        let (sink, _rx) = JsonMessageSink::data_only(SinkSettings::default());
        assert!(!sink.accepts_events());

        let (sink, _rx) = JsonMessageSink::new(SinkSettings::default());
        assert!(sink.accepts_events());
    }
}
