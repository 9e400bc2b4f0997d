// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Outbound network message model.
//!
//! The data source translates raw subscription notifications into
//! [`OutboundMessage`] envelopes; the sink batches envelopes into
//! [`NetworkMessage`]s using the OPC UA PubSub JSON field layout
//! (`MessageType` is `"ua-data"`, PascalCase field names).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{DataSetWriterId, NodeId, StatusCode, WriterGroupId};

/// Message type discriminator of PubSub data messages.
pub const MESSAGE_TYPE_DATA: &str = "ua-data";

// =============================================================================
// Metadata Version
// =============================================================================

/// Version of the dataset metadata a message was produced against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetaDataVersion {
    /// Major version; incompatible changes bump this.
    pub major_version: u32,
    /// Minor version.
    pub minor_version: u32,
}

impl Default for MetaDataVersion {
    fn default() -> Self {
        Self {
            major_version: 1,
            minor_version: 0,
        }
    }
}

// =============================================================================
// Samples
// =============================================================================

/// One monitored item value inside a data-change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemSample {
    /// Client handle correlating the sample to its variable.
    pub client_handle: u32,
    /// The sampled node, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Display name used as the dataset field name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// The sampled value.
    pub value: serde_json::Value,
    /// Status of the sample.
    #[serde(default)]
    pub status: StatusCode,
    /// Source timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Server timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl MonitoredItemSample {
    /// Returns the dataset field name for this sample.
    pub fn field_name(&self) -> String {
        if let Some(name) = &self.display_name {
            return name.clone();
        }
        self.node_id
            .as_ref()
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("handle-{}", self.client_handle))
    }
}

/// One received event inside an event notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSample {
    /// Client handle of the event monitored item.
    pub client_handle: u32,
    /// Selected field values keyed by field name.
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// The payload of one subscription notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPayload {
    /// Data-change samples.
    DataChange(Vec<MonitoredItemSample>),
    /// Event field lists.
    Event(Vec<EventSample>),
    /// Subscription keep-alive, carries no samples.
    KeepAlive,
}

impl NotificationPayload {
    /// Returns `true` for event payloads.
    pub fn is_event(&self) -> bool {
        matches!(self, Self::Event(_))
    }
}

// =============================================================================
// Outbound Envelope
// =============================================================================

/// The envelope a data source hands to its sink for every writer tick.
///
/// Carries the translated samples plus the serializer context the sink
/// needs: string table, originating subscription, publisher identity, and
/// the per-writer sequence number assigned in receipt order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// The originating dataset writer.
    pub writer_id: DataSetWriterId,
    /// The writer's group.
    pub writer_group_id: WriterGroupId,
    /// Strictly increasing per-writer sequence number.
    pub sequence_number: u64,
    /// Publisher id (application URI of this publisher).
    pub publisher_id: String,
    /// Endpoint the data was sampled from.
    pub endpoint_url: String,
    /// When the envelope was created (UTC).
    pub timestamp: DateTime<Utc>,
    /// Metadata version of the writer's dataset.
    pub meta_data_version: MetaDataVersion,
    /// The notification payload.
    pub payload: NotificationPayload,
    /// String table of the raw notification.
    #[serde(default)]
    pub string_table: Vec<String>,
    /// Server-side id of the originating subscription.
    pub subscription_id: u32,
    /// Static extension fields merged into the dataset message.
    #[serde(default)]
    pub extension_fields: BTreeMap<String, serde_json::Value>,
}

// =============================================================================
// Network Message (wire form)
// =============================================================================

/// One dataset message inside a network message, JSON-encoded with the
/// PubSub PascalCase layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DataSetMessage {
    /// The dataset writer id.
    pub data_set_writer_id: String,
    /// Per-writer sequence number.
    pub sequence_number: u64,
    /// Metadata version.
    pub meta_data_version: MetaDataVersion,
    /// Message timestamp.
    pub timestamp: DateTime<Utc>,
    /// Overall message status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u32>,
    /// Field values keyed by field name.
    pub payload: BTreeMap<String, serde_json::Value>,
}

impl DataSetMessage {
    /// Builds the dataset message for an outbound envelope.
    pub fn from_outbound(message: &OutboundMessage) -> Self {
        let mut payload = BTreeMap::new();
        for (name, value) in &message.extension_fields {
            payload.insert(name.clone(), value.clone());
        }

        match &message.payload {
            NotificationPayload::DataChange(samples) => {
                for sample in samples {
                    payload.insert(
                        sample.field_name(),
                        serde_json::json!({
                            "Value": sample.value,
                            "StatusCode": sample.status.0,
                            "SourceTimestamp": sample.source_timestamp,
                        }),
                    );
                }
            }
            NotificationPayload::Event(events) => {
                for event in events {
                    for (name, value) in &event.fields {
                        payload.insert(name.clone(), value.clone());
                    }
                }
            }
            NotificationPayload::KeepAlive => {}
        }

        Self {
            data_set_writer_id: message.writer_id.to_string(),
            sequence_number: message.sequence_number,
            meta_data_version: message.meta_data_version,
            timestamp: message.timestamp,
            status: None,
            payload,
        }
    }
}

/// A PubSub network message bundling dataset messages from one writer
/// group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkMessage {
    /// Unique message id.
    pub message_id: String,
    /// Message type discriminator; always `"ua-data"` for data messages.
    pub message_type: String,
    /// Publisher id.
    pub publisher_id: String,
    /// The bundled dataset messages.
    pub messages: Vec<DataSetMessage>,
}

impl NetworkMessage {
    /// Builds a network message from a batch of outbound envelopes.
    ///
    /// The publisher id is taken from the first envelope; callers batch
    /// per group, so all envelopes share it.
    pub fn from_batch(batch: &[OutboundMessage]) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            message_type: MESSAGE_TYPE_DATA.to_string(),
            publisher_id: batch
                .first()
                .map(|m| m.publisher_id.clone())
                .unwrap_or_default(),
            messages: batch.iter().map(DataSetMessage::from_outbound).collect(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
