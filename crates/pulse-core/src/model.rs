// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration model for writer groups, dataset writers, and published
//! items.
//!
//! The registry owns the authoritative copy of these entities; the engine
//! holds derived in-memory projections that are rebuilt from this model
//! whenever it changes. Every entity carries an opaque [`GenerationId`]
//! regenerated on each successful write.
//!
//! # Patch Convention
//!
//! All patch types follow the **sentinel-clears-value** convention: a field
//! that is `None` is left unchanged, a field set to its type's zero/empty
//! value (`0`, `""`, an empty list, a zero duration) clears the stored value
//! to unset, and any other value sets it. The per-field mapping is
//! enumerated in the registry's patch module.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    duration_opt_millis, DataChangeTrigger, DataSetWriterId, DeadbandType, EndpointId,
    GenerationId, MessageEncoding, MonitoringMode, NodeId, SecurityMode, SecurityPolicy, SiteId,
    StatusCode, VariableId, WriterGroupId, WriterGroupState, WriterGroupStatus,
};

// =============================================================================
// Writer Group
// =============================================================================

/// How dataset messages are ordered inside a network message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataSetOrdering {
    /// Ordering is not specified.
    #[default]
    Undefined,
    /// Ascending by dataset writer id.
    AscendingWriterId,
    /// Ascending by writer id, one dataset message per network message.
    AscendingWriterIdSingle,
}

/// Group-level network message settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WriterGroupMessageSettings {
    /// Dataset ordering inside the network message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordering: Option<DataSetOrdering>,
    /// Network message content mask.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_message_content_mask: Option<u32>,
    /// Version of the group configuration carried in messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_version: Option<u32>,
    /// Sampling offset in milliseconds relative to the publishing interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_offset: Option<f64>,
    /// Publishing offsets in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publishing_offset: Option<Vec<f64>>,
}

/// A named, site-scoped bundle of dataset writers published together as one
/// network-message stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterGroup {
    /// Unique group id.
    pub id: WriterGroupId,
    /// Site the group is scoped to; `None` for a global group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<SiteId>,
    /// Human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Message encoding for the group's network messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<MessageEncoding>,
    /// Number of notifications batched into one network message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    /// Group publishing interval.
    #[serde(with = "duration_opt_millis", default)]
    pub publishing_interval: Option<Duration>,
    /// Keep-alive time for the group's message stream.
    #[serde(with = "duration_opt_millis", default)]
    pub keep_alive_time: Option<Duration>,
    /// Transport priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// Network message settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_settings: Option<WriterGroupMessageSettings>,
    /// Runtime lifecycle status; changed only via activate/deactivate and
    /// the engine's state-report path.
    pub status: WriterGroupStatus,
    /// Generation token for optimistic concurrency.
    pub generation: GenerationId,
}

impl WriterGroup {
    /// Creates a disabled group from an add request.
    pub fn from_request(id: WriterGroupId, request: WriterGroupRequest) -> Self {
        Self {
            id,
            site_id: request.site_id,
            name: request.name,
            encoding: request.encoding,
            batch_size: request.batch_size,
            publishing_interval: request.publishing_interval,
            keep_alive_time: request.keep_alive_time,
            priority: request.priority,
            message_settings: request.message_settings,
            status: WriterGroupStatus::default(),
            generation: GenerationId::new(),
        }
    }

    /// Returns `true` if the group is in the given state.
    pub fn is_in_state(&self, state: WriterGroupState) -> bool {
        self.status.state == state
    }
}

/// Request payload for adding a writer group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriterGroupRequest {
    /// Site the group is scoped to; omit for a global group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<SiteId>,
    /// Human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Message encoding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<MessageEncoding>,
    /// Notification batch size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    /// Publishing interval.
    #[serde(with = "duration_opt_millis", default)]
    pub publishing_interval: Option<Duration>,
    /// Keep-alive time.
    #[serde(with = "duration_opt_millis", default)]
    pub keep_alive_time: Option<Duration>,
    /// Transport priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// Network message settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_settings: Option<WriterGroupMessageSettings>,
}

/// Patch payload for updating a writer group.
///
/// `None` leaves a field unchanged; the zero/empty sentinel clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriterGroupPatch {
    /// New name; empty string clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New encoding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<MessageEncoding>,
    /// New batch size; `0` clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    /// New publishing interval; zero clears.
    #[serde(with = "duration_opt_millis", default)]
    pub publishing_interval: Option<Duration>,
    /// New keep-alive time; zero clears.
    #[serde(with = "duration_opt_millis", default)]
    pub keep_alive_time: Option<Duration>,
    /// New priority; `0` clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// New message settings; default (all-empty) settings clear.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_settings: Option<WriterGroupMessageSettings>,
}

/// Exact-match query filter for writer groups.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriterGroupFilter {
    /// Match by name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Match by site.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<SiteId>,
    /// Match by lifecycle state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<WriterGroupState>,
}

// =============================================================================
// Dataset Writer
// =============================================================================

/// Subscription parameters a dataset writer applies to its live OPC UA
/// subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SubscriptionSettings {
    /// Requested publishing interval.
    #[serde(with = "duration_opt_millis", default)]
    pub publishing_interval: Option<Duration>,
    /// Max keep-alive count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive_count: Option<u32>,
    /// Lifetime count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifetime_count: Option<u32>,
    /// Subscription priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// Max notifications per publish cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_notifications_per_publish: Option<u32>,
    /// Whether to resolve display names for monitored items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolve_display_name: Option<bool>,
}

/// Writer-level dataset message settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DataSetWriterMessageSettings {
    /// Dataset message content mask.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_message_content_mask: Option<u32>,
    /// Network message number this writer publishes into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_message_number: Option<u16>,
}

/// The dataset a writer publishes: a name, extension fields, and the
/// subscription settings used to sample it.
///
/// The published items themselves (variables or one events definition) are
/// stored as separate entities keyed to the writer; a writer holds at most
/// one of the two kinds at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PublishedDataSet {
    /// Dataset name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Static extension fields merged into every dataset message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_fields: Option<BTreeMap<String, serde_json::Value>>,
    /// Subscription settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_settings: Option<SubscriptionSettings>,
}

/// Binds one published dataset to one OPC UA subscription against one
/// endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSetWriter {
    /// Unique writer id. Defaults to the endpoint id when auto-created.
    pub id: DataSetWriterId,
    /// Owning writer group.
    pub writer_group_id: WriterGroupId,
    /// Endpoint the writer's subscription connects to; resolved at
    /// read-time against the endpoint registry.
    pub endpoint_id: EndpointId,
    /// Key frame count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_frame_count: Option<u32>,
    /// Key frame interval.
    #[serde(with = "duration_opt_millis", default)]
    pub key_frame_interval: Option<Duration>,
    /// Dataset field content mask.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_field_content_mask: Option<u32>,
    /// Writer-level message settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_settings: Option<DataSetWriterMessageSettings>,
    /// The dataset definition.
    #[serde(default)]
    pub dataset: PublishedDataSet,
    /// Generation token for optimistic concurrency.
    pub generation: GenerationId,
}

impl DataSetWriter {
    /// Creates a writer from an add request once group and endpoint are
    /// resolved.
    pub fn from_request(
        id: DataSetWriterId,
        writer_group_id: WriterGroupId,
        request: DataSetWriterRequest,
    ) -> Self {
        Self {
            id,
            writer_group_id,
            endpoint_id: request.endpoint_id,
            key_frame_count: request.key_frame_count,
            key_frame_interval: request.key_frame_interval,
            dataset_field_content_mask: request.dataset_field_content_mask,
            message_settings: request.message_settings,
            dataset: request.dataset.unwrap_or_default(),
            generation: GenerationId::new(),
        }
    }
}

/// Request payload for adding a dataset writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSetWriterRequest {
    /// Explicit writer id; generated when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<DataSetWriterId>,
    /// Owning group; when absent a default group for the endpoint's site is
    /// created or reused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writer_group_id: Option<WriterGroupId>,
    /// Endpoint the writer connects to. Required and must resolve.
    pub endpoint_id: EndpointId,
    /// Key frame count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_frame_count: Option<u32>,
    /// Key frame interval.
    #[serde(with = "duration_opt_millis", default)]
    pub key_frame_interval: Option<Duration>,
    /// Dataset field content mask.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_field_content_mask: Option<u32>,
    /// Writer-level message settings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_settings: Option<DataSetWriterMessageSettings>,
    /// Dataset definition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<PublishedDataSet>,
}

impl DataSetWriterRequest {
    /// Creates a minimal request for the given endpoint.
    pub fn for_endpoint(endpoint_id: EndpointId) -> Self {
        Self {
            id: None,
            writer_group_id: None,
            endpoint_id,
            key_frame_count: None,
            key_frame_interval: None,
            dataset_field_content_mask: None,
            message_settings: None,
            dataset: None,
        }
    }
}

/// Patch payload for updating a dataset writer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSetWriterPatch {
    /// New owning group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writer_group_id: Option<WriterGroupId>,
    /// New key frame count; `0` clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_frame_count: Option<u32>,
    /// New key frame interval; zero clears.
    #[serde(with = "duration_opt_millis", default)]
    pub key_frame_interval: Option<Duration>,
    /// New field content mask; `0` clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_field_content_mask: Option<u32>,
    /// New message settings; default settings clear.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_settings: Option<DataSetWriterMessageSettings>,
    /// New dataset name; empty string clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_name: Option<String>,
    /// New extension fields; empty map clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_fields: Option<BTreeMap<String, serde_json::Value>>,
    /// New subscription settings; default settings clear.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_settings: Option<SubscriptionSettings>,
}

/// Exact-match query filter for dataset writers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSetWriterFilter {
    /// Match by owning group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writer_group_id: Option<WriterGroupId>,
    /// Match by endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<EndpointId>,
}

// =============================================================================
// Published Item State
// =============================================================================

/// Mutable runtime state of a published variable or event definition.
///
/// Updated exclusively by runtime status callbacks through the registry's
/// state-update path, never by configuration patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PublishedItemState {
    /// Client-side handle correlating the item to the subscription.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_handle: Option<u32>,
    /// Server-assigned monitored item id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<u32>,
    /// Last reported status code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<StatusCode>,
    /// Decoded error message accompanying a bad status; `None` when good.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the last result changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result_change: Option<DateTime<Utc>>,
}

impl PublishedItemState {
    /// Returns `true` if the item currently reports an error.
    pub fn has_error(&self) -> bool {
        self.last_result.map(|r| r.is_bad()).unwrap_or(false)
    }
}

// =============================================================================
// Published Variable
// =============================================================================

/// One subscribed variable within a dataset writer's dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedDataSetVariable {
    /// Variable id; derived from the node id when auto-created.
    pub id: VariableId,
    /// Owning dataset writer.
    pub writer_id: DataSetWriterId,
    /// The node whose value is published.
    pub node_id: NodeId,
    /// Display name used as the dataset field name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Sampling interval.
    #[serde(with = "duration_opt_millis", default)]
    pub sampling_interval: Option<Duration>,
    /// Heartbeat interval for value re-publication.
    #[serde(with = "duration_opt_millis", default)]
    pub heartbeat_interval: Option<Duration>,
    /// Deadband type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadband_type: Option<DeadbandType>,
    /// Deadband value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadband_value: Option<f64>,
    /// Data change trigger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_change_trigger: Option<DataChangeTrigger>,
    /// Discard-new flag for queue overflow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discard_new: Option<bool>,
    /// Server-side queue size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<u32>,
    /// Monitoring mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_mode: Option<MonitoringMode>,
    /// Variable that triggers reporting of this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<VariableId>,
    /// Substitute value published while the item is bad.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substitute_value: Option<serde_json::Value>,
    /// Runtime state.
    #[serde(default)]
    pub state: PublishedItemState,
    /// Generation token for optimistic concurrency.
    pub generation: GenerationId,
}

impl PublishedDataSetVariable {
    /// Creates a variable from an add request.
    pub fn from_request(
        id: VariableId,
        writer_id: DataSetWriterId,
        request: PublishedVariableRequest,
    ) -> Self {
        Self {
            id,
            writer_id,
            node_id: request.node_id,
            display_name: request.display_name,
            sampling_interval: request.sampling_interval,
            heartbeat_interval: request.heartbeat_interval,
            deadband_type: request.deadband_type,
            deadband_value: request.deadband_value,
            data_change_trigger: request.data_change_trigger,
            discard_new: request.discard_new,
            queue_size: request.queue_size,
            monitoring_mode: request.monitoring_mode,
            trigger_id: request.trigger_id,
            substitute_value: request.substitute_value,
            state: PublishedItemState::default(),
            generation: GenerationId::new(),
        }
    }
}

/// Request payload for adding a published variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedVariableRequest {
    /// Explicit variable id; derived from the node id when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<VariableId>,
    /// The node to publish. Required.
    pub node_id: NodeId,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Sampling interval.
    #[serde(with = "duration_opt_millis", default)]
    pub sampling_interval: Option<Duration>,
    /// Heartbeat interval.
    #[serde(with = "duration_opt_millis", default)]
    pub heartbeat_interval: Option<Duration>,
    /// Deadband type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadband_type: Option<DeadbandType>,
    /// Deadband value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadband_value: Option<f64>,
    /// Data change trigger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_change_trigger: Option<DataChangeTrigger>,
    /// Discard-new flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discard_new: Option<bool>,
    /// Queue size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<u32>,
    /// Monitoring mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_mode: Option<MonitoringMode>,
    /// Trigger variable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<VariableId>,
    /// Substitute value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substitute_value: Option<serde_json::Value>,
}

impl PublishedVariableRequest {
    /// Creates a minimal request publishing the given node.
    pub fn for_node(node_id: NodeId) -> Self {
        Self {
            id: None,
            node_id,
            display_name: None,
            sampling_interval: None,
            heartbeat_interval: None,
            deadband_type: None,
            deadband_value: None,
            data_change_trigger: None,
            discard_new: None,
            queue_size: None,
            monitoring_mode: None,
            trigger_id: None,
            substitute_value: None,
        }
    }
}

/// Patch payload for updating a published variable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishedVariablePatch {
    /// New display name; empty string clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// New sampling interval; zero clears.
    #[serde(with = "duration_opt_millis", default)]
    pub sampling_interval: Option<Duration>,
    /// New heartbeat interval; zero clears.
    #[serde(with = "duration_opt_millis", default)]
    pub heartbeat_interval: Option<Duration>,
    /// New deadband type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadband_type: Option<DeadbandType>,
    /// New deadband value; `0.0` clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadband_value: Option<f64>,
    /// New data change trigger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_change_trigger: Option<DataChangeTrigger>,
    /// New discard-new flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discard_new: Option<bool>,
    /// New queue size; `0` clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<u32>,
    /// New monitoring mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_mode: Option<MonitoringMode>,
    /// New trigger variable; empty id clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_id: Option<VariableId>,
    /// New substitute value; JSON null clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substitute_value: Option<serde_json::Value>,
}

/// Exact-match query filter for published variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishedVariableFilter {
    /// Match by owning writer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writer_id: Option<DataSetWriterId>,
    /// Match by published node id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
}

// =============================================================================
// Published Events
// =============================================================================

/// A selected event field: a browse path below the event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedEventField {
    /// Field name used in dataset messages.
    pub name: String,
    /// Browse path from the event type to the field.
    #[serde(default)]
    pub browse_path: Vec<String>,
}

/// The single event dataset definition a writer may publish instead of
/// variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedDataSetEvents {
    /// Owning dataset writer; also the entity key, since a writer holds at
    /// most one events definition.
    pub writer_id: DataSetWriterId,
    /// The notifier node events are monitored on.
    pub notifier: NodeId,
    /// Selected event fields.
    #[serde(default)]
    pub selected_fields: Vec<SelectedEventField>,
    /// Where-clause filter elements, kept in their JSON form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
    /// Monitoring mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_mode: Option<MonitoringMode>,
    /// Queue size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<u32>,
    /// Discard-new flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discard_new: Option<bool>,
    /// Runtime state.
    #[serde(default)]
    pub state: PublishedItemState,
    /// Generation token for optimistic concurrency.
    pub generation: GenerationId,
}

impl PublishedDataSetEvents {
    /// Creates an events definition from an add request.
    pub fn from_request(writer_id: DataSetWriterId, request: PublishedEventsRequest) -> Self {
        Self {
            writer_id,
            notifier: request.notifier,
            selected_fields: request.selected_fields,
            filter: request.filter,
            monitoring_mode: request.monitoring_mode,
            queue_size: request.queue_size,
            discard_new: request.discard_new,
            state: PublishedItemState::default(),
            generation: GenerationId::new(),
        }
    }
}

/// Request payload for adding an event dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedEventsRequest {
    /// The notifier node. Required.
    pub notifier: NodeId,
    /// Selected event fields.
    #[serde(default)]
    pub selected_fields: Vec<SelectedEventField>,
    /// Where-clause filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
    /// Monitoring mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_mode: Option<MonitoringMode>,
    /// Queue size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<u32>,
    /// Discard-new flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discard_new: Option<bool>,
}

/// Patch payload for updating an event dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishedEventsPatch {
    /// New selected fields; empty list clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_fields: Option<Vec<SelectedEventField>>,
    /// New filter; JSON null clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<serde_json::Value>,
    /// New monitoring mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring_mode: Option<MonitoringMode>,
    /// New queue size; `0` clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<u32>,
    /// New discard-new flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discard_new: Option<bool>,
}

/// Exact-match query filter for event datasets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishedEventsFilter {
    /// Match by owning writer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writer_id: Option<DataSetWriterId>,
}

// =============================================================================
// Created Response
// =============================================================================

/// Result of an add operation: the assigned id and initial generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Created<I> {
    /// The assigned entity id.
    pub id: I,
    /// The entity's initial generation token.
    pub generation: GenerationId,
}

impl<I> Created<I> {
    /// Creates a new add result.
    pub fn new(id: I, generation: GenerationId) -> Self {
        Self { id, generation }
    }
}

// =============================================================================
// Writer State Snapshot
// =============================================================================

/// Writer-level source state derived from connectivity and subscription
/// status callbacks. Not persisted; delivered through the event broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceState {
    /// The connection state of the writer's session.
    pub connection: ConnectionStateStamp,
    /// Last subscription-level result, if any was reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<StatusCode>,
    /// Decoded error message for a bad result; `None` when healthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A connection state with the time it was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStateStamp {
    /// The connection state.
    pub state: crate::types::ConnectionState,
    /// When the state was observed.
    pub timestamp: DateTime<Utc>,
}

impl SourceState {
    /// Creates a healthy source state for the given connection state.
    pub fn connected(state: crate::types::ConnectionState) -> Self {
        Self {
            connection: ConnectionStateStamp {
                state,
                timestamp: Utc::now(),
            },
            last_result: None,
            error_message: None,
        }
    }

    /// Creates a source state carrying a subscription-level result.
    pub fn with_result(state: crate::types::ConnectionState, result: StatusCode) -> Self {
        let error_message = if result.is_bad() {
            Some(result.to_string())
        } else {
            None
        };
        Self {
            connection: ConnectionStateStamp {
                state,
                timestamp: Utc::now(),
            },
            last_result: Some(result),
            error_message,
        }
    }

    /// Returns `true` if the state carries no error.
    pub fn is_healthy(&self) -> bool {
        self.error_message.is_none() && self.last_result.map(|r| !r.is_bad()).unwrap_or(true)
    }
}

// =============================================================================
// Import Model
// =============================================================================

/// A nested writer definition inside a bulk import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSetWriterImport {
    /// Endpoint URL used to locate the endpoint in the registry.
    pub endpoint_url: String,
    /// Security mode used to locate the endpoint.
    #[serde(default)]
    pub security_mode: SecurityMode,
    /// Security policy used to locate the endpoint.
    #[serde(default)]
    pub security_policy: SecurityPolicy,
    /// Explicit writer id; defaults to the resolved endpoint id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<DataSetWriterId>,
    /// Dataset definition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<PublishedDataSet>,
    /// Nested variables.
    #[serde(default)]
    pub variables: Vec<PublishedVariableRequest>,
    /// Nested event dataset; mutually exclusive with variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<PublishedEventsRequest>,
}

/// A writer group definition with nested writers for bulk import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterGroupImport {
    /// Explicit group id; generated when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<WriterGroupId>,
    /// Group settings applied to the group and any site-partitioned clones.
    #[serde(default)]
    pub group: WriterGroupRequest,
    /// Nested writers.
    #[serde(default)]
    pub writers: Vec<DataSetWriterImport>,
}

/// Outcome of a bulk import: the groups that were created or reused, all
/// activated, and the writers that could not be resolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportResult {
    /// Ids of every group the import touched, keyed by site.
    pub groups: Vec<ImportedGroup>,
    /// Endpoint URLs of writers skipped because no endpoint matched.
    #[serde(default)]
    pub skipped: Vec<String>,
}

/// One group touched by an import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedGroup {
    /// The group id.
    pub id: WriterGroupId,
    /// The site the group was assigned to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<SiteId>,
    /// Writers placed into this group.
    pub writer_ids: Vec<DataSetWriterId>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_from_request_starts_disabled() {
        let group = WriterGroup::from_request(
            WriterGroupId::new("g1"),
            WriterGroupRequest {
                name: Some("TestGroup".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(group.status.state, WriterGroupState::Disabled);
        assert_eq!(group.name.as_deref(), Some("TestGroup"));
        assert!(group.site_id.is_none());
    }

    #[test]
    fn test_item_state_has_error() {
        let mut state = PublishedItemState::default();
        assert!(!state.has_error());

        state.last_result = Some(StatusCode::GOOD);
        assert!(!state.has_error());

        state.last_result = Some(StatusCode::BAD_NODE_ID_UNKNOWN);
        assert!(state.has_error());
    }

    #[test]
    fn test_source_state_health() {
        let healthy = SourceState::connected(crate::types::ConnectionState::Connected);
        assert!(healthy.is_healthy());
        assert!(healthy.error_message.is_none());

        let bad = SourceState::with_result(
            crate::types::ConnectionState::Connected,
            StatusCode::BAD_NO_COMMUNICATION,
        );
        assert!(!bad.is_healthy());
        assert!(bad.error_message.is_some());
    }

    #[test]
    fn test_group_serde_round_trip() {
        let group = WriterGroup::from_request(
            WriterGroupId::new("g1"),
            WriterGroupRequest {
                name: Some("TestGroup".to_string()),
                batch_size: Some(50),
                publishing_interval: Some(Duration::from_secs(1)),
                ..Default::default()
            },
        );

        let json = serde_json::to_string(&group).unwrap();
        let back: WriterGroup = serde_json::from_str(&json).unwrap();
        assert_eq!(group, back);
    }
}
