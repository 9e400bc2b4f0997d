// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Request Builders
//!
//! Builder patterns for the registry's request payloads, keeping the test
//! bodies focused on the behavior under test.

use std::collections::BTreeMap;
use std::time::Duration;

use pulse_core::model::{
    DataSetWriterImport, DataSetWriterRequest, PublishedDataSet, PublishedEventsRequest,
    PublishedVariableRequest, SelectedEventField, SubscriptionSettings, WriterGroupImport,
    WriterGroupRequest,
};
use pulse_core::types::{
    DataSetWriterId, EndpointId, SecurityMode, SecurityPolicy, SiteId, WriterGroupId,
};

use super::fixtures::node;

// =============================================================================
// Writer Group
// =============================================================================

/// Builds a [`WriterGroupRequest`].
#[derive(Default)]
pub struct GroupBuilder {
    request: WriterGroupRequest,
}

impl GroupBuilder {
    /// Starts an empty group request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the group name.
    pub fn name(mut self, name: &str) -> Self {
        self.request.name = Some(name.to_string());
        self
    }

    /// Sets the site.
    pub fn site(mut self, site: &str) -> Self {
        self.request.site_id = Some(SiteId::new(site));
        self
    }

    /// Sets the notification batch size.
    pub fn batch_size(mut self, size: u32) -> Self {
        self.request.batch_size = Some(size);
        self
    }

    /// Sets the publishing interval.
    pub fn publishing_interval(mut self, interval: Duration) -> Self {
        self.request.publishing_interval = Some(interval);
        self
    }

    /// Finishes the request.
    pub fn build(self) -> WriterGroupRequest {
        self.request
    }
}

// =============================================================================
// Dataset Writer
// =============================================================================

/// Builds a [`DataSetWriterRequest`].
pub struct WriterBuilder {
    request: DataSetWriterRequest,
}

impl WriterBuilder {
    /// Starts a writer request for the given endpoint.
    pub fn for_endpoint(endpoint_id: &str) -> Self {
        Self {
            request: DataSetWriterRequest::for_endpoint(EndpointId::new(endpoint_id)),
        }
    }

    /// Sets an explicit writer id.
    pub fn id(mut self, id: &str) -> Self {
        self.request.id = Some(DataSetWriterId::new(id));
        self
    }

    /// Places the writer into a specific group.
    pub fn group(mut self, group_id: &WriterGroupId) -> Self {
        self.request.writer_group_id = Some(group_id.clone());
        self
    }

    /// Sets the dataset name.
    pub fn dataset_name(mut self, name: &str) -> Self {
        self.dataset().name = Some(name.to_string());
        self
    }

    /// Adds a static extension field.
    pub fn extension_field(mut self, name: &str, value: serde_json::Value) -> Self {
        self.dataset()
            .extension_fields
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), value);
        self
    }

    /// Sets the subscription publishing interval.
    pub fn publishing_interval(mut self, interval: Duration) -> Self {
        self.dataset()
            .subscription_settings
            .get_or_insert_with(SubscriptionSettings::default)
            .publishing_interval = Some(interval);
        self
    }

    fn dataset(&mut self) -> &mut PublishedDataSet {
        self.request.dataset.get_or_insert_with(PublishedDataSet::default)
    }

    /// Finishes the request.
    pub fn build(self) -> DataSetWriterRequest {
        self.request
    }
}

// =============================================================================
// Published Variable
// =============================================================================

/// Builds a [`PublishedVariableRequest`].
pub struct VariableBuilder {
    request: PublishedVariableRequest,
}

impl VariableBuilder {
    /// Starts a variable request publishing the given node.
    pub fn for_node(node_id: &str) -> Self {
        Self {
            request: PublishedVariableRequest::for_node(node(node_id)),
        }
    }

    /// Sets the display name.
    pub fn display_name(mut self, name: &str) -> Self {
        self.request.display_name = Some(name.to_string());
        self
    }

    /// Sets the sampling interval.
    pub fn sampling_interval(mut self, interval: Duration) -> Self {
        self.request.sampling_interval = Some(interval);
        self
    }

    /// Sets the server-side queue size.
    pub fn queue_size(mut self, size: u32) -> Self {
        self.request.queue_size = Some(size);
        self
    }

    /// Finishes the request.
    pub fn build(self) -> PublishedVariableRequest {
        self.request
    }
}

// =============================================================================
// Event Dataset
// =============================================================================

/// Builds a [`PublishedEventsRequest`].
pub struct EventsBuilder {
    request: PublishedEventsRequest,
}

impl EventsBuilder {
    /// Starts an events request on the given notifier node.
    pub fn for_notifier(notifier: &str) -> Self {
        Self {
            request: PublishedEventsRequest {
                notifier: node(notifier),
                selected_fields: Vec::new(),
                filter: None,
                monitoring_mode: None,
                queue_size: None,
                discard_new: None,
            },
        }
    }

    /// Selects an event field.
    pub fn field(mut self, name: &str, browse_path: &[&str]) -> Self {
        self.request.selected_fields.push(SelectedEventField {
            name: name.to_string(),
            browse_path: browse_path.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Finishes the request.
    pub fn build(self) -> PublishedEventsRequest {
        self.request
    }
}

// =============================================================================
// Import
// =============================================================================

/// Builds a [`WriterGroupImport`] definition.
pub struct ImportBuilder {
    import: WriterGroupImport,
}

impl ImportBuilder {
    /// Starts an import definition.
    pub fn new() -> Self {
        Self {
            import: WriterGroupImport {
                id: None,
                group: WriterGroupRequest::default(),
                writers: Vec::new(),
            },
        }
    }

    /// Sets an explicit group id.
    pub fn id(mut self, id: &str) -> Self {
        self.import.id = Some(WriterGroupId::new(id));
        self
    }

    /// Sets the group name.
    pub fn name(mut self, name: &str) -> Self {
        self.import.group.name = Some(name.to_string());
        self
    }

    /// Adds a writer resolved by endpoint URL, publishing the given nodes.
    pub fn writer(mut self, endpoint_url: &str, nodes: &[&str]) -> Self {
        self.import.writers.push(DataSetWriterImport {
            endpoint_url: endpoint_url.to_string(),
            security_mode: SecurityMode::None,
            security_policy: SecurityPolicy::None,
            id: None,
            dataset: None,
            variables: nodes
                .iter()
                .map(|n| PublishedVariableRequest::for_node(node(n)))
                .collect(),
            events: None,
        });
        self
    }

    /// Adds a writer publishing an event dataset.
    pub fn event_writer(mut self, endpoint_url: &str, notifier: &str) -> Self {
        self.import.writers.push(DataSetWriterImport {
            endpoint_url: endpoint_url.to_string(),
            security_mode: SecurityMode::None,
            security_policy: SecurityPolicy::None,
            id: None,
            dataset: None,
            variables: Vec::new(),
            events: Some(EventsBuilder::for_notifier(notifier).build()),
        });
        self
    }

    /// Finishes the definition.
    pub fn build(self) -> WriterGroupImport {
        self.import
    }
}

impl Default for ImportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
