// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription client contract.
//!
//! The OPC UA stack is an external collaborator consumed through these
//! traits: the engine opens subscriptions, applies monitored items, and
//! receives callbacks, while session management, keep-alive, and transport
//! remain the stack's concern. Test doubles implement the same traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use pulse_core::endpoint::Endpoint;
use pulse_core::error::EngineResult;
use pulse_core::message::NotificationPayload;
use pulse_core::model::SelectedEventField;
use pulse_core::types::{
    ConnectionState, DataChangeTrigger, DeadbandType, MonitoringMode, NodeId, StatusCode,
};

// =============================================================================
// Subscription Model
// =============================================================================

/// Parameters for opening one subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionModel {
    /// The endpoint to connect through.
    pub endpoint: Endpoint,
    /// Requested publishing interval.
    pub publishing_interval: Option<Duration>,
    /// Max keep-alive count.
    pub keep_alive_count: Option<u32>,
    /// Lifetime count.
    pub lifetime_count: Option<u32>,
    /// Subscription priority.
    pub priority: Option<u8>,
    /// Max notifications per publish cycle.
    pub max_notifications_per_publish: Option<u32>,
    /// Whether the stack should resolve display names for items.
    pub resolve_display_name: bool,
}

/// One monitored item to apply to a subscription.
#[derive(Debug, Clone)]
pub struct MonitoredItemRequest {
    /// Client-side handle chosen by the engine; echoed in callbacks.
    pub client_handle: u32,
    /// The monitored node.
    pub node_id: NodeId,
    /// Display name override.
    pub display_name: Option<String>,
    /// `true` for an event item, `false` for a data-change item.
    pub is_event: bool,
    /// Sampling interval.
    pub sampling_interval: Option<Duration>,
    /// Server-side queue size.
    pub queue_size: Option<u32>,
    /// Discard-new flag for queue overflow.
    pub discard_new: Option<bool>,
    /// Monitoring mode.
    pub monitoring_mode: Option<MonitoringMode>,
    /// Deadband type of the data-change filter.
    pub deadband_type: Option<DeadbandType>,
    /// Deadband value.
    pub deadband_value: Option<f64>,
    /// Data change trigger.
    pub data_change_trigger: Option<DataChangeTrigger>,
    /// Selected event fields; empty for data-change items.
    pub selected_fields: Vec<SelectedEventField>,
    /// Event where-clause filter in JSON form.
    pub filter: Option<serde_json::Value>,
}

/// Result of applying one monitored item.
#[derive(Debug, Clone, Copy)]
pub struct MonitoredItemResult {
    /// The client handle the request carried.
    pub client_handle: u32,
    /// Server-assigned monitored item id, when creation succeeded.
    pub server_id: Option<u32>,
    /// Status of the item.
    pub status: StatusCode,
}

/// One notification delivered by a live subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionNotification {
    /// Server-side id of the originating subscription.
    pub subscription_id: u32,
    /// The notification payload.
    pub payload: NotificationPayload,
    /// String table accompanying the raw notification.
    pub string_table: Vec<String>,
}

/// Session details of an open subscription.
#[derive(Debug, Clone, Default)]
pub struct SessionInfo {
    /// The endpoint URL the session is connected to.
    pub endpoint_url: String,
    /// Application URI of the connected server.
    pub application_uri: Option<String>,
}

// =============================================================================
// Callback Listener
// =============================================================================

/// Callbacks a live subscription delivers to its owner.
///
/// Invoked from the stack's receive path; implementations must not block
/// for long.
#[async_trait]
pub trait SubscriptionListener: Send + Sync {
    /// The session's connectivity changed.
    async fn on_connectivity_change(&self, state: ConnectionState);

    /// A monitored item's status changed.
    async fn on_item_status(&self, result: MonitoredItemResult, is_event: bool);

    /// The subscription-level status changed.
    async fn on_subscription_status(&self, status: StatusCode);

    /// A data-change or event notification arrived.
    async fn on_notification(&self, notification: SubscriptionNotification);
}

// =============================================================================
// Handle and Client
// =============================================================================

/// A live subscription.
#[async_trait]
pub trait SubscriptionHandle: Send + Sync {
    /// Replaces the subscription's monitored item set.
    async fn apply(
        &self,
        items: Vec<MonitoredItemRequest>,
    ) -> EngineResult<Vec<MonitoredItemResult>>;

    /// Activates reporting.
    async fn activate(&self) -> EngineResult<()>;

    /// Closes the subscription. Further callbacks stop after this returns.
    async fn close(&self) -> EngineResult<()>;

    /// Whether the subscription currently reports itself enabled.
    fn enabled(&self) -> bool;

    /// Session details.
    fn session(&self) -> SessionInfo;
}

/// Factory for live subscriptions.
#[async_trait]
pub trait SubscriptionClient: Send + Sync {
    /// Opens a subscription and wires the listener to its callbacks.
    async fn create_subscription(
        &self,
        model: SubscriptionModel,
        listener: Arc<dyn SubscriptionListener>,
    ) -> EngineResult<Arc<dyn SubscriptionHandle>>;
}
