// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Event broker: process-wide fan-out of registry lifecycle events.
//!
//! The broker delivers typed events to listeners registered per category.
//! Delivery is synchronous: the registry awaits every listener before its
//! triggering operation returns, so a mutation is observably complete only
//! after all listeners have acknowledged it. Delivery is at-least-once and
//! best-effort ordered per broker instance.
//!
//! A broadcast-channel tap is provided for passive observers (UI push
//! forwarders, metrics) that must not block mutations; taps receive the
//! same events with lossy backpressure semantics.
//!
//! # Event Categories
//!
//! - [`WriterGroupEvent`]: group added/updated/removed/activated/
//!   deactivated/state-changed
//! - [`DataSetWriterEvent`]: writer added/updated/removed, source state
//! - [`PublishedItemEvent`]: variable/event dataset CRUD and item state

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::model::{
    DataSetWriter, PublishedDataSetEvents, PublishedDataSetVariable, PublishedItemState,
    SourceState, WriterGroup,
};
use crate::types::{DataSetWriterId, VariableId, WriterGroupId, WriterGroupStatus};

/// Default capacity of the observer tap channel.
const DEFAULT_TAP_CAPACITY: usize = 1024;

// =============================================================================
// Events
// =============================================================================

/// Lifecycle events of writer groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WriterGroupEvent {
    /// A group was added.
    Added(WriterGroup),
    /// A group's configuration changed.
    Updated(WriterGroup),
    /// A group was removed.
    Removed {
        /// The removed group's id.
        id: WriterGroupId,
    },
    /// A group was activated.
    Activated(WriterGroup),
    /// A group was deactivated.
    Deactivated(WriterGroup),
    /// A group's runtime state changed.
    StateChanged {
        /// The group's id.
        id: WriterGroupId,
        /// The new status.
        status: WriterGroupStatus,
    },
}

impl WriterGroupEvent {
    /// Returns the id of the affected group.
    pub fn group_id(&self) -> &WriterGroupId {
        match self {
            Self::Added(g) | Self::Updated(g) | Self::Activated(g) | Self::Deactivated(g) => &g.id,
            Self::Removed { id } | Self::StateChanged { id, .. } => id,
        }
    }

    /// Returns the event kind name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "group_added",
            Self::Updated(_) => "group_updated",
            Self::Removed { .. } => "group_removed",
            Self::Activated(_) => "group_activated",
            Self::Deactivated(_) => "group_deactivated",
            Self::StateChanged { .. } => "group_state_changed",
        }
    }
}

/// Lifecycle events of dataset writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DataSetWriterEvent {
    /// A writer was added.
    Added(DataSetWriter),
    /// A writer's configuration changed.
    Updated(DataSetWriter),
    /// A writer was removed.
    Removed {
        /// The removed writer's id.
        id: DataSetWriterId,
        /// The group it belonged to.
        writer_group_id: WriterGroupId,
    },
    /// The writer's runtime source state changed.
    SourceStateChanged {
        /// The writer's id.
        writer_id: DataSetWriterId,
        /// The new source state.
        state: SourceState,
    },
}

impl DataSetWriterEvent {
    /// Returns the id of the affected writer.
    pub fn writer_id(&self) -> &DataSetWriterId {
        match self {
            Self::Added(w) | Self::Updated(w) => &w.id,
            Self::Removed { id, .. } => id,
            Self::SourceStateChanged { writer_id, .. } => writer_id,
        }
    }

    /// Returns the event kind name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "writer_added",
            Self::Updated(_) => "writer_updated",
            Self::Removed { .. } => "writer_removed",
            Self::SourceStateChanged { .. } => "writer_source_state",
        }
    }
}

/// Lifecycle events of published variables and event datasets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PublishedItemEvent {
    /// A variable was added.
    VariableAdded(PublishedDataSetVariable),
    /// A variable's configuration changed.
    VariableUpdated(PublishedDataSetVariable),
    /// A variable was removed.
    VariableRemoved {
        /// The owning writer.
        writer_id: DataSetWriterId,
        /// The removed variable's id.
        variable_id: VariableId,
    },
    /// An event dataset was added.
    EventsAdded(PublishedDataSetEvents),
    /// An event dataset's configuration changed.
    EventsUpdated(PublishedDataSetEvents),
    /// An event dataset was removed.
    EventsRemoved {
        /// The owning writer.
        writer_id: DataSetWriterId,
    },
    /// A variable's runtime state changed.
    VariableStateChanged {
        /// The owning writer.
        writer_id: DataSetWriterId,
        /// The variable's id.
        variable_id: VariableId,
        /// The new state.
        state: PublishedItemState,
    },
    /// An event dataset's runtime state changed.
    EventsStateChanged {
        /// The owning writer.
        writer_id: DataSetWriterId,
        /// The new state.
        state: PublishedItemState,
    },
}

impl PublishedItemEvent {
    /// Returns the event kind name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VariableAdded(_) => "variable_added",
            Self::VariableUpdated(_) => "variable_updated",
            Self::VariableRemoved { .. } => "variable_removed",
            Self::EventsAdded(_) => "events_added",
            Self::EventsUpdated(_) => "events_updated",
            Self::EventsRemoved { .. } => "events_removed",
            Self::VariableStateChanged { .. } => "variable_state_changed",
            Self::EventsStateChanged { .. } => "events_state_changed",
        }
    }
}

/// Union of all registry events, delivered through the observer tap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// A writer group event.
    Group(WriterGroupEvent),
    /// A dataset writer event.
    Writer(DataSetWriterEvent),
    /// A published item event.
    Item(PublishedItemEvent),
}

impl RegistryEvent {
    /// Returns the event kind name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Group(e) => e.kind(),
            Self::Writer(e) => e.kind(),
            Self::Item(e) => e.kind(),
        }
    }
}

// =============================================================================
// Listener Traits
// =============================================================================

/// Listener for writer group events.
#[async_trait]
pub trait WriterGroupListener: Send + Sync {
    /// Handles one writer group event.
    async fn on_writer_group_event(&self, event: &WriterGroupEvent);
}

/// Listener for dataset writer events.
#[async_trait]
pub trait DataSetWriterListener: Send + Sync {
    /// Handles one dataset writer event.
    async fn on_dataset_writer_event(&self, event: &DataSetWriterEvent);
}

/// Listener for published item events.
#[async_trait]
pub trait PublishedItemListener: Send + Sync {
    /// Handles one published item event.
    async fn on_published_item_event(&self, event: &PublishedItemEvent);
}

// =============================================================================
// Event Broker
// =============================================================================

/// Typed publish/subscribe broker for registry lifecycle events.
///
/// Listeners are registered at startup; `notify_*` awaits each listener in
/// registration order before returning. The observer tap never blocks the
/// notifying operation.
pub struct EventBroker {
    group_listeners: RwLock<Vec<Arc<dyn WriterGroupListener>>>,
    writer_listeners: RwLock<Vec<Arc<dyn DataSetWriterListener>>>,
    item_listeners: RwLock<Vec<Arc<dyn PublishedItemListener>>>,
    tap: broadcast::Sender<RegistryEvent>,
}

impl EventBroker {
    /// Creates a broker with the default tap capacity.
    pub fn new() -> Self {
        Self::with_tap_capacity(DEFAULT_TAP_CAPACITY)
    }

    /// Creates a broker with a specific tap capacity.
    pub fn with_tap_capacity(capacity: usize) -> Self {
        let (tap, _) = broadcast::channel(capacity);
        Self {
            group_listeners: RwLock::new(Vec::new()),
            writer_listeners: RwLock::new(Vec::new()),
            item_listeners: RwLock::new(Vec::new()),
            tap,
        }
    }

    /// Registers a writer group listener.
    pub fn register_group_listener(&self, listener: Arc<dyn WriterGroupListener>) {
        self.group_listeners.write().push(listener);
    }

    /// Registers a dataset writer listener.
    pub fn register_writer_listener(&self, listener: Arc<dyn DataSetWriterListener>) {
        self.writer_listeners.write().push(listener);
    }

    /// Registers a published item listener.
    pub fn register_item_listener(&self, listener: Arc<dyn PublishedItemListener>) {
        self.item_listeners.write().push(listener);
    }

    /// Subscribes a passive observer to the event tap.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.tap.subscribe()
    }

    /// Delivers a writer group event to all registered listeners.
    pub async fn notify_group(&self, event: WriterGroupEvent) {
        tracing::debug!(kind = event.kind(), group_id = %event.group_id(), "Dispatching event");
        let listeners = self.group_listeners.read().clone();
        for listener in listeners {
            listener.on_writer_group_event(&event).await;
        }
        let _ = self.tap.send(RegistryEvent::Group(event));
    }

    /// Delivers a dataset writer event to all registered listeners.
    pub async fn notify_writer(&self, event: DataSetWriterEvent) {
        tracing::debug!(kind = event.kind(), writer_id = %event.writer_id(), "Dispatching event");
        let listeners = self.writer_listeners.read().clone();
        for listener in listeners {
            listener.on_dataset_writer_event(&event).await;
        }
        let _ = self.tap.send(RegistryEvent::Writer(event));
    }

    /// Delivers a published item event to all registered listeners.
    pub async fn notify_item(&self, event: PublishedItemEvent) {
        tracing::debug!(kind = event.kind(), "Dispatching event");
        let listeners = self.item_listeners.read().clone();
        for listener in listeners {
            listener.on_published_item_event(&event).await;
        }
        let _ = self.tap.send(RegistryEvent::Item(event));
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroker")
            .field("group_listeners", &self.group_listeners.read().len())
            .field("writer_listeners", &self.writer_listeners.read().len())
            .field("item_listeners", &self.item_listeners.read().len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
