// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # pulse-core
//!
//! Core types and contracts for the PULSE telemetry publishing platform.
//!
//! This crate provides the foundational types, traits, and utilities used
//! across all PULSE components including:
//!
//! - **Types**: Identifiers, node ids, status codes, enums
//! - **Model**: Writer groups, dataset writers, published items
//! - **Error**: Unified error hierarchy
//! - **Repository**: Generation-checked persistence contract with an
//!   in-memory implementation
//! - **Broker**: Typed registry event broker
//! - **Endpoint**: Endpoint inventory contract
//! - **Message**: Outbound PubSub network messages
//!
//! ## Example
//!
//! ```rust,ignore
//! use pulse_core::model::{WriterGroupRequest, DataSetWriterRequest};
//! use pulse_core::types::{EndpointId, NodeId, SiteId};
//!
//! let group = WriterGroupRequest {
//!     name: Some("line-4".to_string()),
//!     site_id: Some(SiteId::new("plant-1")),
//!     ..Default::default()
//! };
//! let writer = DataSetWriterRequest::for_endpoint(EndpointId::new("ep-1"));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod error;
pub mod model;
pub mod types;

// =============================================================================
// Persistence & Events
// =============================================================================

pub mod broker;
pub mod endpoint;
pub mod repository;

// =============================================================================
// Wire Model
// =============================================================================

pub mod message;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::*;
pub use model::*;
pub use types::*;

// Re-export repository types
pub use repository::{
    ContinuationToken, Entity, InMemoryRepository, Page, Repository, VariableKey, query_all,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};

// Re-export broker types
pub use broker::{
    DataSetWriterEvent, DataSetWriterListener, EventBroker, PublishedItemEvent,
    PublishedItemListener, RegistryEvent, WriterGroupEvent, WriterGroupListener,
};

// Re-export endpoint types
pub use endpoint::{Endpoint, EndpointQuery, EndpointRegistry};

// Re-export message types
pub use message::{
    DataSetMessage, EventSample, MetaDataVersion, MonitoredItemSample, NetworkMessage,
    NotificationPayload, OutboundMessage, MESSAGE_TYPE_DATA,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
