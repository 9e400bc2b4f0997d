// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # pulse-registry
//!
//! The writer group registry: the configuration authority of the PULSE
//! telemetry publishing platform.
//!
//! The registry exposes CRUD + query over writer groups, dataset writers,
//! and published variables/events, owns the cross-entity invariants (site
//! consistency, variable/event exclusivity, generation checks, the group
//! deletion guard), and emits a typed event through the broker after every
//! successful mutation. Bulk paths cover batch variable add/remove with
//! saga-style compensation, default writer/group auto-creation, and site
//! partitioned import.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pulse_core::broker::EventBroker;
//! use pulse_registry::WriterGroupRegistry;
//!
//! let registry = WriterGroupRegistry::in_memory(endpoints, Arc::new(EventBroker::new()));
//! let group = registry.add_writer_group(Default::default()).await?;
//! registry.activate_writer_group(&group.id).await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod patch;
pub mod registry;

mod import;
mod state;
mod writers;

pub use registry::{WriterGroupRegistry, DEFAULT_GROUP_NAME};
pub use writers::MAX_BATCH_SIZE;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Test Support
// =============================================================================
