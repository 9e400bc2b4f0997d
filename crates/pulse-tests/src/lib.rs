// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # PULSE Integration Tests
//!
//! This crate provides integration tests for the PULSE telemetry publishing
//! platform, plus the shared test utilities they are built on.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities
//!   - `fixtures`: Pre-built endpoints, node ids, and requests
//!   - `builders`: Builder patterns for registry request payloads
//!   - `assertions`: Event-stream and wire-format assertion helpers
//!   - `mocks`: Mock OPC UA client, endpoint inventory, collecting sink
//!   - `harness`: A fully wired platform (registry + engine + mocks)
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p pulse-tests
//!
//! # Run specific test suite
//! cargo test -p pulse-tests --test integration_registry
//! cargo test -p pulse-tests --test integration_import
//! cargo test -p pulse-tests --test integration_engine
//! cargo test -p pulse-tests --test integration_pubsub
//!
//! # Run with verbose output
//! cargo test -p pulse-tests -- --nocapture
//! ```
//!
//! ## Test Categories
//!
//! ### Registry Tests (`integration_registry.rs`)
//! - Optimistic concurrency (generation checks)
//! - Sentinel-clears patch semantics
//! - Group lifecycle state machine and deletion guard
//! - Default writer/group auto-creation and dedup
//! - Bulk variable add/remove round trips
//!
//! ### Import Tests (`integration_import.rs`)
//! - Endpoint resolution by (url, security mode, security policy)
//! - Site partitioning with group cloning
//! - Re-import upsert semantics and skipped writers
//!
//! ### Engine Tests (`integration_engine.rs`)
//! - Pipeline build on activation, teardown on deactivation
//! - Incremental writer reconfiguration
//! - Disposal idempotence and sequence monotonicity
//! - Group settings propagation to a running pipeline
//!
//! ### PubSub Tests (`integration_pubsub.rs`)
//! - End-to-end publish scenarios over the mock stack, including the
//!   `ua-data` JSON wire shape and error-state reporting

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::assertions::*;
    pub use crate::common::builders::*;
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
    pub use crate::common::*;
}
