// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # pulse-engine
//!
//! The publishing engine of the PULSE telemetry platform.
//!
//! The engine turns registry configuration into live OPC UA subscriptions
//! and outbound `ua-data` network messages: activating a writer group
//! builds a pipeline (a [`MessageSink`] plus a [`WriterGroupDataSource`]
//! holding one [`DataSetWriterSubscription`] per writer), configuration
//! events reconfigure pipelines incrementally, and every runtime
//! observation flows back into the registry through a [`StateReporter`].
//!
//! The OPC UA stack itself is abstracted behind [`SubscriptionClient`];
//! tests drive the engine with in-memory doubles.
//!
//! ## Example
//!
//! ```rust,ignore
//! let engine = WriterGroupEngine::new(registry, endpoints, client, sinks, "urn:pulse:publisher");
//! engine.attach();
//! engine.resync().await;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod engine;
pub mod sink;
pub mod source;
pub mod writer;

pub use client::{
    MonitoredItemRequest, MonitoredItemResult, SessionInfo, SubscriptionClient,
    SubscriptionHandle, SubscriptionListener, SubscriptionModel, SubscriptionNotification,
};
pub use engine::{RegistryStateReporter, SinkFactory, WriterGroupEngine};
pub use sink::{JsonMessageSink, MessageSink, SinkSettings};
pub use source::WriterGroupDataSource;
pub use writer::{
    DataSetNotificationSink, DataSetWriterSubscription, ResolvedWriter, StateReporter,
    WriterContext,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
