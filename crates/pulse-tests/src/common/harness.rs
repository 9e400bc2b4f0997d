// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! A fully wired platform for end-to-end tests: registry, event broker,
//! engine, and the mock external collaborators.

use std::sync::Arc;

use tokio::sync::broadcast;

use pulse_core::broker::{EventBroker, RegistryEvent};
use pulse_core::endpoint::Endpoint;
use pulse_engine::WriterGroupEngine;
use pulse_registry::WriterGroupRegistry;

use super::mocks::{CollectingSinkFactory, InMemoryEndpoints, MockSubscriptionClient};

/// Publisher id stamped on messages produced by harness pipelines.
pub const TEST_PUBLISHER_ID: &str = "urn:pulse:test-publisher";

/// The wired platform.
pub struct PulseHarness {
    /// The writer group registry.
    pub registry: Arc<WriterGroupRegistry>,
    /// The registry's event broker.
    pub broker: Arc<EventBroker>,
    /// The endpoint inventory.
    pub endpoints: Arc<InMemoryEndpoints>,
    /// The mock subscription stack.
    pub client: Arc<MockSubscriptionClient>,
    /// The sink factory collecting every flushed network message.
    pub sinks: Arc<CollectingSinkFactory>,
    /// The engine, already attached to the broker.
    pub engine: Arc<WriterGroupEngine>,
}

impl PulseHarness {
    /// Wires a platform over the given endpoint inventory.
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self::build(endpoints, CollectingSinkFactory::new())
    }

    /// Wires a platform whose sinks reject event notifications.
    pub fn data_only(endpoints: Vec<Endpoint>) -> Self {
        Self::build(endpoints, CollectingSinkFactory::data_only())
    }

    fn build(endpoints: Vec<Endpoint>, sinks: Arc<CollectingSinkFactory>) -> Self {
        super::init_test_logging();

        let broker = Arc::new(EventBroker::new());
        let endpoints = InMemoryEndpoints::new(endpoints);
        let registry = Arc::new(WriterGroupRegistry::in_memory(
            endpoints.clone(),
            Arc::clone(&broker),
        ));
        let client = MockSubscriptionClient::new();
        let engine = WriterGroupEngine::new(
            Arc::clone(&registry),
            endpoints.clone(),
            client.clone(),
            sinks.clone(),
            TEST_PUBLISHER_ID,
        );
        engine.attach();

        Self {
            registry,
            broker,
            endpoints,
            client,
            sinks,
            engine,
        }
    }

    /// Subscribes to the registry event tap.
    pub fn events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.broker.subscribe()
    }
}

/// Wires a registry without an engine, for configuration-only tests.
pub fn registry_only(endpoints: Vec<Endpoint>) -> (Arc<WriterGroupRegistry>, Arc<EventBroker>) {
    super::init_test_logging();
    let broker = Arc::new(EventBroker::new());
    let registry = Arc::new(WriterGroupRegistry::in_memory(
        InMemoryEndpoints::new(endpoints),
        Arc::clone(&broker),
    ));
    (registry, broker)
}
