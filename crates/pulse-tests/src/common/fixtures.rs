// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built endpoints, node ids, and request payloads shared across the
//! integration suites.

use pulse_core::endpoint::Endpoint;
use pulse_core::types::NodeId;

/// The server's CurrentTime variable.
pub const CURRENT_TIME_NODE: &str = "i=2258";

/// A node id no server knows.
pub const UNKNOWN_NODE: &str = "i=88888";

/// The Server object, used as an event notifier.
pub const SERVER_NODE: &str = "i=2253";

/// Parses a node id, panicking on malformed input.
pub fn node(s: &str) -> NodeId {
    NodeId::parse(s).unwrap_or_else(|| panic!("malformed node id '{}'", s))
}

/// Pre-built endpoint inventories.
pub struct EndpointFixtures;

impl EndpointFixtures {
    /// `endpoint1` at plant one, no security, site `plant-1`.
    pub fn plant_one() -> Endpoint {
        Endpoint::insecure("endpoint1", "opc.tcp://plant-one:4840").with_site("plant-1")
    }

    /// `endpoint2` at plant two, no security, site `plant-2`.
    pub fn plant_two() -> Endpoint {
        Endpoint::insecure("endpoint2", "opc.tcp://plant-two:4840").with_site("plant-2")
    }

    /// `endpoint1` with no site assignment.
    pub fn global() -> Endpoint {
        Endpoint::insecure("endpoint1", "opc.tcp://plant-one:4840")
    }

    /// Both plant endpoints, for site-partitioning scenarios.
    pub fn both_plants() -> Vec<Endpoint> {
        vec![Self::plant_one(), Self::plant_two()]
    }
}
