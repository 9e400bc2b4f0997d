// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Endpoint registry contract.
//!
//! The endpoint registry is an external collaborator: it owns the inventory
//! of OPC UA server endpoints (discovered or provisioned elsewhere) and is
//! consulted at read-time to resolve a writer's connection details, and at
//! import-time to locate the endpoint matching a (url, security mode,
//! security policy) triple.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RegistryResult;
use crate::types::{EndpointId, SecurityMode, SecurityPolicy, SiteId};

// =============================================================================
// Endpoint Model
// =============================================================================

/// A resolvable OPC UA server endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Unique endpoint id.
    pub id: EndpointId,
    /// Endpoint URL (`opc.tcp://...`).
    pub url: String,
    /// Site the endpoint belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<SiteId>,
    /// Message security mode.
    #[serde(default)]
    pub security_mode: SecurityMode,
    /// Security policy.
    #[serde(default)]
    pub security_policy: SecurityPolicy,
    /// Application URI of the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_uri: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint with no security.
    pub fn insecure(id: impl Into<EndpointId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            site_id: None,
            security_mode: SecurityMode::None,
            security_policy: SecurityPolicy::None,
            application_uri: None,
        }
    }

    /// Sets the site id.
    pub fn with_site(mut self, site_id: impl Into<SiteId>) -> Self {
        self.site_id = Some(site_id.into());
        self
    }
}

/// Exact-match query for locating endpoints during import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointQuery {
    /// Endpoint URL to match.
    pub url: String,
    /// Security mode to match.
    pub security_mode: SecurityMode,
    /// Security policy to match.
    pub security_policy: SecurityPolicy,
}

// =============================================================================
// Endpoint Registry Trait
// =============================================================================

/// Read access to the external endpoint inventory.
#[async_trait]
pub trait EndpointRegistry: Send + Sync {
    /// Resolves an endpoint by id.
    ///
    /// # Errors
    ///
    /// `NotFound` if no endpoint with that id exists.
    async fn get_endpoint(&self, id: &EndpointId) -> RegistryResult<Endpoint>;

    /// Finds endpoints matching the query.
    async fn query_endpoints(&self, query: &EndpointQuery) -> RegistryResult<Vec<Endpoint>>;
}
