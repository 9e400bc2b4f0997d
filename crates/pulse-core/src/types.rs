// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core identifier and value types for PULSE.
//!
//! This module defines the strongly-typed identifiers used across the
//! platform, the OPC UA node identifier representation, status codes, and
//! the small enums shared by the configuration model and the publishing
//! engine.
//!
//! # Design Principles
//!
//! - **Newtype ids**: every entity id is a distinct type; mixing up a writer
//!   id and a group id is a compile error, not a runtime bug
//! - **Opaque generations**: generation tokens are compared, never parsed
//! - **Serde everywhere**: all types serialize cleanly for the API layer

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Entity Identifiers
// =============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new id from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Creates a freshly generated random id.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().simple().to_string())
            }

            /// Returns the id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id! {
    /// Unique identifier of a writer group.
    WriterGroupId
}

string_id! {
    /// Unique identifier of a dataset writer.
    DataSetWriterId
}

string_id! {
    /// Unique identifier of a published variable or event definition
    /// within one dataset writer.
    VariableId
}

string_id! {
    /// Identifier of an endpoint in the external endpoint registry.
    EndpointId
}

string_id! {
    /// Identifier of the site (factory, plant, edge location) an endpoint
    /// and its writer groups belong to.
    SiteId
}

impl VariableId {
    /// Derives a deterministic variable id from a published node id.
    ///
    /// Bulk-add and default-writer flows use this so that repeated adds of
    /// the same node id upsert the existing variable instead of duplicating
    /// it. The derivation is a v5 (name-based) UUID over the node id string,
    /// so it is stable across processes.
    pub fn from_node_id(node_id: &NodeId) -> Self {
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_URL, node_id.to_string().as_bytes());
        Self(uuid.simple().to_string())
    }
}

impl From<&EndpointId> for DataSetWriterId {
    /// The default writer for an endpoint uses the endpoint id as its own
    /// id, which serves as the natural dedup key for bulk-add flows.
    fn from(id: &EndpointId) -> Self {
        Self(id.as_str().to_string())
    }
}

// =============================================================================
// Generation Token
// =============================================================================

/// Opaque version stamp used for optimistic concurrency.
///
/// A new generation is assigned on every successful write. Callers hand the
/// generation back on update/delete; a mismatch fails the operation with
/// `OutOfDate`. Generations are compared, never interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationId(String);

impl GenerationId {
    /// Creates a fresh generation token.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GenerationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for GenerationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Node Identifier
// =============================================================================

/// The identifier part of an OPC UA node id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeIdentifier {
    /// Numeric identifier (`i=2258`).
    Numeric(u32),
    /// String identifier (`s=Temperature`).
    String(String),
    /// GUID identifier (`g=...`).
    Guid(Uuid),
    /// Opaque byte-string identifier (`b=...`).
    Opaque(Vec<u8>),
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "i={}", n),
            Self::String(s) => write!(f, "s={}", s),
            Self::Guid(g) => write!(f, "g={}", g),
            Self::Opaque(b) => {
                write!(f, "b=")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// An OPC UA node identifier with namespace index.
///
/// Parses and renders the standard string form: `ns=2;s=Temperature`,
/// `i=2258`, `ns=1;g=<uuid>`. A missing `ns=` prefix means namespace 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index.
    pub namespace: u16,
    /// The identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node id.
    pub fn numeric(namespace: u16, id: u32) -> Self {
        Self {
            namespace,
            identifier: NodeIdentifier::Numeric(id),
        }
    }

    /// Creates a string node id.
    pub fn string(namespace: u16, id: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: NodeIdentifier::String(id.into()),
        }
    }

    /// Parses a node id from its OPC UA string form.
    ///
    /// Returns `None` if the string does not match any known form.
    pub fn parse(s: &str) -> Option<Self> {
        let (namespace, rest) = match s.strip_prefix("ns=") {
            Some(tail) => {
                let (ns, rest) = tail.split_once(';')?;
                (ns.parse::<u16>().ok()?, rest)
            }
            None => (0, s),
        };

        let identifier = match rest.split_once('=')? {
            ("i", value) => NodeIdentifier::Numeric(value.parse().ok()?),
            ("s", value) => NodeIdentifier::String(value.to_string()),
            ("g", value) => NodeIdentifier::Guid(Uuid::parse_str(value).ok()?),
            ("b", value) => {
                if value.len() % 2 != 0 {
                    return None;
                }
                let bytes = (0..value.len())
                    .step_by(2)
                    .map(|i| u8::from_str_radix(&value[i..i + 2], 16))
                    .collect::<Result<Vec<u8>, _>>()
                    .ok()?;
                NodeIdentifier::Opaque(bytes)
            }
            _ => return None,
        };

        Some(Self { namespace, identifier })
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        write!(f, "{}", self.identifier)
    }
}

// =============================================================================
// Status Code
// =============================================================================

/// An OPC UA status code.
///
/// Only the severity masks and the handful of codes this platform reports
/// are modeled; everything else passes through as the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Operation succeeded.
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    /// The node id refers to a node that does not exist.
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    /// The session is not connected.
    pub const BAD_NOT_CONNECTED: StatusCode = StatusCode(0x808A_0000);
    /// Communication with the data source is down.
    pub const BAD_NO_COMMUNICATION: StatusCode = StatusCode(0x8031_0000);
    /// The requested operation is not supported.
    pub const BAD_NOT_SUPPORTED: StatusCode = StatusCode(0x803D_0000);
    /// The monitored item filter is invalid.
    pub const BAD_FILTER_NOT_ALLOWED: StatusCode = StatusCode(0x8045_0000);

    /// Returns `true` if the code indicates success.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` if the code indicates failure.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns `true` if the code indicates an uncertain value.
    #[inline]
    pub const fn is_uncertain(&self) -> bool {
        self.0 & 0x4000_0000 != 0 && !self.is_bad()
    }

    /// Returns a symbolic name for the known codes.
    pub fn symbol(&self) -> &'static str {
        match *self {
            Self::GOOD => "Good",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_NOT_CONNECTED => "BadNotConnected",
            Self::BAD_NO_COMMUNICATION => "BadNoCommunication",
            Self::BAD_NOT_SUPPORTED => "BadNotSupported",
            Self::BAD_FILTER_NOT_ALLOWED => "BadFilterNotAllowed",
            _ if self.is_bad() => "Bad",
            _ if self.is_uncertain() => "Uncertain",
            _ => "Good",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.symbol(), self.0)
    }
}

// =============================================================================
// Writer Group State
// =============================================================================

/// Lifecycle state of a writer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriterGroupState {
    /// The group exists but publishes nothing.
    #[default]
    Disabled,
    /// The group is activated and waiting for its first message to flow.
    Pending,
    /// The group is actively publishing network messages.
    Publishing,
}

impl WriterGroupState {
    /// Returns `true` if the group participates in publishing.
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Publishing)
    }
}

impl fmt::Display for WriterGroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "Disabled"),
            Self::Pending => write!(f, "Pending"),
            Self::Publishing => write!(f, "Publishing"),
        }
    }
}

/// A writer group state with its last-change timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterGroupStatus {
    /// Current lifecycle state.
    pub state: WriterGroupState,
    /// When the state last changed.
    pub last_state_change: DateTime<Utc>,
}

impl WriterGroupStatus {
    /// Creates a status in the given state, stamped now.
    pub fn new(state: WriterGroupState) -> Self {
        Self {
            state,
            last_state_change: Utc::now(),
        }
    }
}

impl Default for WriterGroupStatus {
    fn default() -> Self {
        Self::new(WriterGroupState::Disabled)
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of a writer's underlying session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection.
    #[default]
    Disconnected,
    /// Connection is being established (or re-established).
    Connecting,
    /// Connected and operational.
    Connected,
    /// Connection failed.
    Failed,
}

impl ConnectionState {
    /// Returns `true` if the session is usable.
    #[inline]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// Encoding and Security Enums
// =============================================================================

/// Wire encoding of outgoing network messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageEncoding {
    /// OPC UA PubSub JSON encoding.
    #[default]
    Json,
    /// JSON with reversible field encoding.
    JsonReversible,
    /// Binary UADP encoding.
    Uadp,
}

impl fmt::Display for MessageEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "Json"),
            Self::JsonReversible => write!(f, "JsonReversible"),
            Self::Uadp => write!(f, "Uadp"),
        }
    }
}

/// Message security mode of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// No security.
    #[default]
    None,
    /// Messages are signed.
    Sign,
    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

/// Security policy URI of an endpoint, abbreviated to the policy name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicy {
    /// No security policy.
    #[default]
    None,
    /// Basic256Sha256.
    Basic256Sha256,
    /// Aes128Sha256RsaOaep.
    Aes128Sha256RsaOaep,
    /// Aes256Sha256RsaPss.
    Aes256Sha256RsaPss,
}

// =============================================================================
// Monitoring Enums
// =============================================================================

/// Monitoring mode of a monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringMode {
    /// Item is disabled.
    Disabled,
    /// Item is sampled but notifications are not reported.
    Sampling,
    /// Item is sampled and notifications are reported.
    #[default]
    Reporting,
}

/// Deadband type for data change filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeadbandType {
    /// No deadband.
    #[default]
    None,
    /// Absolute deadband value.
    Absolute,
    /// Percent of the engineering unit range.
    Percent,
}

/// What triggers a data change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataChangeTrigger {
    /// Status changes only.
    Status,
    /// Status or value changes.
    #[default]
    StatusValue,
    /// Status, value, or timestamp changes.
    StatusValueTimestamp,
}

// =============================================================================
// Serde Helpers
// =============================================================================

/// Serialization helper for `Duration` as milliseconds.
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serializes a duration as integer milliseconds.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    /// Deserializes integer milliseconds into a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Serialization helper for `Option<Duration>` as milliseconds.
pub mod duration_opt_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serializes an optional duration as integer milliseconds.
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map(|d| d.as_millis() as u64)
            .serialize(serializer)
    }

    /// Deserializes optional integer milliseconds into a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

/// Returns `true` if the duration is the zero sentinel.
pub fn is_zero_duration(d: &Duration) -> bool {
    d.is_zero()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_parse_numeric() {
        let id = NodeId::parse("i=2258").unwrap();
        assert_eq!(id, NodeId::numeric(0, 2258));
        assert_eq!(id.to_string(), "i=2258");
    }

    #[test]
    fn test_node_id_parse_string_with_namespace() {
        let id = NodeId::parse("ns=2;s=Temperature").unwrap();
        assert_eq!(id, NodeId::string(2, "Temperature"));
        assert_eq!(id.to_string(), "ns=2;s=Temperature");
    }

    #[test]
    fn test_node_id_parse_guid() {
        let uuid = Uuid::new_v4();
        let s = format!("ns=1;g={}", uuid);
        let id = NodeId::parse(&s).unwrap();
        assert_eq!(id.identifier, NodeIdentifier::Guid(uuid));
    }

    #[test]
    fn test_node_id_parse_invalid() {
        assert!(NodeId::parse("").is_none());
        assert!(NodeId::parse("x=1").is_none());
        assert!(NodeId::parse("ns=abc;i=1").is_none());
    }

    #[test]
    fn test_variable_id_derivation_is_stable() {
        let node = NodeId::parse("i=2258").unwrap();
        let a = VariableId::from_node_id(&node);
        let b = VariableId::from_node_id(&node);
        assert_eq!(a, b);

        let other = NodeId::parse("i=2259").unwrap();
        assert_ne!(a, VariableId::from_node_id(&other));
    }

    #[test]
    fn test_generation_ids_are_unique() {
        assert_ne!(GenerationId::new(), GenerationId::new());
    }

    #[test]
    fn test_status_code_masks() {
        assert!(StatusCode::GOOD.is_good());
        assert!(!StatusCode::GOOD.is_bad());
        assert!(StatusCode::BAD_NODE_ID_UNKNOWN.is_bad());
        assert_eq!(StatusCode::BAD_NODE_ID_UNKNOWN.symbol(), "BadNodeIdUnknown");
        assert!(StatusCode(0x4000_0000).is_uncertain());
    }

    #[test]
    fn test_writer_group_state() {
        assert!(!WriterGroupState::Disabled.is_active());
        assert!(WriterGroupState::Pending.is_active());
        assert!(WriterGroupState::Publishing.is_active());
        assert_eq!(WriterGroupState::default(), WriterGroupState::Disabled);
    }

    #[test]
    fn test_default_writer_id_equals_endpoint_id() {
        let endpoint = EndpointId::new("endpoint1");
        let writer: DataSetWriterId = (&endpoint).into();
        assert_eq!(writer.as_str(), "endpoint1");
    }
}
