// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Unified error hierarchy for PULSE.
//!
//! # Error Hierarchy
//!
//! ```text
//! PulseError (root)
//! ├── Registry  - Configuration mutations and queries
//! ├── Engine    - Live subscription and pipeline errors
//! └── Sink      - Outgoing message sink errors
//! ```
//!
//! The registry taxonomy maps 1:1 to the platform's management contract:
//! `NotFound`, `OutOfDate` (generation mismatch), `InvalidArgument`, and
//! `InvalidState`. Runtime data-plane faults are never raised through this
//! hierarchy; they travel as status codes in entity state and through the
//! event broker.

use std::fmt;

use thiserror::Error;

use crate::types::StatusCode;

// =============================================================================
// PulseError - Root Error Type
// =============================================================================

/// The root error type for PULSE.
#[derive(Debug, Error)]
pub enum PulseError {
    /// Registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Engine error.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Sink error.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

impl PulseError {
    /// Returns the error type as a string for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            PulseError::Registry(_) => "registry",
            PulseError::Engine(_) => "engine",
            PulseError::Sink(_) => "sink",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            PulseError::Registry(e) => e.status_code(),
            PulseError::Engine(_) => 500,
            PulseError::Sink(_) => 503,
        }
    }
}

// =============================================================================
// RegistryError
// =============================================================================

/// Errors surfaced by the writer group registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A referenced entity does not exist.
    #[error("Not found: {entity} '{id}'")]
    NotFound {
        /// The entity kind.
        entity: &'static str,
        /// The missing id.
        id: String,
    },

    /// The supplied generation does not match the stored record.
    #[error("Out of date: {entity} '{id}' was modified concurrently")]
    OutOfDate {
        /// The entity kind.
        entity: &'static str,
        /// The contested id.
        id: String,
    },

    /// A required field is missing or a cross-entity constraint is violated.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// The operation is not allowed in the entity's current state.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Why the operation was rejected.
        message: String,
    },

    /// An entity with the same id already exists.
    #[error("Already exists: {entity} '{id}'")]
    AlreadyExists {
        /// The entity kind.
        entity: &'static str,
        /// The duplicated id.
        id: String,
    },

    /// A batch operation partially failed and was compensated.
    #[error("Batch operation failed after {succeeded} items; compensated: {message}")]
    BatchFailed {
        /// Items that had succeeded before the failure.
        succeeded: usize,
        /// The systemic failure.
        message: String,
    },

    /// A continuation token could not be decoded.
    #[error("Invalid continuation token")]
    InvalidContinuation,
}

impl RegistryError {
    /// Creates a not-found error.
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates an out-of-date error.
    pub fn out_of_date(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::OutOfDate {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid-state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an already-exists error.
    pub fn already_exists(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::AlreadyExists {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns `true` if this is an already-exists conflict.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if this is a generation mismatch.
    pub fn is_out_of_date(&self) -> bool {
        matches!(self, Self::OutOfDate { .. })
    }

    /// Returns the error type as a string for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::OutOfDate { .. } => "out_of_date",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::InvalidState { .. } => "invalid_state",
            Self::AlreadyExists { .. } => "already_exists",
            Self::BatchFailed { .. } => "batch_failed",
            Self::InvalidContinuation => "invalid_continuation",
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::OutOfDate { .. } => 409,
            Self::InvalidArgument { .. } => 400,
            Self::InvalidState { .. } => 409,
            Self::AlreadyExists { .. } => 409,
            Self::BatchFailed { .. } => 500,
            Self::InvalidContinuation => 400,
        }
    }
}

// =============================================================================
// EngineError
// =============================================================================

/// Errors raised by the publishing engine and the subscription layer.
///
/// These are structural/configuration failures only; data-plane faults are
/// reported as status codes through the state-update path.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Opening a subscription against the stack failed.
    #[error("Subscription failed for writer '{writer_id}': {message}")]
    SubscriptionFailed {
        /// The writer whose subscription failed.
        writer_id: String,
        /// Failure description.
        message: String,
    },

    /// The subscription stack reported a bad service result.
    #[error("Service call failed: {status}")]
    ServiceFault {
        /// The reported status code.
        status: StatusCode,
    },

    /// The notification type is not supported by the configured sink.
    #[error("Notification type not supported: {message}")]
    NotSupported {
        /// What was rejected.
        message: String,
    },

    /// The writer's group has no live pipeline.
    #[error("Writer group '{group_id}' is not connected")]
    NotConnected {
        /// The disconnected group.
        group_id: String,
    },
}

impl EngineError {
    /// Creates a subscription-failed error.
    pub fn subscription_failed(
        writer_id: impl fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        Self::SubscriptionFailed {
            writer_id: writer_id.to_string(),
            message: message.into(),
        }
    }

    /// Creates a service-fault error.
    pub fn service_fault(status: StatusCode) -> Self {
        Self::ServiceFault { status }
    }

    /// Creates a not-supported error.
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported {
            message: message.into(),
        }
    }
}

// =============================================================================
// SinkError
// =============================================================================

/// Errors raised by a message sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink's queue rejected the message.
    #[error("Sink queue full (capacity {capacity})")]
    QueueFull {
        /// The queue capacity.
        capacity: usize,
    },

    /// The sink is closed.
    #[error("Sink is closed")]
    Closed,

    /// Encoding the network message failed.
    #[error("Encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

// =============================================================================
// Results
// =============================================================================

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_classification() {
        let e = RegistryError::not_found("writer group", "g1");
        assert!(e.is_not_found());
        assert_eq!(e.status_code(), 404);
        assert_eq!(e.error_type(), "not_found");

        let e = RegistryError::out_of_date("dataset writer", "w1");
        assert!(e.is_out_of_date());
        assert_eq!(e.status_code(), 409);
    }

    #[test]
    fn test_root_error_conversion() {
        let e: PulseError = RegistryError::invalid_argument("missing endpoint id").into();
        assert_eq!(e.error_type(), "registry");
        assert_eq!(e.status_code(), 400);
    }

    #[test]
    fn test_engine_error_display() {
        let e = EngineError::subscription_failed("w1", "endpoint unreachable");
        assert!(e.to_string().contains("w1"));

        let e = EngineError::service_fault(StatusCode::BAD_NOT_CONNECTED);
        assert!(e.to_string().contains("BadNotConnected"));
    }
}
