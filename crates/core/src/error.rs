//! Domain error model.
//!
//! Domain errors represent **deterministic business failures** — malformed
//! input, invariant violations, identity failures. Infrastructure concerns
//! (storage, timeouts, lock races) live in `uprl-infra`'s error types; both
//! sides share [`ErrorKind`] so DLQ entries classify failures uniformly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Classification of a pipeline failure, persisted on DLQ entries.
///
/// No kind is fatal to the process; the disposition per kind is decided by
/// the ingestion pipeline (retry, skip, or dead-letter).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Missing required field, bad enum value, malformed timestamp, wrong type.
    Validation,
    /// Component identity could not be built (non-scalar dimension, missing type).
    Identity,
    /// Concurrent write lost the version race after retries.
    VersionConflict,
    /// Underlying store unavailable or constraint violation.
    Storage,
    /// Inconsistent rows observed on the read side.
    Projection,
    /// `event_id` already present in the target table.
    DuplicateEvent,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Identity => "IDENTITY",
            ErrorKind::VersionConflict => "VERSION_CONFLICT",
            ErrorKind::Storage => "STORAGE",
            ErrorKind::Projection => "PROJECTION",
            ErrorKind::DuplicateEvent => "DUPLICATE_EVENT",
        }
    }
}

impl ErrorKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "VALIDATION" => Some(ErrorKind::Validation),
            "IDENTITY" => Some(ErrorKind::Identity),
            "VERSION_CONFLICT" => Some(ErrorKind::VersionConflict),
            "STORAGE" => Some(ErrorKind::Storage),
            "PROJECTION" => Some(ErrorKind::Projection),
            "DUPLICATE_EVENT" => Some(ErrorKind::DuplicateEvent),
            _ => None,
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-level error (business logic failures).
///
/// Kept focused on deterministic failures so callers can compare and assert
/// on them; errors are `Clone + PartialEq` for exactly that reason.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) | DomainError::InvalidId(_) => ErrorKind::Validation,
            DomainError::InvariantViolation(_) => ErrorKind::Validation,
        }
    }
}
