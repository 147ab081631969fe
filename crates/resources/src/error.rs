//! Error types for the resources crate.

use thiserror::Error;

use crate::types::{Phase, ResourceKey};

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Store error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The resource does not exist (yet).
    #[error("resource '{key}' not found")]
    NotFound { key: ResourceKey },

    /// A write or destroy came from a controller that does not own the resource.
    #[error("resource '{key}' is owned by '{owner}', refusing change from '{requested_by}'")]
    OwnerConflict {
        key: ResourceKey,
        owner: String,
        requested_by: String,
    },

    /// The operation is not allowed in the resource's current phase.
    #[error("resource '{key}' is {phase}: cannot {operation}")]
    PhaseConflict {
        key: ResourceKey,
        phase: Phase,
        operation: String,
    },

    /// Destroy refused while finalizers remain.
    #[error("resource '{key}' still has finalizers {finalizers:?}")]
    FinalizersPending {
        key: ResourceKey,
        finalizers: Vec<String>,
    },

    /// The stored resource does not have the requested type.
    #[error("resource '{key}' has type '{actual}', expected '{expected}'")]
    TypeMismatch {
        key: ResourceKey,
        expected: String,
        actual: String,
    },

    /// Spec (de)serialization failed.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl Error {
    /// Create a not found error.
    pub fn not_found(key: &ResourceKey) -> Self {
        Self::NotFound { key: key.clone() }
    }

    /// Create an owner conflict error.
    pub fn owner_conflict(
        key: &ResourceKey,
        owner: impl Into<String>,
        requested_by: impl Into<String>,
    ) -> Self {
        Self::OwnerConflict {
            key: key.clone(),
            owner: owner.into(),
            requested_by: requested_by.into(),
        }
    }

    /// Create a phase conflict error.
    pub fn phase_conflict(key: &ResourceKey, phase: Phase, operation: impl Into<String>) -> Self {
        Self::PhaseConflict {
            key: key.clone(),
            phase,
            operation: operation.into(),
        }
    }

    /// Create a finalizers pending error.
    pub fn finalizers_pending(key: &ResourceKey, finalizers: Vec<String>) -> Self {
        Self::FinalizersPending {
            key: key.clone(),
            finalizers,
        }
    }

    /// Create a type mismatch error.
    pub fn type_mismatch(
        key: &ResourceKey,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            key: key.clone(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl ToString) -> Self {
        Self::Serialization {
            reason: reason.to_string(),
        }
    }

    /// Whether this error only means "the resource does not exist yet".
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
