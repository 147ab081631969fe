//! Change notifications emitted by the store.

use serde::{Deserialize, Serialize};

use crate::types::{ResourceKey, Version};

/// What happened to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The resource was created.
    Created,
    /// The spec changed.
    Updated,
    /// The resource moved to the tearing-down phase.
    TearingDown,
    /// A finalizer was added or removed.
    FinalizersChanged,
    /// The resource was physically removed.
    Destroyed,
}

impl ChangeKind {
    /// Event type string used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::TearingDown => "tearing_down",
            Self::FinalizersChanged => "finalizers_changed",
            Self::Destroyed => "destroyed",
        }
    }
}

/// Notification that a resource changed.
///
/// Notifications may be coalesced or dropped under load; consumers must
/// re-read the store rather than apply the event as a delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEvent {
    /// Kind of change.
    pub kind: ChangeKind,
    /// Affected resource.
    pub key: ResourceKey,
    /// Resource version after the change.
    pub version: Version,
}

impl ResourceEvent {
    /// Create a new event.
    #[must_use]
    pub const fn new(kind: ChangeKind, key: ResourceKey, version: Version) -> Self {
        Self { kind, key, version }
    }
}
