//! Core types for the resource graph.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a resource: `(namespace, type, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Namespace the resource lives in.
    pub namespace: String,
    /// Resource type name.
    pub resource_type: String,
    /// Resource id, unique within `(namespace, type)`.
    pub id: String,
}

impl ResourceKey {
    /// Create a new resource key.
    pub fn new(
        namespace: impl Into<String>,
        resource_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            resource_type: resource_type.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.resource_type, self.id)
    }
}

/// Resource version. Starts at 1 and increases on every spec or phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// Version assigned on creation.
    pub const INITIAL: Self = Self(1);

    /// Raw version number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The version following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase of a resource.
///
/// Matched exhaustively everywhere; adding a phase must break every
/// controller until it handles the new arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// The resource is live.
    Running,
    /// Destruction was requested; waiting for finalizers to drain.
    TearingDown,
}

impl Phase {
    /// String form used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::TearingDown => "tearing down",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource metadata maintained by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    key: ResourceKey,
    version: Version,
    phase: Phase,
    owner: String,
    finalizers: BTreeSet<String>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl Metadata {
    /// Metadata for a freshly created resource.
    pub fn new(key: ResourceKey, owner: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key,
            version: Version::INITIAL,
            phase: Phase::Running,
            owner: owner.into(),
            finalizers: BTreeSet::new(),
            created: now,
            updated: now,
        }
    }

    /// Resource key.
    #[must_use]
    pub const fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Resource namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.key.namespace
    }

    /// Resource type.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.key.resource_type
    }

    /// Resource id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.key.id
    }

    /// Current version.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Name of the controller (or seeding component) that created the resource.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Finalizers currently holding the resource.
    #[must_use]
    pub const fn finalizers(&self) -> &BTreeSet<String> {
        &self.finalizers
    }

    /// Whether `name` currently holds a finalizer.
    #[must_use]
    pub fn has_finalizer(&self, name: &str) -> bool {
        self.finalizers.contains(name)
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created(&self) -> DateTime<Utc> {
        self.created
    }

    /// Last modification timestamp.
    #[must_use]
    pub const fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    pub(crate) fn bump(&mut self) {
        self.version = self.version.next();
        self.updated = Utc::now();
    }

    pub(crate) fn begin_teardown(&mut self) -> bool {
        match self.phase {
            Phase::Running => {
                self.phase = Phase::TearingDown;
                self.bump();
                true
            }
            Phase::TearingDown => false,
        }
    }

    pub(crate) fn insert_finalizer(&mut self, name: &str) -> bool {
        self.finalizers.insert(name.to_string())
    }

    pub(crate) fn drop_finalizer(&mut self, name: &str) -> bool {
        self.finalizers.remove(name)
    }
}

/// A resource: metadata plus an opaque spec payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    metadata: Metadata,
    spec: serde_json::Value,
}

impl Resource {
    /// Assemble a resource.
    #[must_use]
    pub const fn new(metadata: Metadata, spec: serde_json::Value) -> Self {
        Self { metadata, spec }
    }

    /// Resource metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Raw spec payload.
    #[must_use]
    pub const fn spec(&self) -> &serde_json::Value {
        &self.spec
    }

    /// Split into metadata and spec.
    #[must_use]
    pub fn into_parts(self) -> (Metadata, serde_json::Value) {
        (self.metadata, self.spec)
    }

    pub(crate) const fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub(crate) const fn spec_mut(&mut self) -> &mut serde_json::Value {
        &mut self.spec
    }
}
