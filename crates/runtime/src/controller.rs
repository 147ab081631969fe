//! The contract every controller implements.

use async_trait::async_trait;

use nodestate_resources::{ResourceKey, ResourceSpec};

use crate::error::Result;
use crate::runtime::Runtime;
use crate::shutdown::Shutdown;

/// How an input dependency behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    /// Triggers reconciliation only.
    Weak,
    /// Triggers reconciliation and orders startup after the producer.
    Strong,
}

/// A watched input: every resource of a type, or a single id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Input {
    pub namespace: String,
    pub resource_type: String,
    pub id: Option<String>,
    pub kind: InputKind,
}

impl Input {
    /// Watch every resource of a type.
    pub fn new(
        namespace: impl Into<String>,
        resource_type: impl Into<String>,
        kind: InputKind,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            resource_type: resource_type.into(),
            id: None,
            kind,
        }
    }

    /// Weak input over a typed spec.
    #[must_use]
    pub fn weak<T: ResourceSpec>() -> Self {
        Self::new(T::NAMESPACE, T::TYPE, InputKind::Weak)
    }

    /// Strong input over a typed spec.
    #[must_use]
    pub fn strong<T: ResourceSpec>() -> Self {
        Self::new(T::NAMESPACE, T::TYPE, InputKind::Strong)
    }

    /// Restrict the input to one id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Whether a change to `key` is covered by this input.
    #[must_use]
    pub fn matches(&self, key: &ResourceKey) -> bool {
        self.namespace == key.namespace
            && self.resource_type == key.resource_type
            && self.id.as_ref().is_none_or(|id| *id == key.id)
    }
}

/// Ownership discipline over an output type's id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Sole writer of every id of the type.
    Exclusive,
    /// Writes a disjoint subset of ids.
    Shared,
}

/// A declared output type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Output {
    pub resource_type: String,
    pub kind: OutputKind,
}

impl Output {
    /// Exclusive output over a typed spec.
    #[must_use]
    pub fn exclusive<T: ResourceSpec>() -> Self {
        Self {
            resource_type: T::TYPE.to_string(),
            kind: OutputKind::Exclusive,
        }
    }

    /// Shared output over a typed spec.
    #[must_use]
    pub fn shared<T: ResourceSpec>() -> Self {
        Self {
            resource_type: T::TYPE.to_string(),
            kind: OutputKind::Shared,
        }
    }
}

/// A long-running reconciler of resources into side effects.
///
/// `run` blocks until `shutdown` fires (returning `Ok(())`) or a pass fails
/// (returning the error). The engine calls `run` again after a backoff, so
/// all state that must survive a restart lives on `self`.
#[async_trait]
pub trait Controller: Send {
    /// Stable identity, used as finalizer tag and backoff key.
    fn name(&self) -> &str;

    /// Declared input dependencies.
    fn inputs(&self) -> Vec<Input>;

    /// Declared output ownership.
    fn outputs(&self) -> Vec<Output>;

    /// Reconcile until cancelled.
    async fn run(&mut self, shutdown: Shutdown, runtime: &mut Runtime) -> Result<()>;
}
