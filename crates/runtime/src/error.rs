//! Error types for the controller runtime.

use thiserror::Error;

use nodestate_resources::ResourceKey;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Runtime error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Error returned by the resource store.
    #[error(transparent)]
    Store(#[from] nodestate_resources::Error),

    /// Local I/O or configuration error.
    #[error(transparent)]
    Core(#[from] nodestate_core::Error),

    /// The cancellation signal fired while waiting.
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid static configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Two controllers registered under one name.
    #[error("controller '{name}' is already registered")]
    DuplicateController { name: String },

    /// Two controllers claim the same Exclusive output type.
    #[error("output type '{resource_type}' is exclusive to '{first}' but also claimed by '{second}'")]
    ExclusiveOutputConflict {
        resource_type: String,
        first: String,
        second: String,
    },

    /// Strong inputs form a cycle.
    #[error("strong input dependencies form a cycle through controller '{controller}'")]
    StrongDependencyCycle { controller: String },

    /// A controller wrote a type it did not declare as an output.
    #[error("controller '{controller}' did not declare output type '{resource_type}'")]
    UndeclaredOutput {
        controller: String,
        resource_type: String,
    },

    /// A controller read a resource outside its inputs and outputs.
    #[error("controller '{controller}' cannot read '{key}': not an input or output")]
    UnreadableResource { controller: String, key: ResourceKey },

    /// An OS or registry side effect failed.
    #[error("{operation} failed: {reason}")]
    SideEffect { operation: String, reason: String },

    /// A controller's run panicked.
    #[error("controller '{controller}' panicked: {reason}")]
    ControllerPanicked { controller: String, reason: String },
}

impl Error {
    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a side effect error.
    pub fn side_effect(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::SideEffect {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an undeclared output error.
    pub fn undeclared_output(controller: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self::UndeclaredOutput {
            controller: controller.into(),
            resource_type: resource_type.into(),
        }
    }

    /// Whether this error only means "the resource does not exist yet".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}
