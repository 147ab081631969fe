//! Error types for the reference controllers and their collaborators.

use thiserror::Error;

/// Result type alias for controller collaborators.
pub type Result<T> = std::result::Result<T, Error>;

/// Controller collaborator errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem or command failure.
    #[error(transparent)]
    Core(#[from] nodestate_core::Error),

    /// Partition label outside the known set.
    #[error("unknown partition label '{label}'")]
    UnknownPartitionLabel { label: String },

    /// Partition label that cannot be used when booting a UKI.
    #[error("partition '{label}' is not supported with UKI")]
    UnsupportedWithUki { label: String },

    /// Discovery registry failure.
    #[error("registry error: {reason}")]
    Registry { reason: String },
}

impl Error {
    /// Create an unknown partition label error.
    pub fn unknown_partition_label(label: impl Into<String>) -> Self {
        Self::UnknownPartitionLabel {
            label: label.into(),
        }
    }

    /// Create a registry error.
    pub fn registry(reason: impl ToString) -> Self {
        Self::Registry {
            reason: reason.to_string(),
        }
    }
}

impl From<Error> for nodestate_runtime::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(e) => Self::Core(e),
            Error::Registry { reason } => Self::side_effect("registry", reason),
            other => Self::invalid_config(other.to_string()),
        }
    }
}
