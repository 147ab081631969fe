//! Core error types for nodestate operations.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for filesystem, process and configuration operations.
#[derive(Debug, Error)]
pub enum Error {
    // I/O errors
    #[error("failed to read file '{path}': {reason}")]
    FileReadFailed { path: PathBuf, reason: String },

    #[error("failed to write file '{path}': {reason}")]
    FileWriteFailed { path: PathBuf, reason: String },

    #[error("failed to remove '{path}': {reason}")]
    FileRemoveFailed { path: PathBuf, reason: String },

    #[error("failed to create directory '{path}': {reason}")]
    DirectoryCreationFailed { path: PathBuf, reason: String },

    #[error("path '{path}' escapes its root: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    // Process errors
    #[error("command '{command}' failed: {reason}")]
    CommandFailed { command: String, reason: String },

    // Parsing errors
    #[error("JSON parse error: {reason}")]
    JsonParseFailed { reason: String },

    #[error("TOML parse error: {reason}")]
    TomlParseFailed { reason: String },

    // Configuration errors
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Generic I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a file read error.
    pub fn file_read_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a file write error.
    pub fn file_write_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a file removal error.
    pub fn file_remove_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::FileRemoveFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a directory creation error.
    pub fn directory_creation_failed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::DirectoryCreationFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid path error.
    pub fn invalid_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a command failure error.
    pub fn command_failed(command: impl Into<String>, reason: impl ToString) -> Self {
        Self::CommandFailed {
            command: command.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse_failed(reason: impl ToString) -> Self {
        Self::JsonParseFailed {
            reason: reason.to_string(),
        }
    }

    /// Create a TOML parse error.
    pub fn toml_parse_failed(reason: impl ToString) -> Self {
        Self::TomlParseFailed {
            reason: reason.to_string(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
