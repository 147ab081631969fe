//! Result type definition and extension traits.
//!
//! Provides combinators for Result types so that call sites can log and
//! discard non-fatal failures without unwrap/expect/panic.

use crate::error::Error;

/// The standard Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing safe combinators for any displayable error.
pub trait ResultExt<T, E> {
    /// Convert a Result to an Option, logging the error at `warn` if present.
    fn into_option_logged(self, context: &str) -> Option<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T, E> for std::result::Result<T, E> {
    fn into_option_logged(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "{context}");
                None
            }
        }
    }
}
