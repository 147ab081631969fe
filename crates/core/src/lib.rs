//! # nodestate-core
//!
//! Error and result primitives shared by every nodestate crate.
//!
//! All errors are explicit, typed, and recoverable. Filesystem and
//! process collaborators report through [`Error`]; higher layers wrap it.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod result;

pub use error::Error;
pub use result::{Result, ResultExt};
