//! Controller runtime for nodestate.
//!
//! This crate turns a set of [`Controller`] implementations into a running
//! system. Each controller gets its own task; the [`Engine`] restarts a
//! failed `run` after an escalating backoff and stops it when the shared
//! [`Shutdown`] signal fires.
//!
//! Controllers are written against three groups of helpers:
//!
//! - [`convergence`]: the top-of-pass wait and orphan cleanup over a
//!   [`TouchedSet`]
//! - [`finalizer`]: the add-before-apply / undo-before-release handshake
//! - [`sync`]: temporarily narrowing inputs to wait on another controller's
//!   output

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod backoff;
pub mod controller;
pub mod convergence;
pub mod engine;
pub mod error;
pub mod finalizer;
pub mod runtime;
pub mod shutdown;
pub mod sync;

pub use backoff::{BackoffConfig, BackoffRegistry, calculate_backoff};
pub use controller::{Controller, Input, InputKind, Output, OutputKind};
pub use convergence::{Secondary, TouchedSet, Wake, cleanup_orphans, wait_for_wake};
pub use engine::{Engine, EngineConfig};
pub use error::{Error, Result};
pub use finalizer::{FinalizerState, ensure_finalizer, release_after};
pub use runtime::Runtime;
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use sync::wait_for_condition;
