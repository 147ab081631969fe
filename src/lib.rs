//! # nodestate
//!
//! Daemon wiring for the nodestate controllers: configuration, CLI and the
//! bootstrap that seeds desired state before the engine runs.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod bootstrap;
pub mod cli;
pub mod config;

pub use config::Config;
