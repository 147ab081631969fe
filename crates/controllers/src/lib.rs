//! Reference controllers for nodestate.
//!
//! - [`EtcFileController`]: materialises desired `/etc` files as writable
//!   shadow files bind-mounted read-only over the real path
//! - [`RegistryPullController`]: mirrors affiliates from an external
//!   discovery registry into the raw cluster namespace
//!
//! Both are written against narrow OS collaborators ([`BindMounter`],
//! [`Labeler`], [`Registry`]) so they can be driven by fakes in tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod command;
pub mod condition;
pub mod devices;
pub mod error;
pub mod etc_file;
pub mod fs;
pub mod mount;
pub mod partition;
pub mod registry;
pub mod registry_pull;
pub mod resources;

pub use condition::FileExists;
pub use devices::wait_for_devices_ready;
pub use error::{Error, Result};
pub use etc_file::EtcFileController;
pub use fs::{AnonFs, ChconLabeler, Labeler, NoopLabeler, WriteOutcome};
pub use mount::{BindMounter, SystemMounter};
pub use partition::{FormatOptions, PartitionLabel, PartitionOptions, PartitionType, SizeClass};
pub use registry::{
    Closer, DirectoryConnector, DirectoryRegistry, Registry, RegistryConnector, RegistryWatch,
};
pub use registry_pull::RegistryPullController;
pub use resources::{
    AffiliateSpec, DevicesStatus, DiscoveryConfig, EtcFileSpec, EtcFileStatus, Nodename,
};
