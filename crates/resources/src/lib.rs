//! Versioned resource graph primitives.
//!
//! Every mutable node fact is a [`Resource`] identified by
//! `(namespace, type, id)`. Resources carry a monotonically increasing
//! [`Version`], a [`Phase`], an owner, a finalizer set and an opaque JSON
//! spec. Controllers never talk to storage directly; they go through the
//! [`ResourceStore`] trait.
//!
//! - **Store**: get / list / modify / teardown / destroy plus finalizer
//!   mutation
//! - **Watch**: every change is broadcast as a [`ResourceEvent`]; consumers
//!   must re-list rather than trust the event as a delta
//! - **Typed specs**: [`ResourceSpec`] maps a Rust type onto a resource type
//!
//! # Example
//!
//! ```ignore
//! use nodestate_resources::{InMemoryStore, ResourceKey, ResourceStore};
//!
//! let store = InMemoryStore::new_arc();
//! let mut watch = store.watch();
//! let key = ResourceKey::new("files", "EtcFileSpecs.files", "hosts");
//! store
//!     .modify(&key, "config", Box::new(|spec| {
//!         *spec = serde_json::json!({ "mode": 420 });
//!         Ok(())
//!     }))
//!     .await?;
//! let event = watch.recv().await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod error;
pub mod event;
pub mod store;
pub mod typed;
pub mod types;

// Re-export main types
pub use error::{Error, Result};
pub use event::{ChangeKind, ResourceEvent};
pub use store::{InMemoryStore, Mutation, ResourceStore, TracingStore};
pub use typed::{ResourceSpec, Typed};
pub use types::{Metadata, Phase, Resource, ResourceKey, Version};
