//! External discovery registries that affiliates are pulled from.

mod directory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::resources::AffiliateSpec;

pub use directory::{DirectoryConnector, DirectoryRegistry};

/// Tears down a registry watch. Runs at most once: on [`close`](Self::close) or on drop.
pub struct Closer(Option<Box<dyn FnOnce() + Send>>);

impl Closer {
    pub fn new(close: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(close)))
    }

    /// Close now.
    pub fn close(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(close) = self.0.take() {
            close();
        }
    }
}

impl Drop for Closer {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Closer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Closer").field(&self.0.is_some()).finish()
    }
}

/// A change feed from a registry plus the handle that tears it down.
#[derive(Debug)]
pub struct RegistryWatch {
    /// Fires (coalesced) whenever the registry contents may have changed.
    pub notify: mpsc::Receiver<()>,
    pub closer: Closer,
}

impl RegistryWatch {
    /// Create a watch from a channel and its close function.
    pub fn new(notify: mpsc::Receiver<()>, close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            notify,
            closer: Closer::new(close),
        }
    }
}

/// A source of cluster affiliates.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Every affiliate except the local node `nodename`.
    async fn list(&self, nodename: &str) -> Result<Vec<AffiliateSpec>>;

    /// Subscribe to changes.
    async fn watch(&self) -> Result<RegistryWatch>;
}

/// Builds a registry client on first use.
#[async_trait]
pub trait RegistryConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Registry>>;
}
