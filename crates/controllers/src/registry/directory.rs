//! Registry backed by a directory of JSON affiliate files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use nodestate_core::{Error as CoreError, ResultExt};

use super::{Registry, RegistryConnector, RegistryWatch};
use crate::error::{Error, Result};
use crate::resources::AffiliateSpec;

/// Affiliates stored as `<dir>/<anything>.json`, one [`AffiliateSpec`] each.
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    dir: PathBuf,
}

impl DirectoryRegistry {
    /// Registry over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the affiliate files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

async fn read_affiliate(path: &Path) -> Result<AffiliateSpec> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| CoreError::file_read_failed(path, e))?;
    serde_json::from_slice(&raw).map_err(|e| CoreError::json_parse_failed(format!("{}: {e}", path.display())).into())
}

#[async_trait]
impl Registry for DirectoryRegistry {
    async fn list(&self, nodename: &str) -> Result<Vec<AffiliateSpec>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| CoreError::file_read_failed(&self.dir, e))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CoreError::file_read_failed(&self.dir, e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut affiliates = Vec::with_capacity(paths.len());
        for path in paths {
            // Files may be half-written while the watch fires.
            let Some(affiliate) = read_affiliate(&path)
                .await
                .into_option_logged("Unreadable affiliate skipped")
            else {
                continue;
            };
            if affiliate.nodename == nodename {
                continue;
            }
            if affiliate.node_id.is_empty() {
                warn!(path = %path.display(), "Affiliate without node id ignored");
                continue;
            }
            affiliates.push(affiliate);
        }
        Ok(affiliates)
    }

    async fn watch(&self) -> Result<RegistryWatch> {
        let (tx, rx) = mpsc::channel(1);

        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if res.is_ok() {
                // Full channel means a notification is already pending.
                let _ = tx.try_send(());
            }
        })
        .map_err(|e| Error::registry(format!("failed to create watcher: {e}")))?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::registry(format!("failed to watch {}: {e}", self.dir.display())))?;
        debug!(dir = %self.dir.display(), "Registry watch started");

        let dir = self.dir.clone();
        Ok(RegistryWatch::new(rx, move || {
            drop(watcher);
            debug!(dir = %dir.display(), "Registry watch closed");
        }))
    }
}

/// Connects to a [`DirectoryRegistry`], creating the directory if needed.
#[derive(Debug, Clone)]
pub struct DirectoryConnector {
    dir: PathBuf,
}

impl DirectoryConnector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl RegistryConnector for DirectoryConnector {
    async fn connect(&self) -> Result<Arc<dyn Registry>> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CoreError::directory_creation_failed(&self.dir, e))?;
        Ok(Arc::new(DirectoryRegistry::new(&self.dir)))
    }
}
