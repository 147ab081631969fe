//! Writable shadow filesystem backing the read-only etc directory.

use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tracing::debug;

use nodestate_core::{Error, Result};

use crate::command::run_command;

/// Sets security labels on files.
#[async_trait]
pub trait Labeler: Send + Sync {
    /// Apply `label` to `path`. An empty label means "leave as is".
    async fn set_label(&self, path: &Path, label: &str) -> Result<()>;
}

/// Labeler for systems without security labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLabeler;

#[async_trait]
impl Labeler for NoopLabeler {
    async fn set_label(&self, _path: &Path, _label: &str) -> Result<()> {
        Ok(())
    }
}

/// Labeler shelling out to `chcon`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChconLabeler;

#[async_trait]
impl Labeler for ChconLabeler {
    async fn set_label(&self, path: &Path, label: &str) -> Result<()> {
        if label.is_empty() {
            return Ok(());
        }
        let path = path.to_string_lossy();
        run_command("chcon", &[label, path.as_ref()]).await.map(drop)
    }
}

/// What [`AnonFs::write_if_changed`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Contents were (re)written.
    Written,
    /// Contents were already identical; only mode and label were reapplied.
    Unchanged,
}

/// A writable directory whose files are exposed elsewhere through bind mounts.
///
/// All names are relative to the root and may not escape it.
#[derive(Clone)]
pub struct AnonFs {
    root: PathBuf,
    labeler: Arc<dyn Labeler>,
}

impl std::fmt::Debug for AnonFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnonFs").field("root", &self.root).finish_non_exhaustive()
    }
}

impl AnonFs {
    /// Create a filesystem rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, labeler: Arc<dyn Labeler>) -> Self {
        Self {
            root: root.into(),
            labeler,
        }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a relative name under the root.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidPath`] for absolute names, empty names and names with
    /// `..` components.
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Create the file (and its parents) if missing, without touching its contents.
    ///
    /// # Errors
    ///
    /// Directory creation and open failures.
    pub async fn create_empty(&self, name: &str, mode: u32) -> Result<PathBuf> {
        let path = self.path(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::directory_creation_failed(parent, e))?;
        }
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(mode)
            .open(&path)
            .await
            .map_err(|e| Error::file_write_failed(&path, e))?;
        Ok(path)
    }

    /// Write `contents` unless the file already holds exactly those bytes.
    ///
    /// Mode and label are applied in both cases.
    ///
    /// # Errors
    ///
    /// Write, permission and labeling failures.
    pub async fn write_if_changed(
        &self,
        name: &str,
        contents: &[u8],
        mode: u32,
        label: &str,
    ) -> Result<WriteOutcome> {
        let path = self.path(name)?;

        let outcome = match fs::read(&path).await {
            Ok(existing) if existing == contents => WriteOutcome::Unchanged,
            _ => {
                fs::write(&path, contents)
                    .await
                    .map_err(|e| Error::file_write_failed(&path, e))?;
                WriteOutcome::Written
            }
        };

        fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(|e| Error::file_write_failed(&path, e))?;
        self.labeler.set_label(&path, label).await?;

        debug!(path = %path.display(), ?outcome, "File synced");
        Ok(outcome)
    }

    /// Remove a file. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Removal failures other than not-found.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let path = self.path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::file_remove_failed(&path, e)),
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    let path = Path::new(name);
    if name.is_empty() {
        return Err(Error::invalid_path(path, "empty name"));
    }
    if path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        Ok(())
    } else {
        Err(Error::invalid_path(path, "must be relative without '..'"))
    }
}
