//! Bind mounts.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use nodestate_core::{Error, Result};

use crate::command::run_command;

/// Messages `umount` prints when there is nothing to unmount.
const NOT_MOUNTED_MARKERS: [&str; 3] = ["not mounted", "no mount point", "No such file or directory"];

/// Establishes and removes read-only bind mounts.
#[async_trait]
pub trait BindMounter: Send + Sync {
    /// Expose `source` read-only at `target`.
    async fn bind_mount_readonly(&self, source: &Path, target: &Path) -> Result<()>;

    /// Remove the mount at `target`. Unmounting something not mounted succeeds.
    async fn unmount(&self, target: &Path) -> Result<()>;
}

/// Bind mounts through the `mount` and `umount` programs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMounter;

#[async_trait]
impl BindMounter for SystemMounter {
    async fn bind_mount_readonly(&self, source: &Path, target: &Path) -> Result<()> {
        let source = source.to_string_lossy();
        let target_str = target.to_string_lossy();

        run_command("mount", &["--bind", source.as_ref(), target_str.as_ref()]).await?;

        // A bind mount only becomes read-only through a remount.
        if let Err(e) = run_command("mount", &["-o", "remount,bind,ro", target_str.as_ref()]).await {
            self.unmount(target).await?;
            return Err(e);
        }

        debug!(source = %source, target = %target_str, "Bind mount established");
        Ok(())
    }

    async fn unmount(&self, target: &Path) -> Result<()> {
        let target = target.to_string_lossy();
        match run_command("umount", &[target.as_ref()]).await {
            Ok(_) => {
                debug!(target = %target, "Unmounted");
                Ok(())
            }
            Err(Error::CommandFailed { reason, .. })
                if NOT_MOUNTED_MARKERS.iter().any(|m| reason.contains(m)) =>
            {
                debug!(target = %target, "Nothing mounted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
