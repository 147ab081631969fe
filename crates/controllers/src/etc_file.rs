//! Materialises desired etc files.
//!
//! Every `EtcFileSpec` becomes a file in the writable shadow filesystem,
//! bind-mounted read-only over `<etc>/<id>`, with an `EtcFileStatus`
//! recording the spec version that was applied.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use nodestate_resources::{Metadata, Phase, Typed};
use nodestate_runtime::{
    Controller, Input, Output, Result, Runtime, Secondary, Shutdown, TouchedSet, cleanup_orphans,
    ensure_finalizer, release_after, wait_for_wake,
};

use crate::fs::AnonFs;
use crate::mount::BindMounter;
use crate::resources::{EtcFileSpec, EtcFileStatus};

/// Controller name, also its finalizer tag.
pub const NAME: &str = "files.EtcFileController";

/// Watches `EtcFileSpec`s and creates, updates and removes the files.
pub struct EtcFileController {
    etc_path: PathBuf,
    fs: AnonFs,
    mounter: Arc<dyn BindMounter>,
    /// Names with an established bind mount. Owned by this instance only.
    bind_mounts: BTreeSet<String>,
}

impl EtcFileController {
    /// Create a controller exposing files from `fs` under `etc_path`.
    pub fn new(etc_path: impl Into<PathBuf>, fs: AnonFs, mounter: Arc<dyn BindMounter>) -> Self {
        Self {
            etc_path: etc_path.into(),
            fs,
            mounter,
            bind_mounts: BTreeSet::new(),
        }
    }

    /// Names currently bind-mounted by this instance.
    pub fn bind_mounts(&self) -> impl Iterator<Item = &str> {
        self.bind_mounts.iter().map(String::as_str)
    }

    fn target(&self, name: &str) -> PathBuf {
        self.etc_path.join(name)
    }

    /// Run one convergence pass and return the names that are live.
    ///
    /// # Errors
    ///
    /// Store and side-effect failures; the pass is retried as a whole.
    pub async fn reconcile(&mut self, runtime: &Runtime) -> Result<TouchedSet> {
        let specs: Vec<Typed<EtcFileSpec>> = runtime
            .list_typed::<EtcFileSpec>()
            .await?
            .into_iter()
            .filter(|spec| match self.fs.path(spec.metadata().id()) {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "Skipping etc file with invalid name");
                    false
                }
            })
            .collect();

        for spec in &specs {
            ensure_finalizer(runtime, spec.metadata()).await?;
        }

        let mut touched = TouchedSet::new();
        for spec in &specs {
            let name = spec.metadata().id();
            match spec.metadata().phase() {
                Phase::TearingDown => {
                    release_after(runtime, spec.metadata(), self.remove_file(name)).await?;
                }
                Phase::Running => {
                    self.apply_file(name, spec.spec(), spec.metadata()).await?;
                    let version = spec.metadata().version().to_string();
                    runtime
                        .modify::<EtcFileStatus, _>(name, |status| status.spec_version = version)
                        .await?;
                    touched.insert(name);
                }
            }
        }

        let stale: Vec<String> = self
            .bind_mounts
            .iter()
            .filter(|name| !touched.contains(name.as_str()))
            .cloned()
            .collect();
        for name in stale {
            debug!(file = %name, "Desired etc file vanished");
            self.remove_file(&name).await?;
        }

        let removed = cleanup_orphans::<EtcFileStatus>(runtime, &touched).await?;
        if removed > 0 {
            debug!(removed, "Stale etc file statuses destroyed");
        }
        Ok(touched)
    }

    async fn apply_file(&mut self, name: &str, spec: &EtcFileSpec, metadata: &Metadata) -> Result<()> {
        if !self.bind_mounts.contains(name) {
            let source = self.fs.create_empty(name, spec.mode).await?;
            let target = self.target(name);
            debug!(source = %source.display(), target = %target.display(), "Creating bind mount");
            self.mounter.bind_mount_readonly(&source, &target).await?;
            self.bind_mounts.insert(name.to_string());
        }

        let outcome = self
            .fs
            .write_if_changed(name, &spec.contents, spec.mode, &spec.selinux_label)
            .await?;
        debug!(file = name, version = %metadata.version(), ?outcome, "Etc file applied");
        Ok(())
    }

    async fn remove_file(&mut self, name: &str) -> Result<()> {
        if self.bind_mounts.contains(name) {
            let target = self.target(name);
            debug!(target = %target.display(), "Removing bind mount");
            self.mounter.unmount(&target).await?;
            self.bind_mounts.remove(name);
        }

        self.fs.remove(name).await?;
        info!(file = name, "Etc file removed");
        Ok(())
    }

    /// Path files are exposed under.
    #[must_use]
    pub fn etc_path(&self) -> &Path {
        &self.etc_path
    }
}

#[async_trait]
impl Controller for EtcFileController {
    fn name(&self) -> &str {
        NAME
    }

    fn inputs(&self) -> Vec<Input> {
        vec![Input::strong::<EtcFileSpec>()]
    }

    fn outputs(&self) -> Vec<Output> {
        vec![Output::exclusive::<EtcFileStatus>()]
    }

    async fn run(&mut self, shutdown: Shutdown, runtime: &mut Runtime) -> Result<()> {
        let mut secondary = Secondary::none();
        while wait_for_wake(&shutdown, runtime, &mut secondary).await.is_some() {
            self.reconcile(runtime).await?;
            runtime.reset_restart_backoff();
        }
        Ok(())
    }
}
