//! Mirrors affiliates from an external discovery registry.
//!
//! Affiliates are written to the raw cluster namespace under
//! `k8s/<node id>`. The output type is Shared: other registries write their
//! own id prefixes, and cleanup only ever touches ids this controller owns.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use nodestate_runtime::{
    Controller, Error, Input, Output, Result, Runtime, Secondary, Shutdown, TouchedSet,
    cleanup_orphans, wait_for_wake,
};

use crate::condition::FileExists;
use crate::registry::{Closer, Registry, RegistryConnector};
use crate::resources::{AffiliateSpec, DiscoveryConfig, Nodename};

/// Controller name, also the owner of every affiliate it writes.
pub const NAME: &str = "cluster.RegistryPullController";

/// Id prefix of affiliates pulled by this controller.
pub const ID_PREFIX: &str = "k8s/";

/// Pulls the list of affiliates from a registry.
pub struct RegistryPullController {
    connector: Arc<dyn RegistryConnector>,
    kubeconfig: FileExists,
}

/// Outcome of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Inputs missing or discovery disabled.
    Skipped,
    /// Affiliates synced.
    Synced,
}

/// Handles built lazily inside one `run`. Dropping it closes the watch and
/// releases the client, whichever way `run` exits.
///
/// Once built the handles are kept for the rest of the `run`, also across
/// discovery being disabled and enabled again.
#[derive(Default)]
struct Session {
    registry: Option<Arc<dyn Registry>>,
    watch: Option<Closer>,
}

impl RegistryPullController {
    /// Create a controller that connects through `connector` once `kubeconfig` exists.
    pub fn new(connector: Arc<dyn RegistryConnector>, kubeconfig: impl Into<PathBuf>) -> Self {
        Self {
            connector,
            kubeconfig: FileExists::new(kubeconfig),
        }
    }

    /// Replace the credential wait.
    #[must_use]
    pub fn with_kubeconfig_condition(mut self, condition: FileExists) -> Self {
        self.kubeconfig = condition;
        self
    }

    async fn reconcile(
        &self,
        shutdown: &Shutdown,
        runtime: &Runtime,
        session: &mut Session,
        secondary: &mut Secondary,
    ) -> Result<Pass> {
        let config = match runtime.get_typed::<DiscoveryConfig>(DiscoveryConfig::ID).await {
            Ok(config) => config.into_spec(),
            Err(e) if e.is_not_found() => return Ok(Pass::Skipped),
            Err(e) => return Err(e),
        };

        if !config.registry_kubernetes_enabled {
            let removed = cleanup_orphans::<AffiliateSpec>(runtime, &TouchedSet::new()).await?;
            if removed > 0 {
                info!(removed, "Discovery disabled, affiliates removed");
            }
            return Ok(Pass::Skipped);
        }

        self.kubeconfig.wait(shutdown).await?;

        let nodename = match runtime.get_typed::<Nodename>(Nodename::ID).await {
            Ok(nodename) => nodename.into_spec().nodename,
            Err(e) if e.is_not_found() => return Ok(Pass::Skipped),
            Err(e) => return Err(e),
        };

        let registry = if let Some(registry) = &session.registry {
            Arc::clone(registry)
        } else {
            let registry = self.connector.connect().await?;
            debug!("Registry client built");
            session.registry = Some(Arc::clone(&registry));
            registry
        };

        if session.watch.is_none() {
            let watch = registry.watch().await?;
            *secondary = Secondary::new(watch.notify);
            session.watch = Some(watch.closer);
        }

        let affiliates = registry.list(&nodename).await?;

        let mut touched = TouchedSet::new();
        for affiliate in affiliates {
            let id = format!("{ID_PREFIX}{}", affiliate.node_id);
            runtime
                .modify::<AffiliateSpec, _>(&id, |spec| *spec = affiliate)
                .await?;
            touched.insert(id);
        }

        let removed = cleanup_orphans::<AffiliateSpec>(runtime, &touched).await?;
        debug!(affiliates = touched.len(), removed, "Affiliates synced");
        Ok(Pass::Synced)
    }
}

#[async_trait]
impl Controller for RegistryPullController {
    fn name(&self) -> &str {
        NAME
    }

    fn inputs(&self) -> Vec<Input> {
        vec![
            Input::weak::<DiscoveryConfig>().with_id(DiscoveryConfig::ID),
            Input::weak::<Nodename>().with_id(Nodename::ID),
        ]
    }

    fn outputs(&self) -> Vec<Output> {
        vec![Output::shared::<AffiliateSpec>()]
    }

    async fn run(&mut self, shutdown: Shutdown, runtime: &mut Runtime) -> Result<()> {
        let mut session = Session::default();
        let mut secondary = Secondary::none();

        while wait_for_wake(&shutdown, runtime, &mut secondary).await.is_some() {
            match self
                .reconcile(&shutdown, runtime, &mut session, &mut secondary)
                .await
            {
                Ok(Pass::Synced) => runtime.reset_restart_backoff(),
                Ok(Pass::Skipped) => {}
                Err(Error::Cancelled) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
