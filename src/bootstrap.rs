//! Seeding desired state and wiring the controllers.
//!
//! The daemon has no API surface: desired resources come from the
//! configuration file and are written once, before the engine starts, by a
//! runtime named [`NAME`] that owns them.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use nodestate_controllers::{
    AnonFs, BindMounter, DirectoryConnector, DiscoveryConfig, EtcFileController,
    EtcFileSpec, Labeler, Nodename, RegistryPullController,
};
use nodestate_resources::ResourceStore;
use nodestate_runtime::{BackoffRegistry, Engine, Output, Result, Runtime};

use crate::config::Config;

/// Owner of every seeded resource.
pub const NAME: &str = "bootstrap";

const HOSTNAME_PATH: &str = "/proc/sys/kernel/hostname";
const FALLBACK_NODENAME: &str = "localhost";

/// Runtime allowed to write the seeded resource types.
pub fn seed_runtime(store: Arc<dyn ResourceStore>) -> Runtime {
    Runtime::new(
        NAME,
        store,
        vec![],
        vec![
            Output::exclusive::<EtcFileSpec>(),
            Output::exclusive::<DiscoveryConfig>(),
            Output::exclusive::<Nodename>(),
        ],
        BackoffRegistry::default(),
    )
}

/// Write the desired state described by `config`.
///
/// # Errors
///
/// Returns the first store error.
pub async fn seed(runtime: &Runtime, config: &Config, nodename: &str) -> Result<()> {
    for file in &config.files {
        let spec = EtcFileSpec::new(file.contents.as_bytes(), file.mode);
        let spec = match &file.label {
            Some(label) => spec.with_selinux_label(label.clone()),
            None => spec,
        };
        runtime
            .modify::<EtcFileSpec, _>(&file.name, move |s| *s = spec)
            .await?;
    }

    let enabled = config.discovery.enabled;
    runtime
        .modify::<DiscoveryConfig, _>(DiscoveryConfig::ID, move |c| {
            c.registry_kubernetes_enabled = enabled;
        })
        .await?;

    let nodename = nodename.to_string();
    runtime
        .modify::<Nodename, _>(Nodename::ID, move |n| n.nodename = nodename)
        .await?;

    info!(
        files = config.files.len(),
        discovery = enabled,
        "Desired state seeded"
    );
    Ok(())
}

/// Configured nodename, else the kernel hostname.
pub fn resolve_nodename(config: &Config) -> String {
    if let Some(nodename) = &config.discovery.nodename {
        return nodename.clone();
    }
    hostname_from(Path::new(HOSTNAME_PATH))
}

fn hostname_from(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
        Ok(_) => FALLBACK_NODENAME.to_string(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read hostname, using fallback");
            FALLBACK_NODENAME.to_string()
        }
    }
}

/// Register the etc file and registry pull controllers.
///
/// # Errors
///
/// Returns a registration error from the engine.
pub fn build_engine(
    store: Arc<dyn ResourceStore>,
    config: &Config,
    mounter: Arc<dyn BindMounter>,
    labeler: Arc<dyn Labeler>,
) -> Result<Engine> {
    let fs = AnonFs::new(&config.paths.shadow_root, labeler);
    let etc_files = EtcFileController::new(&config.paths.etc_dir, fs, mounter);

    let connector = Arc::new(DirectoryConnector::new(&config.discovery.registry_dir));
    let registry_pull = RegistryPullController::new(connector, &config.discovery.kubeconfig);

    Engine::new(store, config.engine.engine_config())
        .with_controller(Box::new(etc_files))?
        .with_controller(Box::new(registry_pull))
}
