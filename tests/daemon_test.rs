//! The daemon wiring end to end: seed, register, converge, stop.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use nodestate::bootstrap;
use nodestate::config::{Config, FileEntry};
use nodestate_controllers::{
    AffiliateSpec, BindMounter, DevicesStatus, EtcFileSpec, EtcFileStatus, Nodename, NoopLabeler,
};
use nodestate_resources::{InMemoryStore, ResourceKey, ResourceSpec, ResourceStore};
use nodestate_runtime::Shutdown;

struct NoopMounter;

#[async_trait]
impl BindMounter for NoopMounter {
    async fn bind_mount_readonly(&self, _source: &Path, _target: &Path) -> nodestate_core::Result<()> {
        Ok(())
    }

    async fn unmount(&self, _target: &Path) -> nodestate_core::Result<()> {
        Ok(())
    }
}

async fn wait_until_listed(store: &InMemoryStore, namespace: &str, resource_type: &str, count: usize) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if store.list(namespace, resource_type).await.unwrap().len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {count} {resource_type}");
}

fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.paths.etc_dir = root.join("etc");
    config.paths.shadow_root = root.join("shadow");
    config.discovery.registry_dir = root.join("registry");
    config.discovery.kubeconfig = root.join("kubeconfig");
    config.discovery.nodename = Some("me".to_string());
    config.files = vec![FileEntry {
        name: "hosts".to_string(),
        contents: "127.0.0.1 localhost\n".to_string(),
        mode: 0o644,
        label: None,
    }];
    config
}

/// GIVEN a configuration with one etc file and discovery enabled
/// WHEN the daemon wiring runs until shutdown
/// THEN the file is materialised, its status recorded, and peers mirrored
#[tokio::test]
async fn should_converge_seeded_state() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.discovery.enabled = true;
    std::fs::write(&config.discovery.kubeconfig, "apiVersion: v1\n").unwrap();
    std::fs::create_dir_all(&config.discovery.registry_dir).unwrap();
    let peer = AffiliateSpec {
        node_id: "n1".to_string(),
        nodename: "peer".to_string(),
        ..AffiliateSpec::default()
    };
    std::fs::write(
        config.discovery.registry_dir.join("n1.json"),
        serde_json::to_vec(&peer).unwrap(),
    )
    .unwrap();

    let store = InMemoryStore::new_arc();
    let seeder = bootstrap::seed_runtime(Arc::clone(&store) as Arc<dyn ResourceStore>);
    bootstrap::seed(&seeder, &config, "me").await.unwrap();
    let engine = bootstrap::build_engine(
        Arc::clone(&store) as Arc<dyn ResourceStore>,
        &config,
        Arc::new(NoopMounter),
        Arc::new(NoopLabeler),
    )
    .unwrap();

    let (trigger, shutdown) = Shutdown::channel();
    let handle = tokio::spawn(engine.run(shutdown));

    wait_until_listed(&store, EtcFileStatus::NAMESPACE, EtcFileStatus::TYPE, 1).await;
    wait_until_listed(&store, AffiliateSpec::NAMESPACE, AffiliateSpec::TYPE, 1).await;

    let shadow = std::fs::read_to_string(dir.path().join("shadow/hosts")).unwrap();
    assert_eq!(shadow, "127.0.0.1 localhost\n");
    let affiliate = store
        .get(&ResourceKey::new(
            AffiliateSpec::NAMESPACE,
            AffiliateSpec::TYPE,
            "k8s/n1",
        ))
        .await;
    assert!(affiliate.is_ok());

    trigger.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn should_register_both_controllers() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let engine = bootstrap::build_engine(
        InMemoryStore::new_arc() as Arc<dyn ResourceStore>,
        &config,
        Arc::new(NoopMounter),
        Arc::new(NoopLabeler),
    )
    .unwrap();

    let mut names: Vec<&str> = engine.controller_names().collect();
    names.sort_unstable();
    assert_eq!(
        names,
        vec!["cluster.RegistryPullController", "files.EtcFileController"]
    );
}

/// GIVEN a configuration with one file and discovery disabled
/// WHEN the desired state is seeded
/// THEN only resources with a registered consumer are written
#[tokio::test]
async fn should_seed_only_consumed_resources() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let store = InMemoryStore::new_arc();
    let seeder = bootstrap::seed_runtime(Arc::clone(&store) as Arc<dyn ResourceStore>);

    bootstrap::seed(&seeder, &config, "me").await.unwrap();

    let files = store
        .list(EtcFileSpec::NAMESPACE, EtcFileSpec::TYPE)
        .await
        .unwrap();
    assert_eq!(files.len(), 1);
    assert!(files.iter().all(|r| r.metadata().owner() == bootstrap::NAME));
    let nodename = store
        .get(&ResourceKey::new(Nodename::NAMESPACE, Nodename::TYPE, Nodename::ID))
        .await
        .unwrap();
    assert_eq!(nodename.spec()["nodename"], "me");
    let devices = store
        .list(DevicesStatus::NAMESPACE, DevicesStatus::TYPE)
        .await
        .unwrap();
    assert!(devices.is_empty());
}
