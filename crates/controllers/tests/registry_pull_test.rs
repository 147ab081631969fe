//! Tests for the registry pull controller, driven through the engine.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use nodestate_controllers::registry_pull::NAME;
use nodestate_controllers::{
    AffiliateSpec, DiscoveryConfig, FileExists, Nodename, Registry, RegistryConnector,
    RegistryPullController, RegistryWatch,
};
use nodestate_resources::{InMemoryStore, ResourceSpec, ResourceStore};
use nodestate_runtime::{BackoffRegistry, Engine, EngineConfig, Output, Runtime, ShutdownTrigger, shutdown};

#[derive(Default)]
struct FakeRegistry {
    affiliates: Mutex<Vec<AffiliateSpec>>,
    notify: Mutex<Option<mpsc::Sender<()>>>,
    watches: AtomicUsize,
    closed: Arc<AtomicBool>,
}

impl FakeRegistry {
    fn set(&self, affiliates: Vec<AffiliateSpec>) {
        *self.affiliates.lock().unwrap() = affiliates;
        if let Some(tx) = self.notify.lock().unwrap().as_ref() {
            let _ = tx.try_send(());
        }
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn list(&self, nodename: &str) -> nodestate_controllers::Result<Vec<AffiliateSpec>> {
        Ok(self
            .affiliates
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.nodename != nodename)
            .cloned()
            .collect())
    }

    async fn watch(&self) -> nodestate_controllers::Result<RegistryWatch> {
        self.watches.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(1);
        *self.notify.lock().unwrap() = Some(tx);
        let closed = Arc::clone(&self.closed);
        Ok(RegistryWatch::new(rx, move || closed.store(true, Ordering::SeqCst)))
    }
}

struct FakeConnector {
    registry: Arc<FakeRegistry>,
    connects: AtomicUsize,
}

#[async_trait]
impl RegistryConnector for FakeConnector {
    async fn connect(&self) -> nodestate_controllers::Result<Arc<dyn Registry>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.registry) as Arc<dyn Registry>)
    }
}

fn affiliate(node_id: &str, nodename: &str) -> AffiliateSpec {
    AffiliateSpec {
        node_id: node_id.to_string(),
        nodename: nodename.to_string(),
        hostname: nodename.to_string(),
        machine_type: "worker".to_string(),
        addresses: vec!["10.0.0.2".to_string()],
    }
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

struct Harness {
    _dir: tempfile::TempDir,
    store: Arc<InMemoryStore>,
    registry: Arc<FakeRegistry>,
    connector: Arc<FakeConnector>,
    seed: Runtime,
    trigger: ShutdownTrigger,
    engine: tokio::task::JoinHandle<nodestate_runtime::Result<()>>,
}

impl Harness {
    async fn start(kubeconfig_present: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let kubeconfig = dir.path().join("kubeconfig");
        if kubeconfig_present {
            std::fs::write(&kubeconfig, b"apiVersion: v1").unwrap();
        }

        let store = InMemoryStore::new_arc();
        let registry = Arc::new(FakeRegistry::default());
        let connector = Arc::new(FakeConnector {
            registry: Arc::clone(&registry),
            connects: AtomicUsize::new(0),
        });
        let controller = RegistryPullController::new(
            Arc::clone(&connector) as Arc<dyn RegistryConnector>,
            &kubeconfig,
        )
        .with_kubeconfig_condition(FileExists::new(&kubeconfig).with_interval(Duration::from_millis(10)));

        let seed = Runtime::new(
            "seed",
            Arc::clone(&store) as Arc<dyn ResourceStore>,
            vec![],
            vec![Output::exclusive::<DiscoveryConfig>(), Output::exclusive::<Nodename>()],
            BackoffRegistry::default(),
        );
        seed.modify::<Nodename, _>(Nodename::ID, |n| n.nodename = "me".to_string())
            .await
            .unwrap();

        let engine = Engine::new(Arc::clone(&store) as Arc<dyn ResourceStore>, EngineConfig::default())
            .with_controller(Box::new(controller))
            .unwrap();
        let (trigger, shutdown) = shutdown::channel();
        let engine = tokio::spawn(engine.run(shutdown));

        Self {
            _dir: dir,
            store,
            registry,
            connector,
            seed,
            trigger,
            engine,
        }
    }

    async fn set_enabled(&self, enabled: bool) {
        self.seed
            .modify::<DiscoveryConfig, _>(DiscoveryConfig::ID, |c| {
                c.registry_kubernetes_enabled = enabled;
            })
            .await
            .unwrap();
    }

    async fn affiliate_ids(store: &InMemoryStore) -> Vec<String> {
        store
            .list(AffiliateSpec::NAMESPACE, AffiliateSpec::TYPE)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.metadata().id().to_string())
            .collect()
    }

    async fn wait_for_ids(&self, expected: &[&str]) {
        let store = Arc::clone(&self.store);
        let expected: Vec<String> = expected.iter().map(ToString::to_string).collect();
        eventually(&format!("affiliates {expected:?}"), || {
            let store = Arc::clone(&store);
            let expected = expected.clone();
            async move { Self::affiliate_ids(&store).await == expected }
        })
        .await;
    }

    async fn stop(self) -> Arc<FakeRegistry> {
        self.trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.engine)
            .await
            .expect("engine should stop")
            .unwrap()
            .unwrap();
        self.registry
    }
}

/// GIVEN discovery enabled and a registry with two other nodes and this one
/// WHEN the controller runs
/// THEN only the other nodes are mirrored under k8s/<node id>
#[tokio::test]
async fn should_mirror_other_affiliates() {
    let h = Harness::start(true).await;
    h.registry.set(vec![
        affiliate("n1", "node-1"),
        affiliate("n2", "node-2"),
        affiliate("self", "me"),
    ]);

    h.set_enabled(true).await;

    h.wait_for_ids(&["k8s/n1", "k8s/n2"]).await;
    let stored = h
        .store
        .list(AffiliateSpec::NAMESPACE, AffiliateSpec::TYPE)
        .await
        .unwrap();
    assert!(stored.iter().all(|r| r.metadata().owner() == NAME));
    h.stop().await;
}

/// GIVEN mirrored affiliates
/// WHEN the registry drops a node and notifies
/// THEN the stale affiliate is removed
#[tokio::test]
async fn should_follow_registry_notifications() {
    let h = Harness::start(true).await;
    h.registry.set(vec![affiliate("n1", "node-1"), affiliate("n2", "node-2")]);
    h.set_enabled(true).await;
    h.wait_for_ids(&["k8s/n1", "k8s/n2"]).await;

    h.registry.set(vec![affiliate("n2", "node-2")]);

    h.wait_for_ids(&["k8s/n2"]).await;
    h.stop().await;
}

/// GIVEN mirrored affiliates
/// WHEN discovery is disabled, then enabled again
/// THEN every affiliate is removed, then restored over the same client and watch
#[tokio::test]
async fn should_clean_up_when_disabled_and_reuse_client() {
    let h = Harness::start(true).await;
    h.registry.set(vec![affiliate("n1", "node-1")]);
    h.set_enabled(true).await;
    h.wait_for_ids(&["k8s/n1"]).await;

    h.set_enabled(false).await;
    h.wait_for_ids(&[]).await;

    h.set_enabled(true).await;
    h.wait_for_ids(&["k8s/n1"]).await;

    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 1);
    assert_eq!(h.registry.watches.load(Ordering::SeqCst), 1);
    let registry = h.stop().await;
    assert!(registry.closed.load(Ordering::SeqCst), "watch closed on shutdown");
}

#[tokio::test]
async fn should_leave_foreign_affiliates_alone() {
    let h = Harness::start(true).await;
    let other = Runtime::new(
        "cluster.OtherRegistry",
        Arc::clone(&h.store) as Arc<dyn ResourceStore>,
        vec![],
        vec![Output::shared::<AffiliateSpec>()],
        BackoffRegistry::default(),
    );
    other
        .modify::<AffiliateSpec, _>("service/n9", |a| a.node_id = "n9".to_string())
        .await
        .unwrap();
    h.registry.set(vec![affiliate("n1", "node-1")]);

    h.set_enabled(true).await;
    h.wait_for_ids(&["k8s/n1", "service/n9"]).await;

    h.set_enabled(false).await;
    h.wait_for_ids(&["service/n9"]).await;
    h.stop().await;
}

/// GIVEN discovery enabled but no credentials yet
/// WHEN shutdown is requested
/// THEN the controller stops without connecting
#[tokio::test]
async fn should_wait_for_kubeconfig_and_stop_cleanly() {
    let h = Harness::start(false).await;
    h.registry.set(vec![affiliate("n1", "node-1")]);
    h.set_enabled(true).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(Harness::affiliate_ids(&h.store).await.is_empty());
    assert_eq!(h.connector.connects.load(Ordering::SeqCst), 0);
    let registry = h.stop().await;
    assert!(!registry.closed.load(Ordering::SeqCst));
}
