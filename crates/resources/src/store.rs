//! Resource store trait and implementations.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::event::{ChangeKind, ResourceEvent};
use crate::types::{Metadata, Phase, Resource, ResourceKey};

/// Default capacity of the change notification channel.
const DEFAULT_WATCH_CAPACITY: usize = 1024;

/// Mutation applied to a spec payload by [`ResourceStore::modify`].
///
/// A resource that does not exist yet is presented as `Value::Null`.
pub type Mutation<'a> = Box<dyn FnOnce(&mut serde_json::Value) -> Result<()> + Send + 'a>;

/// Trait for resource storage backends.
///
/// Implementations must be safe for concurrent use by every controller task.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Get a resource by key.
    async fn get(&self, key: &ResourceKey) -> Result<Resource>;

    /// List all resources of a type in a namespace, ordered by id.
    async fn list(&self, namespace: &str, resource_type: &str) -> Result<Vec<Resource>>;

    /// Create-if-absent then mutate, atomically with respect to other writers.
    ///
    /// A mutation that leaves the spec unchanged is a no-op: the version is
    /// not bumped and no notification is sent.
    async fn modify(
        &self,
        key: &ResourceKey,
        owner: &str,
        mutate: Mutation<'_>,
    ) -> Result<Resource>;

    /// Add a finalizer. Refused once the resource is tearing down.
    async fn add_finalizer(&self, key: &ResourceKey, finalizer: &str) -> Result<()>;

    /// Remove a finalizer. Removing an absent finalizer is a no-op.
    async fn remove_finalizer(&self, key: &ResourceKey, finalizer: &str) -> Result<()>;

    /// Move a resource to [`Phase::TearingDown`].
    ///
    /// Returns whether the finalizer set is already empty, i.e. whether the
    /// resource may be destroyed right away.
    async fn teardown(&self, key: &ResourceKey, owner: &str) -> Result<bool>;

    /// Physically remove a resource. Fails while finalizers remain.
    async fn destroy(&self, key: &ResourceKey, owner: &str) -> Result<()>;

    /// Subscribe to change notifications.
    fn watch(&self) -> broadcast::Receiver<ResourceEvent>;
}

/// In-memory resource store.
pub struct InMemoryStore {
    resources: RwLock<BTreeMap<ResourceKey, Resource>>,
    events: broadcast::Sender<ResourceEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_watch_capacity(DEFAULT_WATCH_CAPACITY)
    }
}

impl InMemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Create a store whose notification channel holds `capacity` events.
    pub fn with_watch_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            resources: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    fn notify(&self, kind: ChangeKind, metadata: &Metadata) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.events.send(ResourceEvent::new(
            kind,
            metadata.key().clone(),
            metadata.version(),
        ));
    }
}

fn check_owner(resource: &Resource, requested_by: &str) -> Result<()> {
    let meta = resource.metadata();
    if meta.owner() == requested_by {
        Ok(())
    } else {
        Err(Error::owner_conflict(meta.key(), meta.owner(), requested_by))
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get(&self, key: &ResourceKey) -> Result<Resource> {
        let resources = self.resources.read().await;
        resources.get(key).cloned().ok_or_else(|| Error::not_found(key))
    }

    async fn list(&self, namespace: &str, resource_type: &str) -> Result<Vec<Resource>> {
        let resources = self.resources.read().await;
        Ok(resources
            .values()
            .filter(|r| {
                r.metadata().namespace() == namespace
                    && r.metadata().resource_type() == resource_type
            })
            .cloned()
            .collect())
    }

    async fn modify(
        &self,
        key: &ResourceKey,
        owner: &str,
        mutate: Mutation<'_>,
    ) -> Result<Resource> {
        let mut resources = self.resources.write().await;

        match resources.get_mut(key) {
            Some(existing) => {
                check_owner(existing, owner)?;
                match existing.metadata().phase() {
                    Phase::Running => {}
                    Phase::TearingDown => {
                        return Err(Error::phase_conflict(key, Phase::TearingDown, "modify"));
                    }
                }

                let mut spec = existing.spec().clone();
                mutate(&mut spec)?;
                if &spec == existing.spec() {
                    return Ok(existing.clone());
                }

                *existing.spec_mut() = spec;
                existing.metadata_mut().bump();
                self.notify(ChangeKind::Updated, existing.metadata());
                Ok(existing.clone())
            }
            None => {
                let mut spec = serde_json::Value::Null;
                mutate(&mut spec)?;
                let resource = Resource::new(Metadata::new(key.clone(), owner), spec);
                self.notify(ChangeKind::Created, resource.metadata());
                resources.insert(key.clone(), resource.clone());
                Ok(resource)
            }
        }
    }

    async fn add_finalizer(&self, key: &ResourceKey, finalizer: &str) -> Result<()> {
        let mut resources = self.resources.write().await;
        let resource = resources.get_mut(key).ok_or_else(|| Error::not_found(key))?;

        if resource.metadata().has_finalizer(finalizer) {
            return Ok(());
        }
        match resource.metadata().phase() {
            Phase::Running => {}
            Phase::TearingDown => {
                return Err(Error::phase_conflict(
                    key,
                    Phase::TearingDown,
                    format!("add finalizer '{finalizer}'"),
                ));
            }
        }

        resource.metadata_mut().insert_finalizer(finalizer);
        self.notify(ChangeKind::FinalizersChanged, resource.metadata());
        Ok(())
    }

    async fn remove_finalizer(&self, key: &ResourceKey, finalizer: &str) -> Result<()> {
        let mut resources = self.resources.write().await;
        let resource = resources.get_mut(key).ok_or_else(|| Error::not_found(key))?;

        if resource.metadata_mut().drop_finalizer(finalizer) {
            self.notify(ChangeKind::FinalizersChanged, resource.metadata());
        }
        Ok(())
    }

    async fn teardown(&self, key: &ResourceKey, owner: &str) -> Result<bool> {
        let mut resources = self.resources.write().await;
        let resource = resources.get_mut(key).ok_or_else(|| Error::not_found(key))?;
        check_owner(resource, owner)?;

        if resource.metadata_mut().begin_teardown() {
            self.notify(ChangeKind::TearingDown, resource.metadata());
        }
        Ok(resource.metadata().finalizers().is_empty())
    }

    async fn destroy(&self, key: &ResourceKey, owner: &str) -> Result<()> {
        let mut resources = self.resources.write().await;
        let resource = resources.get(key).ok_or_else(|| Error::not_found(key))?;
        check_owner(resource, owner)?;

        let finalizers = resource.metadata().finalizers();
        if !finalizers.is_empty() {
            return Err(Error::finalizers_pending(
                key,
                finalizers.iter().cloned().collect(),
            ));
        }

        if let Some(removed) = resources.remove(key) {
            self.notify(ChangeKind::Destroyed, removed.metadata());
        }
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<ResourceEvent> {
        self.events.subscribe()
    }
}

/// A wrapper that adds tracing to a resource store.
pub struct TracingStore<S: ResourceStore> {
    inner: S,
}

impl<S: ResourceStore> TracingStore<S> {
    /// Create a new tracing store.
    pub const fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: ResourceStore> ResourceStore for TracingStore<S> {
    async fn get(&self, key: &ResourceKey) -> Result<Resource> {
        trace!(key = %key, "Getting resource");
        self.inner.get(key).await
    }

    async fn list(&self, namespace: &str, resource_type: &str) -> Result<Vec<Resource>> {
        trace!(namespace, resource_type, "Listing resources");
        self.inner.list(namespace, resource_type).await
    }

    async fn modify(
        &self,
        key: &ResourceKey,
        owner: &str,
        mutate: Mutation<'_>,
    ) -> Result<Resource> {
        let result = self.inner.modify(key, owner, mutate).await;
        match &result {
            Ok(resource) => debug!(
                key = %key,
                owner,
                version = %resource.metadata().version(),
                "Resource modified"
            ),
            Err(e) => debug!(key = %key, owner, error = %e, "Resource modify failed"),
        }
        result
    }

    async fn add_finalizer(&self, key: &ResourceKey, finalizer: &str) -> Result<()> {
        debug!(key = %key, finalizer, "Adding finalizer");
        self.inner.add_finalizer(key, finalizer).await
    }

    async fn remove_finalizer(&self, key: &ResourceKey, finalizer: &str) -> Result<()> {
        debug!(key = %key, finalizer, "Removing finalizer");
        self.inner.remove_finalizer(key, finalizer).await
    }

    async fn teardown(&self, key: &ResourceKey, owner: &str) -> Result<bool> {
        debug!(key = %key, owner, "Tearing down resource");
        self.inner.teardown(key, owner).await
    }

    async fn destroy(&self, key: &ResourceKey, owner: &str) -> Result<()> {
        debug!(key = %key, owner, "Destroying resource");
        self.inner.destroy(key, owner).await
    }

    fn watch(&self) -> broadcast::Receiver<ResourceEvent> {
        self.inner.watch()
    }
}
