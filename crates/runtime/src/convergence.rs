//! Building blocks of a convergence pass: the top-of-pass wait and orphan cleanup.

use std::collections::BTreeSet;

use futures::future;
use tokio::sync::mpsc;
use tracing::{debug, info};

use nodestate_resources::{ResourceKey, ResourceSpec};

use crate::error::Result;
use crate::runtime::Runtime;
use crate::shutdown::Shutdown;

/// Optional controller-specific notification source, e.g. an external registry watch.
///
/// An empty `Secondary` never fires, so the wait needs no special case for it.
#[derive(Debug, Default)]
pub struct Secondary {
    rx: Option<mpsc::Receiver<()>>,
}

impl Secondary {
    /// A source that never fires.
    #[must_use]
    pub const fn none() -> Self {
        Self { rx: None }
    }

    /// Wrap a notification channel.
    #[must_use]
    pub const fn new(rx: mpsc::Receiver<()>) -> Self {
        Self { rx: Some(rx) }
    }

    /// Wait for one notification. Returns `false` and detaches when the sender closed.
    async fn recv(&mut self) -> bool {
        let Some(rx) = self.rx.as_mut() else {
            return future::pending().await;
        };
        if rx.recv().await.is_some() {
            true
        } else {
            self.rx = None;
            false
        }
    }
}

/// Why a pass was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// An input changed or a reconcile was queued.
    Inputs,
    /// The secondary source fired.
    Secondary,
}

/// Block until the next pass should run. `None` means the shutdown signal fired.
pub async fn wait_for_wake(
    shutdown: &Shutdown,
    runtime: &mut Runtime,
    secondary: &mut Secondary,
) -> Option<Wake> {
    let controller = runtime.name().to_string();
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => return None,
            woke = runtime.event_ch().recv() => {
                // The runtime owns a sender, so the channel only closes on teardown.
                return woke.map(|()| Wake::Inputs);
            }
            fired = secondary.recv() => {
                if fired {
                    return Some(Wake::Secondary);
                }
                debug!(controller = %controller, "Secondary notification source closed");
            }
        }
    }
}

/// Ids backed by a live side effect in the current pass.
///
/// Built from scratch every pass; never carried over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TouchedSet {
    ids: BTreeSet<String>,
}

impl TouchedSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an id.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for TouchedSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Destroy every `T` this controller wrote whose id is not in `touched`.
///
/// Only resources owned by the calling controller are considered, so this is
/// safe on Shared outputs. An orphan that still carries finalizers is moved to
/// `TearingDown` and left for a later pass. Returns the number destroyed.
///
/// # Errors
///
/// Store errors other than not-found.
pub async fn cleanup_orphans<T: ResourceSpec>(runtime: &Runtime, touched: &TouchedSet) -> Result<usize> {
    let orphans: Vec<ResourceKey> = runtime
        .list(T::NAMESPACE, T::TYPE)
        .await?
        .into_iter()
        .filter(|r| r.metadata().owner() == runtime.name() && !touched.contains(r.metadata().id()))
        .map(|r| r.metadata().key().clone())
        .collect();

    let mut destroyed = 0usize;
    for key in orphans {
        let ready = match runtime.teardown(&key).await {
            Ok(ready) => ready,
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        };
        if !ready {
            debug!(key = %key, "Orphan waiting on finalizers");
            continue;
        }
        match runtime.destroy(&key).await {
            Ok(()) => {
                info!(key = %key, "Orphan destroyed");
                destroyed = destroyed.saturating_add(1);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(destroyed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde::{Deserialize, Serialize};

    use nodestate_resources::{InMemoryStore, ResourceStore};

    use super::*;
    use crate::backoff::BackoffRegistry;
    use crate::controller::Output;
    use crate::shutdown;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Status {
        version: u64,
    }

    impl ResourceSpec for Status {
        const TYPE: &'static str = "Statuses.test";
        const NAMESPACE: &'static str = "test";
    }

    fn runtime(store: &Arc<InMemoryStore>, name: &str) -> Runtime {
        Runtime::new(
            name,
            Arc::clone(store) as Arc<dyn ResourceStore>,
            vec![],
            vec![Output::shared::<Status>()],
            BackoffRegistry::default(),
        )
    }

    #[tokio::test]
    async fn should_return_none_on_shutdown() {
        let store = InMemoryStore::new_arc();
        let mut rt = runtime(&store, "c");
        let (trigger, shutdown) = shutdown::channel();
        trigger.trigger();

        let woke = wait_for_wake(&shutdown, &mut rt, &mut Secondary::none()).await;

        assert_eq!(woke, None);
    }

    #[tokio::test]
    async fn should_wake_from_secondary_source() {
        let store = InMemoryStore::new_arc();
        let mut rt = runtime(&store, "c");
        let (_trigger, shutdown) = shutdown::channel();
        let (tx, rx) = mpsc::channel(1);
        let mut secondary = Secondary::new(rx);

        tx.send(()).await.unwrap();
        let woke = wait_for_wake(&shutdown, &mut rt, &mut secondary).await;

        assert_eq!(woke, Some(Wake::Secondary));
    }

    /// GIVEN a closed secondary source
    /// WHEN waiting
    /// THEN the source is detached and input wakes still arrive
    #[tokio::test]
    async fn should_detach_closed_secondary_source() {
        let store = InMemoryStore::new_arc();
        let mut rt = runtime(&store, "c");
        let (_trigger, shutdown) = shutdown::channel();
        let (tx, rx) = mpsc::channel(1);
        let mut secondary = Secondary::new(rx);
        drop(tx);

        let waiter = tokio::time::timeout(
            Duration::from_secs(1),
            async {
                rt.queue_reconcile();
                wait_for_wake(&shutdown, &mut rt, &mut secondary).await
            },
        );

        assert_eq!(waiter.await.unwrap(), Some(Wake::Inputs));
    }

    #[tokio::test]
    async fn should_destroy_only_own_untouched_outputs() {
        let store = InMemoryStore::new_arc();
        let mine = runtime(&store, "mine");
        let theirs = runtime(&store, "theirs");
        for id in ["keep", "drop"] {
            mine.modify::<Status, _>(id, |s| s.version = 1).await.unwrap();
        }
        theirs.modify::<Status, _>("foreign", |s| s.version = 1).await.unwrap();

        let touched: TouchedSet = ["keep"].into_iter().collect();
        let destroyed = cleanup_orphans::<Status>(&mine, &touched).await.unwrap();

        assert_eq!(destroyed, 1);
        let left: Vec<_> = store
            .list(Status::NAMESPACE, Status::TYPE)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.metadata().id().to_string())
            .collect();
        assert_eq!(left, vec!["foreign", "keep"]);
    }

    #[tokio::test]
    async fn should_hold_orphans_with_foreign_finalizers() {
        let store = InMemoryStore::new_arc();
        let mine = runtime(&store, "mine");
        let created = mine.modify::<Status, _>("held", |s| s.version = 1).await.unwrap();
        store
            .add_finalizer(created.metadata().key(), "someone-else")
            .await
            .unwrap();

        let destroyed = cleanup_orphans::<Status>(&mine, &TouchedSet::new()).await.unwrap();

        assert_eq!(destroyed, 0);
        let held = store.get(created.metadata().key()).await.unwrap();
        assert_eq!(held.metadata().phase(), nodestate_resources::Phase::TearingDown);
    }
}
