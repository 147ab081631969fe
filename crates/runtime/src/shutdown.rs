//! Cancellation signal shared by every blocking wait in a controller.
//!
//! A [`Shutdown`] is a set of `watch` receivers. It fires when any of its
//! triggers is pulled or dropped, so a child signal derived with
//! [`Shutdown::child`] fires with its parent as well as on its own.

use futures::future::{self, FutureExt};
use tokio::sync::watch;

/// Pulls a [`Shutdown`] signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation signal observed by controllers.
#[derive(Debug, Clone)]
pub struct Shutdown {
    receivers: Vec<watch::Receiver<bool>>,
}

/// Create a connected trigger and signal.
#[must_use]
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (
        ShutdownTrigger { tx },
        Shutdown {
            receivers: vec![rx],
        },
    )
}

impl Shutdown {
    /// Create a connected trigger and signal.
    #[must_use]
    pub fn channel() -> (ShutdownTrigger, Self) {
        channel()
    }

    /// Derive a signal that fires when either `self` or the returned trigger fires.
    #[must_use]
    pub fn child(&self) -> (ShutdownTrigger, Self) {
        let (tx, rx) = watch::channel(false);
        let mut receivers = self.receivers.clone();
        receivers.push(rx);
        (ShutdownTrigger { tx }, Self { receivers })
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.receivers
            .iter()
            .any(|rx| *rx.borrow() || rx.has_changed().is_err())
    }

    /// Wait until the signal fires.
    pub async fn cancelled(&self) {
        if self.receivers.is_empty() {
            return future::pending().await;
        }

        let waits = self.receivers.iter().cloned().map(|mut rx| {
            async move {
                // A dropped trigger also ends the wait.
                let _ = rx.wait_for(|fired| *fired).await;
            }
            .boxed()
        });
        future::select_all(waits).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn should_fire_on_trigger() {
        let (trigger, shutdown) = channel();
        assert!(!shutdown.is_cancelled());

        trigger.trigger();

        assert!(shutdown.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), shutdown.cancelled())
            .await
            .expect("cancelled() should resolve");
    }

    #[tokio::test]
    async fn should_fire_when_trigger_dropped() {
        let (trigger, shutdown) = channel();
        drop(trigger);

        assert!(shutdown.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), shutdown.cancelled())
            .await
            .expect("cancelled() should resolve");
    }

    /// GIVEN a child signal
    /// WHEN only the child trigger fires
    /// THEN the parent stays live
    #[tokio::test]
    async fn should_scope_child_cancellation() {
        let (_parent_trigger, parent) = channel();
        let (child_trigger, child) = parent.child();

        child_trigger.trigger();

        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn should_propagate_parent_cancellation_to_child() {
        let (parent_trigger, parent) = channel();
        let (_child_trigger, child) = parent.child();

        parent_trigger.trigger();

        tokio::time::timeout(Duration::from_secs(1), child.cancelled())
            .await
            .expect("child should observe parent cancellation");
    }
}
