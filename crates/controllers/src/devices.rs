//! Waiting for block devices to settle.

use nodestate_runtime::{Input, Result, Runtime, Shutdown, wait_for_condition};

use crate::resources::DevicesStatus;

/// Block until `DevicesStatus` reports ready, then resume with `next_inputs`.
///
/// # Errors
///
/// [`nodestate_runtime::Error::Cancelled`] on shutdown, store errors otherwise.
pub async fn wait_for_devices_ready(
    shutdown: &Shutdown,
    runtime: &mut Runtime,
    next_inputs: Vec<Input>,
) -> Result<()> {
    wait_for_condition::<DevicesStatus, _>(shutdown, runtime, DevicesStatus::ID, next_inputs, |status| {
        status.ready
    })
    .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use nodestate_resources::{InMemoryStore, ResourceStore};
    use nodestate_runtime::{BackoffRegistry, Output, shutdown};

    use super::*;
    use crate::resources::EtcFileSpec;

    /// GIVEN devices not ready yet
    /// WHEN the device manager reports ready
    /// THEN the waiter resumes on its own inputs with one reconcile queued
    #[tokio::test]
    async fn should_resume_when_devices_ready() {
        let store = InMemoryStore::new_arc();
        let own_inputs = vec![Input::strong::<EtcFileSpec>()];
        let mut waiter = Runtime::new(
            "waiter",
            Arc::clone(&store) as Arc<dyn ResourceStore>,
            own_inputs.clone(),
            vec![],
            BackoffRegistry::default(),
        );
        let devices = Runtime::new(
            "devices",
            Arc::clone(&store) as Arc<dyn ResourceStore>,
            vec![],
            vec![Output::exclusive::<DevicesStatus>()],
            BackoffRegistry::default(),
        );
        let (_trigger, shutdown) = shutdown::channel();

        let producer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            devices
                .modify::<DevicesStatus, _>(DevicesStatus::ID, |s| s.ready = false)
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            devices
                .modify::<DevicesStatus, _>(DevicesStatus::ID, |s| s.ready = true)
                .await
                .unwrap();
        });

        tokio::time::timeout(
            Duration::from_secs(2),
            wait_for_devices_ready(&shutdown, &mut waiter, own_inputs.clone()),
        )
        .await
        .expect("devices should become ready")
        .unwrap();
        producer.await.unwrap();

        assert_eq!(waiter.inputs(), own_inputs);
        assert!(waiter.event_ch().try_recv().is_ok());
        assert!(waiter.event_ch().try_recv().is_err());
    }
}
