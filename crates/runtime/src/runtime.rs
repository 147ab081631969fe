//! Per-invocation handle a controller uses to talk to the engine and store.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use nodestate_resources::typed::{decode, encode};
use nodestate_resources::{Mutation, Resource, ResourceKey, ResourceSpec, ResourceStore, Typed};

use crate::backoff::BackoffRegistry;
use crate::controller::{Input, Output};
use crate::error::{Error, Result};

/// Handle passed to [`Controller::run`](crate::Controller::run).
///
/// Wake signals coalesce: many changes between two reads of
/// [`event_ch`](Self::event_ch) produce a single wake.
pub struct Runtime {
    name: String,
    store: Arc<dyn ResourceStore>,
    outputs: Vec<Output>,
    inputs: watch::Sender<Vec<Input>>,
    wake_tx: mpsc::Sender<()>,
    wake_rx: mpsc::Receiver<()>,
    backoff: BackoffRegistry,
    forwarder: JoinHandle<()>,
}

impl Runtime {
    /// Create a runtime for one `run` invocation.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn ResourceStore>,
        inputs: Vec<Input>,
        outputs: Vec<Output>,
        backoff: BackoffRegistry,
    ) -> Self {
        let name = name.into();
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let (inputs, inputs_rx) = watch::channel(inputs);

        // Subscribe before spawning so nothing written after construction is missed.
        let events = store.watch();
        let forwarder = tokio::spawn(forward_events(
            name.clone(),
            events,
            inputs_rx,
            wake_tx.clone(),
        ));

        Self {
            name,
            store,
            outputs,
            inputs,
            wake_tx,
            wake_rx,
            backoff,
            forwarder,
        }
    }

    /// Name of the controller this runtime serves.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wake signals: fires on any change covered by the current inputs.
    pub fn event_ch(&mut self) -> &mut mpsc::Receiver<()> {
        &mut self.wake_rx
    }

    /// Atomically replace the watch set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if an input has an empty namespace or type.
    pub fn update_inputs(&self, inputs: Vec<Input>) -> Result<()> {
        if let Some(bad) = inputs
            .iter()
            .find(|i| i.namespace.is_empty() || i.resource_type.is_empty())
        {
            return Err(Error::invalid_config(format!(
                "controller '{}': input {bad:?} needs a namespace and a type",
                self.name
            )));
        }
        debug!(controller = %self.name, count = inputs.len(), "Inputs updated");
        self.inputs.send_replace(inputs);
        Ok(())
    }

    /// Current watch set.
    #[must_use]
    pub fn inputs(&self) -> Vec<Input> {
        self.inputs.borrow().clone()
    }

    /// Force one wake even without an input change.
    pub fn queue_reconcile(&self) {
        // A full channel already holds a pending wake.
        let _ = self.wake_tx.try_send(());
    }

    /// Forget the restart backoff history of this controller.
    pub fn reset_restart_backoff(&self) {
        self.backoff.reset(&self.name);
    }

    fn check_readable(&self, namespace: &str, resource_type: &str, key: Option<&ResourceKey>) -> Result<()> {
        let in_inputs = self.inputs.borrow().iter().any(|input| {
            input.namespace == namespace
                && input.resource_type == resource_type
                && match (&input.id, key) {
                    (Some(id), Some(key)) => *id == key.id,
                    (Some(_), None) => false,
                    (None, _) => true,
                }
        });
        let in_outputs = self.outputs.iter().any(|o| o.resource_type == resource_type);

        if in_inputs || in_outputs {
            Ok(())
        } else {
            Err(Error::UnreadableResource {
                controller: self.name.clone(),
                key: key
                    .cloned()
                    .unwrap_or_else(|| ResourceKey::new(namespace, resource_type, "*")),
            })
        }
    }

    fn check_writable(&self, resource_type: &str) -> Result<()> {
        if self.outputs.iter().any(|o| o.resource_type == resource_type) {
            Ok(())
        } else {
            Err(Error::undeclared_output(&self.name, resource_type))
        }
    }

    /// Get a resource covered by the inputs or outputs.
    ///
    /// # Errors
    ///
    /// Store errors, including not-found, and [`Error::UnreadableResource`].
    pub async fn get(&self, key: &ResourceKey) -> Result<Resource> {
        self.check_readable(&key.namespace, &key.resource_type, Some(key))?;
        Ok(self.store.get(key).await?)
    }

    /// Get and decode a typed resource in its default namespace.
    ///
    /// # Errors
    ///
    /// See [`get`](Self::get).
    pub async fn get_typed<T: ResourceSpec>(&self, id: &str) -> Result<Typed<T>> {
        let resource = self.get(&ResourceKey::new(T::NAMESPACE, T::TYPE, id)).await?;
        Ok(Typed::from_resource(resource)?)
    }

    /// List every resource of a type.
    ///
    /// # Errors
    ///
    /// Store errors and [`Error::UnreadableResource`].
    pub async fn list(&self, namespace: &str, resource_type: &str) -> Result<Vec<Resource>> {
        self.check_readable(namespace, resource_type, None)?;
        Ok(self.store.list(namespace, resource_type).await?)
    }

    /// List and decode every resource of a typed spec in its default namespace.
    ///
    /// # Errors
    ///
    /// See [`list`](Self::list).
    pub async fn list_typed<T: ResourceSpec>(&self) -> Result<Vec<Typed<T>>> {
        self.list(T::NAMESPACE, T::TYPE)
            .await?
            .into_iter()
            .map(|r| Typed::from_resource(r).map_err(Error::from))
            .collect()
    }

    /// Create-if-absent then mutate an output resource.
    ///
    /// # Errors
    ///
    /// [`Error::UndeclaredOutput`] when `T` is not an output, plus store errors
    /// such as an owner conflict.
    pub async fn modify<T, F>(&self, id: &str, mutate: F) -> Result<Resource>
    where
        T: ResourceSpec,
        F: FnOnce(&mut T) + Send,
    {
        self.check_writable(T::TYPE)?;
        let key = ResourceKey::new(T::NAMESPACE, T::TYPE, id);
        let mutation: Mutation<'_> = Box::new(move |value| {
            let mut spec: T = decode(std::mem::take(value))?;
            mutate(&mut spec);
            *value = encode(&spec)?;
            Ok(())
        });
        Ok(self.store.modify(&key, &self.name, mutation).await?)
    }

    /// Move an owned output to `TearingDown`; returns whether it may be destroyed now.
    ///
    /// # Errors
    ///
    /// [`Error::UndeclaredOutput`] and store errors.
    pub async fn teardown(&self, key: &ResourceKey) -> Result<bool> {
        self.check_writable(&key.resource_type)?;
        Ok(self.store.teardown(key, &self.name).await?)
    }

    /// Destroy an owned output.
    ///
    /// # Errors
    ///
    /// [`Error::UndeclaredOutput`] and store errors, including pending finalizers.
    pub async fn destroy(&self, key: &ResourceKey) -> Result<()> {
        self.check_writable(&key.resource_type)?;
        Ok(self.store.destroy(key, &self.name).await?)
    }

    /// Put this controller's finalizer on an input resource.
    ///
    /// # Errors
    ///
    /// Store errors, including a phase conflict once teardown started.
    pub async fn add_finalizer(&self, key: &ResourceKey) -> Result<()> {
        self.check_readable(&key.namespace, &key.resource_type, Some(key))?;
        Ok(self.store.add_finalizer(key, &self.name).await?)
    }

    /// Release this controller's finalizer.
    ///
    /// # Errors
    ///
    /// Store errors.
    pub async fn remove_finalizer(&self, key: &ResourceKey) -> Result<()> {
        self.check_readable(&key.namespace, &key.resource_type, Some(key))?;
        Ok(self.store.remove_finalizer(key, &self.name).await?)
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

async fn forward_events(
    controller: String,
    mut events: broadcast::Receiver<nodestate_resources::ResourceEvent>,
    inputs: watch::Receiver<Vec<Input>>,
    wake: mpsc::Sender<()>,
) {
    loop {
        let relevant = match events.recv().await {
            Ok(event) => {
                let hit = inputs.borrow().iter().any(|input| input.matches(&event.key));
                if hit {
                    trace!(controller = %controller, key = %event.key, kind = event.kind.as_str(), "Wake");
                }
                hit
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(controller = %controller, skipped, "Watch lagged, forcing reconcile");
                true
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if relevant {
            if let Err(mpsc::error::TrySendError::Closed(())) = wake.try_send(()) {
                break;
            }
        }
    }
}
