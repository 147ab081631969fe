//! Reconciler engine: one supervised task per controller.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use itertools::Itertools;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

use nodestate_resources::ResourceStore;

use crate::backoff::{BackoffConfig, BackoffRegistry};
use crate::controller::{Controller, InputKind, OutputKind};
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::shutdown::Shutdown;

/// Configuration for the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Restart backoff after a failed `run`.
    pub backoff: BackoffConfig,
}

impl EngineConfig {
    /// Set the backoff configuration.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Drives registered controllers until shutdown.
pub struct Engine {
    store: Arc<dyn ResourceStore>,
    backoff: BackoffRegistry,
    controllers: Vec<Box<dyn Controller>>,
}

impl Engine {
    /// Create an engine over a store.
    pub fn new(store: Arc<dyn ResourceStore>, config: EngineConfig) -> Self {
        Self {
            store,
            backoff: BackoffRegistry::new(config.backoff),
            controllers: Vec::new(),
        }
    }

    /// The process-wide backoff table shared with every controller runtime.
    #[must_use]
    pub fn backoff(&self) -> BackoffRegistry {
        self.backoff.clone()
    }

    /// Names of registered controllers, in registration order.
    pub fn controller_names(&self) -> impl Iterator<Item = &str> {
        self.controllers.iter().map(|c| c.name())
    }

    /// Register a controller.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateController`] for a reused name and
    /// [`Error::ExclusiveOutputConflict`] when an output type is claimed by
    /// two controllers and one of them declared it Exclusive.
    pub fn register(&mut self, controller: Box<dyn Controller>) -> Result<()> {
        let name = controller.name().to_string();
        if self.controllers.iter().any(|c| c.name() == name) {
            return Err(Error::DuplicateController { name });
        }

        for output in controller.outputs() {
            let clash = self.controllers.iter().find_map(|existing| {
                existing
                    .outputs()
                    .into_iter()
                    .find(|o| {
                        o.resource_type == output.resource_type
                            && (o.kind == OutputKind::Exclusive || output.kind == OutputKind::Exclusive)
                    })
                    .map(|_| existing.name().to_string())
            });
            if let Some(first) = clash {
                return Err(Error::ExclusiveOutputConflict {
                    resource_type: output.resource_type,
                    first,
                    second: name,
                });
            }
        }

        debug!(controller = %name, "Controller registered");
        self.controllers.push(controller);
        Ok(())
    }

    /// Register a controller, builder style.
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn with_controller(mut self, controller: Box<dyn Controller>) -> Result<Self> {
        self.register(controller)?;
        Ok(self)
    }

    /// Startup order implied by Strong inputs: producers before consumers.
    ///
    /// The order is advisory; consumers must still tolerate missing inputs.
    ///
    /// # Errors
    ///
    /// [`Error::StrongDependencyCycle`] when Strong inputs form a cycle.
    pub fn startup_order(&self) -> Result<Vec<String>> {
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let nodes: Vec<NodeIndex> = self
            .controllers
            .iter()
            .map(|c| graph.add_node(c.name().to_string()))
            .collect();

        let producers: HashMap<String, Vec<NodeIndex>> = self
            .controllers
            .iter()
            .zip(&nodes)
            .flat_map(|(c, node)| c.outputs().into_iter().map(move |o| (o.resource_type, *node)))
            .into_group_map();

        for (controller, consumer) in self.controllers.iter().zip(&nodes) {
            let strong_types = controller
                .inputs()
                .into_iter()
                .filter(|i| i.kind == InputKind::Strong)
                .map(|i| i.resource_type)
                .unique();
            for resource_type in strong_types {
                for producer in producers.get(&resource_type).into_iter().flatten() {
                    if producer != consumer {
                        graph.update_edge(*producer, *consumer, ());
                    }
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| Error::StrongDependencyCycle {
            controller: graph
                .node_weight(cycle.node_id())
                .cloned()
                .unwrap_or_default(),
        })?;

        Ok(order
            .into_iter()
            .filter_map(|node| graph.node_weight(node).cloned())
            .collect())
    }

    /// Run every controller until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error only when the registered set is invalid; controller
    /// failures are retried, never propagated.
    pub async fn run(self, shutdown: Shutdown) -> Result<()> {
        let order = self.startup_order()?;
        let mut controllers: HashMap<String, Box<dyn Controller>> = self
            .controllers
            .into_iter()
            .map(|c| (c.name().to_string(), c))
            .collect();

        let mut tasks = JoinSet::new();
        for name in order {
            let Some(controller) = controllers.remove(&name) else {
                continue;
            };
            let span = info_span!("controller", name = %name);
            tasks.spawn(
                supervise(
                    controller,
                    Arc::clone(&self.store),
                    self.backoff.clone(),
                    shutdown.clone(),
                )
                .instrument(span),
            );
        }
        info!(controllers = tasks.len(), "Engine started");

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Controller task aborted");
            }
        }

        info!("Engine stopped");
        Ok(())
    }
}

/// Keep one controller's `run` alive: exactly one invocation at a time,
/// restarted after a backoff whenever it fails.
async fn supervise(
    mut controller: Box<dyn Controller>,
    store: Arc<dyn ResourceStore>,
    backoff: BackoffRegistry,
    shutdown: Shutdown,
) {
    let name = controller.name().to_string();

    while !shutdown.is_cancelled() {
        let mut runtime = Runtime::new(
            name.clone(),
            Arc::clone(&store),
            controller.inputs(),
            controller.outputs(),
            backoff.clone(),
        );
        runtime.queue_reconcile();
        debug!("Controller starting");

        let outcome = AssertUnwindSafe(controller.run(shutdown.clone(), &mut runtime))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(Error::ControllerPanicked {
                    controller: name.clone(),
                    reason: panic_reason(payload.as_ref()),
                })
            });
        drop(runtime);

        match outcome {
            Ok(()) => {
                info!("Controller stopped");
                return;
            }
            Err(Error::Cancelled) if shutdown.is_cancelled() => {
                info!("Controller stopped");
                return;
            }
            Err(e) => {
                let delay = backoff.next_delay(&name);
                warn!(error = %e, delay_ms = delay.as_millis(), "Controller failed, restarting");
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
