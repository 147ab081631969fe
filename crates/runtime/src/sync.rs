//! Waiting on a condition owned by another controller.

use tracing::{debug, info};

use nodestate_resources::ResourceSpec;

use crate::controller::Input;
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use crate::shutdown::Shutdown;

/// Block until the `T` resource `id` satisfies `ready`, then resume with `restore` inputs.
///
/// While waiting the controller watches only that one resource; a missing
/// resource counts as not ready. Once the condition holds the inputs are
/// replaced by `restore` and one reconcile is queued, since changes to the
/// restored inputs were not observed while narrowed.
///
/// # Errors
///
/// [`Error::Cancelled`] when `shutdown` fires, plus store errors other than not-found.
pub async fn wait_for_condition<T, P>(
    shutdown: &Shutdown,
    runtime: &mut Runtime,
    id: &str,
    restore: Vec<Input>,
    ready: P,
) -> Result<()>
where
    T: ResourceSpec,
    P: Fn(&T) -> bool + Send,
{
    runtime.update_inputs(vec![Input::weak::<T>().with_id(id)])?;
    debug!(controller = runtime.name(), resource_type = T::TYPE, id, "Waiting for condition");

    loop {
        match runtime.get_typed::<T>(id).await {
            Ok(resource) if ready(resource.spec()) => break,
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        tokio::select! {
            biased;
            () = shutdown.cancelled() => return Err(Error::Cancelled),
            _ = runtime.event_ch().recv() => {}
        }
    }

    runtime.update_inputs(restore)?;
    runtime.queue_reconcile();
    info!(controller = runtime.name(), resource_type = T::TYPE, id, "Condition met");
    Ok(())
}
