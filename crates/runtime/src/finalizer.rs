//! Finalizer handshake between a controller and the resources it depends on.
//!
//! Per `(resource, controller)` the state only moves `absent -> added -> removed`.
//! The finalizer goes on before any side effect is established and comes off
//! only after the side effect is undone; a crash in between is repaired by the
//! next pass because the resource is still visible.

use std::future::Future;

use tracing::debug;

use nodestate_resources::{Metadata, Phase};

use crate::error::Result;
use crate::runtime::Runtime;

/// Whether a controller's finalizer is on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerState {
    Absent,
    Added,
}

impl FinalizerState {
    /// Read the state from resource metadata.
    #[must_use]
    pub fn of(metadata: &Metadata, controller: &str) -> Self {
        if metadata.has_finalizer(controller) {
            Self::Added
        } else {
            Self::Absent
        }
    }
}

/// Make sure the controller's finalizer is on a `Running` resource before acting on it.
///
/// For a `TearingDown` resource nothing is added and the current state is returned.
///
/// # Errors
///
/// Store errors.
pub async fn ensure_finalizer(runtime: &Runtime, metadata: &Metadata) -> Result<FinalizerState> {
    match (metadata.phase(), FinalizerState::of(metadata, runtime.name())) {
        (_, FinalizerState::Added) => Ok(FinalizerState::Added),
        (Phase::TearingDown, FinalizerState::Absent) => Ok(FinalizerState::Absent),
        (Phase::Running, FinalizerState::Absent) => {
            runtime.add_finalizer(metadata.key()).await?;
            debug!(controller = runtime.name(), key = %metadata.key(), "Finalizer added");
            Ok(FinalizerState::Added)
        }
    }
}

/// Run `undo`, then release the controller's finalizer.
///
/// The finalizer stays in place when `undo` fails, so the store keeps the
/// resource around for the retry.
///
/// # Errors
///
/// The error of `undo`, or a store error from the release.
pub async fn release_after<F>(runtime: &Runtime, metadata: &Metadata, undo: F) -> Result<()>
where
    F: Future<Output = Result<()>> + Send,
{
    undo.await?;

    match FinalizerState::of(metadata, runtime.name()) {
        FinalizerState::Absent => Ok(()),
        FinalizerState::Added => {
            runtime.remove_finalizer(metadata.key()).await?;
            debug!(controller = runtime.name(), key = %metadata.key(), "Finalizer released");
            Ok(())
        }
    }
}
