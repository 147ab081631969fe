//! Blocking preconditions.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use nodestate_runtime::{Error, Result, Shutdown};

/// Default interval between existence checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Waits until a file exists, e.g. a credential written by another service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileExists {
    path: PathBuf,
    interval: Duration,
}

impl FileExists {
    /// Wait for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the polling interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Block until the file exists.
    ///
    /// # Errors
    ///
    /// [`Error::Cancelled`] when `shutdown` fires first.
    pub async fn wait(&self, shutdown: &Shutdown) -> Result<()> {
        let mut logged = false;
        loop {
            if tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
                if logged {
                    info!(path = %self.path.display(), "File appeared");
                }
                return Ok(());
            }
            if !logged {
                debug!(path = %self.path.display(), "Waiting for file");
                logged = true;
            }

            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
