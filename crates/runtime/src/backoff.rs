//! Restart backoff, keyed by controller name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

/// Default delay before the first restart.
pub const DEFAULT_BASE: Duration = Duration::from_millis(100);

/// Default ceiling on the restart delay.
pub const DEFAULT_MAX: Duration = Duration::from_secs(10);

/// Calculate exponential backoff: `base * 2^attempt`, capped at `max`.
#[must_use]
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    base.checked_mul(factor).map_or(max, |delay| delay.min(max))
}

/// Backoff delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            max: DEFAULT_MAX,
        }
    }
}

impl BackoffConfig {
    /// Set the base delay.
    #[must_use]
    pub const fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Set the maximum delay.
    #[must_use]
    pub const fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }
}

/// Consecutive failure counts for every controller in the process.
///
/// Cloning shares the underlying table.
#[derive(Debug, Clone, Default)]
pub struct BackoffRegistry {
    config: BackoffConfig,
    failures: Arc<Mutex<HashMap<String, u32>>>,
}

impl BackoffRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            failures: Arc::default(),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, u32>> {
        // The table holds plain counters; a poisoned lock still has usable data.
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a failure of `controller` and return the delay before its restart.
    pub fn next_delay(&self, controller: &str) -> Duration {
        let mut table = self.table();
        let failures = table.entry(controller.to_string()).or_insert(0);
        let delay = calculate_backoff(*failures, self.config.base, self.config.max);
        *failures = failures.saturating_add(1);
        debug!(controller, failures = *failures, delay_ms = delay.as_millis(), "Backoff escalated");
        delay
    }

    /// Forget the failure history of `controller`.
    pub fn reset(&self, controller: &str) {
        if self.table().remove(controller).is_some() {
            debug!(controller, "Backoff reset");
        }
    }

    /// Consecutive failures recorded for `controller`.
    #[must_use]
    pub fn failures(&self, controller: &str) -> u32 {
        self.table().get(controller).copied().unwrap_or(0)
    }

    /// The configured delays.
    #[must_use]
    pub const fn config(&self) -> BackoffConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_backoff_doubles_then_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(10);

        assert_eq!(calculate_backoff(0, base, max), Duration::from_millis(100));
        assert_eq!(calculate_backoff(1, base, max), Duration::from_millis(200));
        assert_eq!(calculate_backoff(3, base, max), Duration::from_millis(800));
        assert_eq!(calculate_backoff(7, base, max), max);
        assert_eq!(calculate_backoff(u32::MAX, base, max), max);
    }

    /// GIVEN three consecutive failures
    /// WHEN the controller signals success
    /// THEN the next failure waits the baseline delay again
    #[test]
    fn should_return_to_baseline_after_reset() {
        let registry = BackoffRegistry::default();
        let base = registry.config().base;

        let escalated: Vec<_> = (0..3).map(|_| registry.next_delay("ctrl")).collect();
        assert_eq!(escalated, vec![base, base * 2, base * 4]);

        registry.reset("ctrl");

        assert_eq!(registry.failures("ctrl"), 0);
        assert_eq!(registry.next_delay("ctrl"), base);
    }

    #[test]
    fn should_track_controllers_independently() {
        let registry = BackoffRegistry::default();
        registry.next_delay("a");
        registry.next_delay("a");
        registry.next_delay("b");

        registry.reset("b");

        assert_eq!(registry.failures("a"), 2);
        assert_eq!(registry.failures("b"), 0);
    }
}
