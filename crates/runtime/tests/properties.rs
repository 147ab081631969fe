//! Property-based tests for the controller runtime.
//!
//! Properties verified:
//! - Exclusivity: a second writer of an id is always flagged and never lands
//! - Backoff escalation is bounded and a reset returns to the baseline

#![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nodestate_resources::{InMemoryStore, ResourceSpec, ResourceStore, Typed};
use nodestate_runtime::{BackoffConfig, BackoffRegistry, Error, Output, Runtime};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Lease {
    value: u32,
}

impl ResourceSpec for Lease {
    const TYPE: &'static str = "Leases.test";
    const NAMESPACE: &'static str = "test";
}

/// Test helper: Unwrap a Result or panic with context
fn unwrap_result<T, E: std::fmt::Display>(result: std::result::Result<T, E>, context: &str) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("{context}: {e}"),
    }
}

fn tokio_runtime() -> tokio::runtime::Runtime {
    unwrap_result(
        tokio::runtime::Builder::new_current_thread().enable_all().build(),
        "runtime creation should succeed",
    )
}

// ==========================================================================
// PROPERTY: Exclusivity
// ==========================================================================

/// What the store holds after a run of writes, next to what a model predicts.
struct Outcome {
    owners: HashMap<String, String>,
    expected_owners: HashMap<String, String>,
    values: HashMap<String, u32>,
    expected_values: HashMap<String, u32>,
    conflicts: usize,
    expected_conflicts: usize,
}

const WRITERS: [&str; 2] = ["alpha", "beta"];

async fn apply_writes(ops: Vec<(usize, u8, u32)>) -> Outcome {
    let store = InMemoryStore::new_arc();
    let writers: Vec<Runtime> = WRITERS
        .into_iter()
        .map(|name| {
            Runtime::new(
                name,
                Arc::clone(&store) as Arc<dyn ResourceStore>,
                vec![],
                vec![Output::exclusive::<Lease>()],
                BackoffRegistry::default(),
            )
        })
        .collect();

    let mut expected_owners: HashMap<String, String> = HashMap::new();
    let mut expected_values: HashMap<String, u32> = HashMap::new();
    let mut conflicts = 0usize;
    let mut expected_conflicts = 0usize;

    for (writer, id, value) in ops {
        let id = format!("lease-{id}");
        let name = WRITERS[writer].to_string();
        let owner = expected_owners.entry(id.clone()).or_insert_with(|| name.clone());
        if *owner == name {
            expected_values.insert(id.clone(), value);
        } else {
            expected_conflicts += 1;
        }

        match writers[writer].modify::<Lease, _>(&id, |l| l.value = value).await {
            Ok(_) => {}
            Err(Error::Store(nodestate_resources::Error::OwnerConflict { .. })) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let stored = unwrap_result(store.list(Lease::NAMESPACE, Lease::TYPE).await, "list");
    let owners = stored
        .iter()
        .map(|r| (r.metadata().id().to_string(), r.metadata().owner().to_string()))
        .collect();
    let values = stored
        .into_iter()
        .map(|r| {
            let lease = unwrap_result(Typed::<Lease>::from_resource(r), "decode");
            (lease.metadata().id().to_string(), lease.spec().value)
        })
        .collect();

    Outcome {
        owners,
        expected_owners,
        values,
        expected_values,
        conflicts,
        expected_conflicts,
    }
}

proptest! {
    /// Property: two controllers writing the same output type never overwrite
    /// each other's ids; every cross-owner write is rejected as a conflict.
    #[test]
    fn prop_foreign_writes_are_flagged(
        ops in prop::collection::vec((0usize..2, 0u8..4, any::<u32>()), 1..40),
    ) {
        let outcome = tokio_runtime().block_on(apply_writes(ops));

        prop_assert_eq!(outcome.owners, outcome.expected_owners);
        prop_assert_eq!(outcome.values, outcome.expected_values);
        prop_assert_eq!(outcome.conflicts, outcome.expected_conflicts);
    }
}

// ==========================================================================
// PROPERTY: Backoff escalation and reset
// ==========================================================================

proptest! {
    /// Property: delays never decrease, never exceed the ceiling, and the
    /// first failure after a reset waits exactly the baseline.
    #[test]
    fn prop_backoff_bounded_and_resettable(
        base_ms in 1u64..500,
        max_ms in 500u64..20_000,
        failures in 1usize..40,
    ) {
        let config = BackoffConfig::default()
            .with_base(Duration::from_millis(base_ms))
            .with_max(Duration::from_millis(max_ms));
        let registry = BackoffRegistry::new(config);

        let delays: Vec<Duration> = (0..failures).map(|_| registry.next_delay("ctrl")).collect();

        prop_assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        prop_assert!(delays.iter().all(|d| *d <= config.max));
        prop_assert_eq!(delays.first().copied(), Some(config.base));

        registry.reset("ctrl");
        prop_assert_eq!(registry.next_delay("ctrl"), config.base);
    }
}
