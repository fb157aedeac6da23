//! Work queue store: the single source of truth for item classification.
//!
//! The engine only relies on set semantics. `pop` must be atomic across
//! concurrent callers; every at-most-once guarantee in the pool rests on it.

pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::{DEFAULT_NAMESPACE, RedisStore};

use crate::error::Result;
use crate::model::{Item, SetName, Stats};
use crate::telemetry::metrics;
use async_trait::async_trait;
use opentelemetry::KeyValue;

/// Set-based store holding `todo`, `accepted` and `rejected` membership.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Atomically remove and return an arbitrary member, or `None` when empty.
    async fn pop(&self, set: SetName) -> Result<Option<Item>>;

    /// Idempotent insert.
    async fn add(&self, set: SetName, item: &Item) -> Result<()>;

    /// Current member count. Not consistent with concurrent pops.
    async fn cardinality(&self, set: SetName) -> Result<u64>;

    /// Remove all members.
    async fn clear(&self, set: SetName) -> Result<()>;

    /// Membership test.
    async fn contains(&self, set: SetName, item: &Item) -> Result<bool>;

    /// Snapshot of all members, in no particular order.
    async fn members(&self, set: SetName) -> Result<Vec<Item>>;
}

/// Read the cardinality of all three sets and publish them as depth gauges.
pub async fn stats(store: &dyn QueueStore) -> Result<Stats> {
    let stats = Stats {
        todo: store.cardinality(SetName::Todo).await?,
        accepted: store.cardinality(SetName::Accepted).await?,
        rejected: store.cardinality(SetName::Rejected).await?,
    };
    let depth = metrics::queue_depth();
    for (set, count) in [
        (SetName::Todo, stats.todo),
        (SetName::Accepted, stats.accepted),
        (SetName::Rejected, stats.rejected),
    ] {
        depth.record(count, &[KeyValue::new("set", set.to_string())]);
    }
    Ok(stats)
}

/// Clear all three sets, used when re-initializing a run.
pub async fn clear_all(store: &dyn QueueStore) -> Result<()> {
    for set in SetName::ALL {
        store.clear(set).await?;
    }
    Ok(())
}
