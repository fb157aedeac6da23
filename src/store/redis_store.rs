//! Redis-backed queue store.
//!
//! Each set is a Redis set under `<namespace>:<key>`, so a run never touches
//! unrelated data in the same instance. `SPOP` is atomic on the server,
//! which is what gives workers exclusive ownership of a popped item.
//! The logical database is chosen through the URL path (`redis://host/1`).

use async_trait::async_trait;
use opentelemetry::KeyValue;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use super::QueueStore;
use crate::error::{Error, Result};
use crate::model::{Item, SetName};
use crate::telemetry::metrics;

/// Default namespace, shared with earlier runs of the tool.
pub const DEFAULT_NAMESPACE: &str = "email_cleaner";

pub struct RedisStore {
    connection: MultiplexedConnection,
    namespace: String,
}

impl RedisStore {
    /// Connect to Redis and scope all keys under `namespace`.
    pub async fn connect(url: &str, namespace: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Config(format!("invalid redis url: {e}")))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        Ok(Self {
            connection,
            namespace: namespace.to_string(),
        })
    }

    /// Fully-qualified key for a set.
    pub fn key(&self, set: SetName) -> String {
        format!("{}:{}", self.namespace, set.key())
    }

    /// Round-trip a PING.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn conn(&self) -> MultiplexedConnection {
        // Multiplexed connections are cheap handles onto one socket.
        self.connection.clone()
    }

    fn record(&self, set: SetName, operation: &'static str) {
        metrics::queue_operations().add(
            1,
            &[
                KeyValue::new("set", set.to_string()),
                KeyValue::new("operation", operation),
            ],
        );
    }
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn pop(&self, set: SetName) -> Result<Option<Item>> {
        let popped: Option<String> = self.conn().spop(self.key(set)).await?;
        self.record(set, if popped.is_some() { "pop" } else { "pop_empty" });
        Ok(popped.map(Item))
    }

    async fn add(&self, set: SetName, item: &Item) -> Result<()> {
        let _: () = self.conn().sadd(self.key(set), item.as_str()).await?;
        self.record(set, "add");
        Ok(())
    }

    async fn cardinality(&self, set: SetName) -> Result<u64> {
        let count: u64 = self.conn().scard(self.key(set)).await?;
        self.record(set, "cardinality");
        Ok(count)
    }

    async fn clear(&self, set: SetName) -> Result<()> {
        let _: () = self.conn().del(self.key(set)).await?;
        self.record(set, "clear");
        Ok(())
    }

    async fn contains(&self, set: SetName, item: &Item) -> Result<bool> {
        let present: bool = self.conn().sismember(self.key(set), item.as_str()).await?;
        self.record(set, "contains");
        Ok(present)
    }

    async fn members(&self, set: SetName) -> Result<Vec<Item>> {
        let members: Vec<String> = self.conn().smembers(self.key(set)).await?;
        self.record(set, "members");
        Ok(members.into_iter().map(Item).collect())
    }
}
