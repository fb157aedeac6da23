//! In-process queue store.
//!
//! All sets live behind one mutex, so `pop` is atomic by construction.
//! Backs the pool's concurrency tests and any embedding that needs no
//! external store.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::QueueStore;
use crate::error::{Error, Result};
use crate::model::{Item, SetName};

#[derive(Debug, Default)]
pub struct MemoryStore {
    sets: Mutex<HashMap<SetName, HashSet<Item>>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose `todo` set is seeded with the given items.
    pub fn with_todo<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Item>,
    {
        let store = Self::new();
        {
            let mut sets = store.lock();
            let todo = sets.entry(SetName::Todo).or_default();
            todo.extend(items.into_iter().map(Into::into));
        }
        store
    }

    /// Make every subsequent operation fail as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Copy of one set's members, for assertions.
    pub fn snapshot(&self, set: SetName) -> HashSet<Item> {
        self.lock().get(&set).cloned().unwrap_or_default()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::StoreUnavailable("memory store marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SetName, HashSet<Item>>> {
        // A panic while holding the lock cannot leave a set half-updated.
        self.sets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn pop(&self, set: SetName) -> Result<Option<Item>> {
        self.check_available()?;
        let mut sets = self.lock();
        let Some(members) = sets.get_mut(&set) else {
            return Ok(None);
        };
        let next = members.iter().next().cloned();
        if let Some(ref item) = next {
            members.remove(item);
        }
        Ok(next)
    }

    async fn add(&self, set: SetName, item: &Item) -> Result<()> {
        self.check_available()?;
        self.lock().entry(set).or_default().insert(item.clone());
        Ok(())
    }

    async fn cardinality(&self, set: SetName) -> Result<u64> {
        self.check_available()?;
        Ok(self.lock().get(&set).map_or(0, |m| m.len() as u64))
    }

    async fn clear(&self, set: SetName) -> Result<()> {
        self.check_available()?;
        self.lock().remove(&set);
        Ok(())
    }

    async fn contains(&self, set: SetName, item: &Item) -> Result<bool> {
        self.check_available()?;
        Ok(self.lock().get(&set).is_some_and(|m| m.contains(item)))
    }

    async fn members(&self, set: SetName) -> Result<Vec<Item>> {
        self.check_available()?;
        Ok(self.snapshot(set).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn pop_on_empty_set_returns_none() {
        let store = MemoryStore::new();
        assert!(store.pop(SetName::Todo).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let store = MemoryStore::new();
        let item = Item::from("a@x.com");
        store.add(SetName::Accepted, &item).await.unwrap();
        store.add(SetName::Accepted, &item).await.unwrap();
        assert_eq!(store.cardinality(SetName::Accepted).await.unwrap(), 1);
        assert!(store.contains(SetName::Accepted, &item).await.unwrap());
    }

    #[tokio::test]
    async fn clear_empties_only_the_named_set() {
        let store = MemoryStore::with_todo(["a", "b"]);
        store.add(SetName::Rejected, &Item::from("c")).await.unwrap();
        store.clear(SetName::Todo).await.unwrap();
        assert_eq!(store.cardinality(SetName::Todo).await.unwrap(), 0);
        assert_eq!(store.cardinality(SetName::Rejected).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_operation() {
        let store = MemoryStore::with_todo(["a"]);
        store.set_unavailable(true);
        assert!(matches!(
            store.pop(SetName::Todo).await,
            Err(Error::StoreUnavailable(_))
        ));
        assert!(store.add(SetName::Todo, &Item::from("b")).await.is_err());
        store.set_unavailable(false);
        assert_eq!(store.cardinality(SetName::Todo).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_pops_never_return_the_same_item() {
        let items: Vec<String> = (0..500).map(|i| format!("user{i}@x.com")).collect();
        let store = Arc::new(MemoryStore::with_todo(items.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(item) = store.pop(SetName::Todo).await.unwrap() {
                    got.push(item);
                }
                got
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for item in handle.await.unwrap() {
                assert!(seen.insert(item), "item popped twice");
            }
        }
        assert_eq!(seen.len(), items.len());
    }
}
