//! In-memory [`ResourceStore`] implementation.
//!
//! Backs every controller and integration test in this crate. Durability and
//! distribution are someone else's problem (§3: "external"); what this type
//! reproduces faithfully is the *contract*: optimistic concurrency on
//! `resource_version`, and a broadcast watch stream fed by every mutation.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

use super::{conflict, not_found, ObjectMeta, Resource, ResourceStore, WatchEvent};
use crate::acp::error::{AcpError, Result};

const WATCH_CHANNEL_CAPACITY: usize = 1024;

/// An in-memory table for one resource kind, keyed by `(namespace, name)`.
pub struct TypedStore<T: Resource> {
    records: RwLock<HashMap<(String, String), T>>,
    watch_tx: broadcast::Sender<WatchEvent<T>>,
}

impl<T: Resource> TypedStore<T> {
    pub fn new() -> Self {
        let (watch_tx, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            records: RwLock::new(HashMap::new()),
            watch_tx,
        }
    }
}

impl<T: Resource> Default for TypedStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn key(namespace: &str, name: &str) -> (String, String) {
    (namespace.to_string(), name.to_string())
}

#[async_trait]
impl<T: Resource> ResourceStore<T> for TypedStore<T> {
    async fn get(&self, namespace: &str, name: &str) -> Result<T> {
        self.records
            .read()
            .await
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| not_found(T::KIND, namespace, name))
    }

    async fn list(&self, namespace: &str, label_selector: Option<(&str, &str)>) -> Result<Vec<T>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.metadata().namespace == namespace)
            .filter(|r| match label_selector {
                Some((k, v)) => r.metadata().labels.get(k).map(|lv| lv == v).unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn create(&self, mut record: T) -> Result<T> {
        let mut records = self.records.write().await;
        let meta = record.metadata().clone();
        let k = key(&meta.namespace, &meta.name);
        if records.contains_key(&k) {
            return Err(AcpError::Conflict(format!(
                "{} {}/{} already exists",
                T::KIND,
                meta.namespace,
                meta.name
            )));
        }
        record.metadata_mut().resource_version = 1;
        records.insert(k, record.clone());
        let _ = self.watch_tx.send(WatchEvent::Added(record.clone()));
        Ok(record)
    }

    async fn update(&self, mut record: T) -> Result<T> {
        let mut records = self.records.write().await;
        let meta = record.metadata().clone();
        let k = key(&meta.namespace, &meta.name);
        let current = records
            .get(&k)
            .ok_or_else(|| not_found(T::KIND, &meta.namespace, &meta.name))?;
        if current.metadata().resource_version != meta.resource_version {
            return Err(conflict(T::KIND, &meta.namespace, &meta.name));
        }
        record.metadata_mut().resource_version += 1;
        records.insert(k, record.clone());
        let _ = self.watch_tx.send(WatchEvent::Modified(record.clone()));
        Ok(record)
    }

    async fn status_update(&self, record: T) -> Result<T> {
        // Status writes go through the same optimistic-concurrency path as
        // spec updates; the store doesn't distinguish the two subresources
        // beyond bumping the same version counter.
        self.update(record).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let mut records = self.records.write().await;
        let removed = records
            .remove(&key(namespace, name))
            .ok_or_else(|| not_found(T::KIND, namespace, name))?;
        let _ = self.watch_tx.send(WatchEvent::Deleted(removed));
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent<T>> {
        self.watch_tx.subscribe()
    }
}

/// Helper for controllers that need to re-read-then-write status: fetches
/// the current record, applies `mutate`, and submits the status update,
/// retrying once on a lost optimistic-concurrency race.
pub async fn retry_status_update<T, S, F>(store: &S, namespace: &str, name: &str, mutate: F) -> Result<T>
where
    T: Resource,
    S: ResourceStore<T> + ?Sized,
    F: Fn(&mut T),
{
    for attempt in 0..2 {
        let mut current = store.get(namespace, name).await?;
        mutate(&mut current);
        match store.status_update(current).await {
            Ok(updated) => return Ok(updated),
            Err(AcpError::Conflict(_)) if attempt == 0 => continue,
            Err(e) => return Err(e),
        }
    }
    Err(conflict(T::KIND, namespace, name))
}

/// Test-only no-frills constructor for an `ObjectMeta` at version 0, useful
/// when building fixtures that will go through `create`.
pub fn fresh_meta(namespace: &str, name: &str) -> ObjectMeta {
    ObjectMeta::new(namespace, name)
}
