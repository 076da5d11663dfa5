//! The resource store contract (§6): a typed, versioned, watchable record
//! store with optimistic concurrency on both the main object and its status
//! subresource. The REST admission surface, CRD generation, and the backing
//! database are all out of scope; [`memory::TypedStore`] is the reference
//! implementation this crate's controllers and tests run against.

pub mod lease;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::acp::error::{AcpError, Result};

/// Common bookkeeping every resource carries, modeled loosely on a
/// Kubernetes `ObjectMeta`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    /// Bumped on every successful `Update`/`StatusUpdate`; the basis for
    /// optimistic concurrency.
    pub resource_version: u64,
    pub labels: HashMap<String, String>,
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            resource_version: 0,
            labels: HashMap::new(),
            owner_references: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// A reference to an owning resource. When `controller` is true and the
/// owner is deleted, the store cascades deletion to this object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: &'static str,
    pub name: String,
    pub controller: bool,
}

/// Trait implemented by every resource kind stored in the resource store.
pub trait Resource: Clone + Send + Sync + 'static {
    const KIND: &'static str;
    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;
}

/// A watch event as delivered to a controller's work queue.
#[derive(Debug, Clone)]
pub enum WatchEvent<T> {
    Added(T),
    Modified(T),
    Deleted(T),
}

/// The store-primitive contract described in §6, scoped to one resource kind.
#[async_trait]
pub trait ResourceStore<T: Resource>: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<T>;
    async fn list(&self, namespace: &str, label_selector: Option<(&str, &str)>) -> Result<Vec<T>>;
    async fn create(&self, record: T) -> Result<T>;
    /// Updates the spec portion; rejects with [`AcpError::Conflict`] on a
    /// stale `resource_version`.
    async fn update(&self, record: T) -> Result<T>;
    /// Updates only the status subresource, same optimistic-concurrency rule.
    async fn status_update(&self, record: T) -> Result<T>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
    fn watch(&self) -> tokio::sync::broadcast::Receiver<WatchEvent<T>>;
}

pub(crate) fn not_found(kind: &str, namespace: &str, name: &str) -> AcpError {
    AcpError::NotFound(format!("{kind} {namespace}/{name}"))
}

pub(crate) fn conflict(kind: &str, namespace: &str, name: &str) -> AcpError {
    AcpError::Conflict(format!("{kind} {namespace}/{name}"))
}
