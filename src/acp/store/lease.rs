//! Distributed leases: named, TTL-bounded locks used to serialize the LLM
//! step of a Task across controller-manager replicas.
//!
//! A lease is acquirable when it has never been held, has expired, or is
//! already held by the caller. Deletion on release is opportunistic —
//! expiration is what actually guarantees forward progress if a holder dies
//! mid-step.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::acp::error::Result;
use crate::acp::store::{ObjectMeta, Resource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseSpec {
    pub holder_identity: String,
    pub lease_duration_seconds: i64,
    pub acquire_time: DateTime<Utc>,
    pub renew_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Lease {
    pub meta: ObjectMeta,
    pub spec: LeaseSpec,
}

impl Resource for Lease {
    const KIND: &'static str = "Lease";
    fn metadata(&self) -> &ObjectMeta {
        &self.meta
    }
    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

/// Lease name for a Task's LLM-step mutex, as specified in §3.
pub fn lease_name_for_task(task_name: &str) -> String {
    format!("task-llm-{task_name}")
}

/// A minimal lease store: acquire-or-renew, release, matching the operations
/// the §6 "Lease sub-API" promises on top of the generic store primitives.
pub struct LeaseStore {
    namespace: String,
    leases: RwLock<HashMap<String, LeaseSpec>>,
}

impl LeaseStore {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            leases: RwLock::new(HashMap::new()),
        }
    }

    /// Attempt to acquire (or renew) the named lease for `holder`.
    ///
    /// Returns `Ok(true)` if the caller now holds the lease, `Ok(false)` if
    /// someone else holds a non-expired lease.
    pub async fn try_acquire(
        &self,
        lease_name: &str,
        holder: &str,
        duration_seconds: i64,
    ) -> Result<bool> {
        let mut leases = self.leases.write().await;
        let now = Utc::now();

        let acquirable = match leases.get(lease_name) {
            None => true,
            Some(existing) => {
                existing.holder_identity == holder
                    || existing.renew_time + ChronoDuration::seconds(existing.lease_duration_seconds)
                        < now
            }
        };

        if !acquirable {
            return Ok(false);
        }

        let acquire_time = leases
            .get(lease_name)
            .filter(|e| e.holder_identity == holder)
            .map(|e| e.acquire_time)
            .unwrap_or(now);

        leases.insert(
            lease_name.to_string(),
            LeaseSpec {
                holder_identity: holder.to_string(),
                lease_duration_seconds: duration_seconds,
                acquire_time,
                renew_time: now,
            },
        );
        Ok(true)
    }

    /// Delete the lease. Opportunistic: missing leases are not an error.
    pub async fn release(&self, lease_name: &str, holder: &str) -> Result<()> {
        let mut leases = self.leases.write().await;
        if let Some(existing) = leases.get(lease_name) {
            if existing.holder_identity == holder {
                leases.remove(lease_name);
            }
        }
        Ok(())
    }

    pub async fn get(&self, lease_name: &str) -> Option<LeaseSpec> {
        self.leases.read().await.get(lease_name).cloned()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_holder_blocked_while_lease_is_live() {
        let store = LeaseStore::new("default");
        assert!(store.try_acquire("task-llm-x", "pod-a", 30).await.unwrap());
        assert!(!store.try_acquire("task-llm-x", "pod-b", 30).await.unwrap());
    }

    #[tokio::test]
    async fn same_holder_can_renew() {
        let store = LeaseStore::new("default");
        assert!(store.try_acquire("task-llm-x", "pod-a", 30).await.unwrap());
        assert!(store.try_acquire("task-llm-x", "pod-a", 30).await.unwrap());
    }

    #[tokio::test]
    async fn release_then_reacquire_by_other_holder() {
        let store = LeaseStore::new("default");
        store.try_acquire("task-llm-x", "pod-a", 30).await.unwrap();
        store.release("task-llm-x", "pod-a").await.unwrap();
        assert!(store.try_acquire("task-llm-x", "pod-b", 30).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lease_is_acquirable_by_new_holder() {
        let store = LeaseStore::new("default");
        let mut leases = store.leases.write().await;
        leases.insert(
            "task-llm-x".to_string(),
            LeaseSpec {
                holder_identity: "pod-a".to_string(),
                lease_duration_seconds: 30,
                acquire_time: Utc::now() - ChronoDuration::seconds(120),
                renew_time: Utc::now() - ChronoDuration::seconds(120),
            },
        );
        drop(leases);
        assert!(store.try_acquire("task-llm-x", "pod-b", 30).await.unwrap());
    }
}
