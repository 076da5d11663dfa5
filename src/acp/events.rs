//! Named events emitted by controllers as they drive a resource to its next
//! phase. Mirrors the observability layer CloudLLM's `event` module provides
//! for agents: a single callback trait with a default no-op, so a caller only
//! implements the kinds it cares about. Emitting events never blocks or fails
//! a reconcile — handlers are fire-and-forget.

use async_trait::async_trait;
use serde_json::Value;

/// A named event tied to a resource, analogous to a Kubernetes `Event` object.
#[derive(Debug, Clone)]
pub struct ResourceEvent {
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
    /// Short machine-readable reason, e.g. `"LLMFinalAnswer"`, `"LLMRequestFailed4xx"`.
    pub reason: &'static str,
    pub message: String,
    pub detail: Option<Value>,
}

impl ResourceEvent {
    pub fn new(
        kind: &'static str,
        namespace: impl Into<String>,
        name: impl Into<String>,
        reason: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
            reason,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Receives events emitted during reconciliation.
///
/// The default [`TracingEventRecorder`] just logs structured `tracing` events;
/// production deployments typically also fan this out to the resource store's
/// own event subresource, which is outside this crate's scope.
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, event: ResourceEvent);
}

/// Default recorder: turns every event into a structured `tracing::info!` call.
pub struct TracingEventRecorder;

#[async_trait]
impl EventRecorder for TracingEventRecorder {
    async fn record(&self, event: ResourceEvent) {
        tracing::info!(
            kind = event.kind,
            namespace = %event.namespace,
            name = %event.name,
            reason = event.reason,
            detail = ?event.detail,
            "{}",
            event.message
        );
    }
}
