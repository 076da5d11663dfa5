//! The reconcile-loop abstraction shared by every controller.
//!
//! The production system drives each controller from a watch-fed work queue;
//! that machinery (informers, workqueues, event-driven dispatch) lives
//! outside this crate. What we own is the contract each reconcile function
//! honors: given a resource key, observe current state, compute one step
//! toward desired state, and report what should happen next.

use std::time::Duration;

use crate::acp::error::AcpError;

/// What a controller wants the scheduling machinery to do after one
/// reconcile pass.
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// Converged; nothing more to do until the next watch event.
    Done,
    /// Requeue right away (e.g. just transitioned out of `Initializing`).
    RequeueImmediate,
    /// Requeue after a delay (waiting on a dependency, polling, backoff).
    RequeueAfter(Duration),
    /// A non-terminal error occurred; the framework applies its own
    /// exponential backoff before retrying.
    Error(AcpError),
}

impl ReconcileOutcome {
    pub fn requeue_after_secs(secs: u64) -> Self {
        ReconcileOutcome::RequeueAfter(Duration::from_secs(secs))
    }
}

/// Identifies one resource instance for the work queue: `(namespace, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
