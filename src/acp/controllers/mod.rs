//! Controllers: one reconcile function per resource kind (§2 "Validation
//! controllers", §4.2, §4.3). Each is `Reconcile(key) -> ReconcileOutcome`
//! (§9 "source-pattern → abstraction mapping"); the watch-fed work-queue
//! dispatch that drives these in the real system lives in [`crate::acp::runtime`].

pub mod agent_controller;
pub mod contactchannel_controller;
pub mod llm_controller;
pub mod mcpserver_controller;
pub mod task_controller;
pub mod toolcall_controller;

/// Health-maintenance / readiness-poll cadence shared by the validation
/// controllers (§4.1 "Health maintenance").
pub const READY_REQUEUE_SECS: u64 = 600;
pub const TRANSIENT_REQUEUE_SECS: u64 = 30;
/// §4.2/§4.3 polling cadence for dependency-not-ready and in-flight waits.
pub const DEPENDENCY_REQUEUE_SECS: u64 = 5;
