//! Error taxonomy shared across controllers.
//!
//! Mirrors the classification in the design's error-handling section: each
//! variant is either terminal (the owning resource moves to `Failed`/`Error`
//! and stops) or non-terminal (the reconcile is retried, phase unchanged).
//! [`AcpError::is_terminal`] is the single source of truth callers should
//! consult instead of re-deriving the rule at each call site.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AcpError>;

#[derive(Debug, Error)]
pub enum AcpError {
    /// The resource spec itself is invalid; reconciling again won't help.
    #[error("spec invalid: {0}")]
    SpecInvalid(String),

    /// A referenced dependency (Agent, ContactChannel, MCPServer...) is not
    /// `Ready` yet. Non-terminal; caller should requeue.
    #[error("dependency not ready: {0}")]
    DependencyNotReady(String),

    /// The resolved secret reference could not be found.
    #[error("credential missing: {0}")]
    CredentialMissing(String),

    /// The resolved secret exists but its contents are unusable (e.g. empty key).
    #[error("credential invalid: {0}")]
    CredentialInvalid(String),

    /// A network/subprocess/transport call failed in a way that's worth retrying.
    #[error("transport error: {0}")]
    Transport(String),

    /// The LLM provider returned a 4xx: the request itself is malformed, retrying
    /// with the same transcript would fail identically. Terminal.
    #[error("LLM request failed with status {status}: {message}")]
    LlmClientError { status: u16, message: String },

    /// The LLM provider returned a 5xx, timed out, or the call was cancelled.
    /// Non-terminal.
    #[error("LLM request error: {0}")]
    LlmServerError(String),

    /// A tool itself reported failure. Surfaced to the LLM as a tool message;
    /// never causes the parent Task to fail.
    #[error("tool execution error: {0}")]
    ToolExecution(String),

    /// A human approver rejected a ToolCall. First-class terminal outcome,
    /// not really an "error" but routed through this type for convenience.
    #[error("approval rejected: {0}")]
    ApprovalRejected(String),

    /// The named resource does not exist in the store.
    #[error("not found: {0}")]
    NotFound(String),

    /// An optimistic-concurrency write lost the race; caller should re-read
    /// the resource and retry.
    #[error("conflict updating {0}")]
    Conflict(String),

    /// Generic catch-all for conditions that don't fit the above but still
    /// need to travel as an `AcpError` (e.g. lock poisoning, serialization bugs).
    #[error("internal error: {0}")]
    Internal(String),
}

impl AcpError {
    /// Terminal errors move the owning resource to `Failed` and stop
    /// reconciling it forever. Everything else is retried.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AcpError::SpecInvalid(_)
                | AcpError::CredentialMissing(_)
                | AcpError::CredentialInvalid(_)
                | AcpError::LlmClientError { .. }
                | AcpError::ApprovalRejected(_)
        )
    }
}

impl From<serde_json::Error> for AcpError {
    fn from(e: serde_json::Error) -> Self {
        AcpError::Internal(format!("json: {e}"))
    }
}
