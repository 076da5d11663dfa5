//! `ToolCall`: one tool invocation requested by an LLM turn (§3, §4.3).

use serde::{Deserialize, Serialize};

use crate::acp::store::{ObjectMeta, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Mcp,
    HumanContact,
    DelegateToAgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ToolCallPhase {
    Pending,
    AwaitingHumanApproval,
    ReadyToExecuteApprovedTool,
    ErrorRequestingHumanApproval,
    ToolCallRejected,
    AwaitingHumanInput,
    AwaitingSubAgent,
    Running,
    Succeeded,
    Failed,
}

impl Default for ToolCallPhase {
    fn default() -> Self {
        ToolCallPhase::Pending
    }
}

impl ToolCallPhase {
    /// Succeeded/Failed/ToolCallRejected are the three terminal outcomes a
    /// parent Task waits on (§4.2 ToolCallsPending → ReadyForLLM).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ToolCallPhase::Succeeded | ToolCallPhase::Failed | ToolCallPhase::ToolCallRejected
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallSpec {
    pub task_ref: String,
    pub tool_name: String,
    pub tool_type: ToolType,
    /// The `id` the LLM assigned this call; echoed back in the eventual tool
    /// message's `toolCallID` (§4.2 ToolCallsPending → ReadyForLLM).
    pub tool_call_id: String,
    /// Raw JSON arguments exactly as emitted by the LLM.
    pub arguments: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolCallStatus {
    pub phase: ToolCallPhase,
    /// Idempotency key for every external side effect this call makes
    /// (§4.3 Idempotency), minted once on first entry.
    #[serde(default)]
    pub external_call_id: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
    #[serde(default)]
    pub status_detail: String,
}

#[derive(Debug, Clone)]
pub struct ToolCall {
    pub meta: ObjectMeta,
    pub spec: ToolCallSpec,
    pub status: ToolCallStatus,
}

impl Resource for ToolCall {
    const KIND: &'static str = "ToolCall";
    fn metadata(&self) -> &ObjectMeta {
        &self.meta
    }
    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

/// Child name per §4.2.3: `<task>-<toolCallRequestID>-tc-<NN>`, NN 01-based
/// and zero-padded to two digits.
pub fn tool_call_child_name(task_name: &str, tool_call_request_id: &str, index_one_based: u32) -> String {
    format!("{task_name}-{tool_call_request_id}-tc-{index_one_based:02}")
}

/// Name of the synthetic `respond_to_human` ToolCall minted by the v1beta3
/// final-answer variant (§4.2.4).
pub fn respond_to_human_child_name(task_name: &str, tool_call_request_id: &str) -> String {
    format!("{task_name}-{tool_call_request_id}-respond-to-human")
}

pub const LABEL_TASK: &str = "task";
pub const LABEL_TOOLCALLREQUEST: &str = "toolcallrequest";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases_match_spec() {
        assert!(ToolCallPhase::Succeeded.is_terminal());
        assert!(ToolCallPhase::Failed.is_terminal());
        assert!(ToolCallPhase::ToolCallRejected.is_terminal());
        assert!(!ToolCallPhase::Running.is_terminal());
        assert!(!ToolCallPhase::AwaitingHumanApproval.is_terminal());
        assert!(!ToolCallPhase::AwaitingHumanInput.is_terminal());
        assert!(!ToolCallPhase::AwaitingSubAgent.is_terminal());
        assert!(!ToolCallPhase::Pending.is_terminal());
        assert!(!ToolCallPhase::ReadyToExecuteApprovedTool.is_terminal());
        assert!(!ToolCallPhase::ErrorRequestingHumanApproval.is_terminal());
    }

    #[test]
    fn child_name_is_zero_padded() {
        assert_eq!(tool_call_child_name("t1", "ab3cdef", 1), "t1-ab3cdef-tc-01");
        assert_eq!(tool_call_child_name("t1", "ab3cdef", 12), "t1-ab3cdef-tc-12");
    }
}
