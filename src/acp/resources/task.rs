//! `Task`: one reasoning session (§3, §4.2).

use serde::{Deserialize, Serialize};

use crate::acp::resources::message::Message;
use crate::acp::store::{ObjectMeta, Resource};

/// Finite states a Task's `phase` may occupy (§4.2). Once `FinalAnswer` or
/// `Failed` is reached the phase never changes again (§8 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TaskPhase {
    Initializing,
    Pending,
    ReadyForLlm,
    ToolCallsPending,
    FinalAnswer,
    Failed,
}

impl Default for TaskPhase {
    fn default() -> Self {
        TaskPhase::Initializing
    }
}

impl TaskPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskPhase::FinalAnswer | TaskPhase::Failed)
    }
}

/// Exactly one of `user_message` / `context_window` must be set (§3, §8).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    pub agent_ref: String,
    #[serde(default)]
    pub user_message: Option<String>,
    #[serde(default)]
    pub context_window: Option<Vec<Message>>,
    #[serde(default)]
    pub contact_channel_ref: Option<String>,
    /// Marks a Task as opting into the v1beta3 final-answer-via-ToolCall
    /// variant (§4.2.4). Modeled as a label on the source; here it's a
    /// first-class flag since labels otherwise play no role in this crate.
    #[serde(default)]
    pub v1beta3_respond_via_tool_call: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskStatus {
    pub phase: TaskPhase,
    #[serde(default)]
    pub trace_id: String,
    #[serde(default)]
    pub span_id: String,
    #[serde(default)]
    pub transcript: Vec<Message>,
    /// Opaque short ID minted once per LLM turn that requests tools (§4.4);
    /// empty outside `ToolCallsPending`.
    #[serde(default)]
    pub tool_call_request_id: String,
    /// First 50 characters of the originating user message, for operator UIs.
    #[serde(default)]
    pub user_message_preview: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status_detail: String,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub meta: ObjectMeta,
    pub spec: TaskSpec,
    pub status: TaskStatus,
}

impl Resource for Task {
    const KIND: &'static str = "Task";
    fn metadata(&self) -> &ObjectMeta {
        &self.meta
    }
    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}

pub const USER_MESSAGE_PREVIEW_LEN: usize = 50;

/// Truncate to at most [`USER_MESSAGE_PREVIEW_LEN`] characters, respecting
/// UTF-8 boundaries rather than byte offsets.
pub fn user_message_preview(message: &str) -> String {
    message.chars().take(USER_MESSAGE_PREVIEW_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_terminality_matches_spec_classification() {
        assert!(!TaskPhase::Initializing.is_terminal());
        assert!(!TaskPhase::Pending.is_terminal());
        assert!(!TaskPhase::ReadyForLlm.is_terminal());
        assert!(!TaskPhase::ToolCallsPending.is_terminal());
        assert!(TaskPhase::FinalAnswer.is_terminal());
        assert!(TaskPhase::Failed.is_terminal());
    }

    #[test]
    fn preview_truncates_to_fifty_chars() {
        let long = "a".repeat(80);
        assert_eq!(user_message_preview(&long).chars().count(), 50);
    }

    #[test]
    fn preview_passes_short_strings_through() {
        assert_eq!(user_message_preview("hello"), "hello");
    }
}
