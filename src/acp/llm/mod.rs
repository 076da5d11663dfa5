//! Uniform LLM request/response abstraction over heterogeneous providers
//! (§6 "LLM provider API").
//!
//! Every concrete client hides its provider's wire format behind
//! [`LlmClient::send_request`]; the Task controller never branches on
//! provider identity once a client is constructed.

pub mod clients;
pub mod provider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::acp::resources::message::{Message, ToolCallRequest};

/// One entry in the tool catalog offered alongside a chat request (§4.2.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

/// The assistant turn an LLM call produces. Per §4.2.2, when `tool_calls` is
/// non-empty the caller must discard `content` and take the tool-call branch
/// regardless of whether text is also present.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl LlmResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// `statusCode` must be propagated whenever the failure was HTTP-based so
/// the Task error classifier (§4.2 step 6) can tell terminal 4xx apart from
/// retryable 5xx/timeouts. `status_code == None` models non-HTTP failures
/// (connection refused, timeout, cancellation).
#[derive(Debug, Clone)]
pub struct LlmRequestError {
    pub status_code: Option<u16>,
    pub message: String,
}

impl std::fmt::Display for LlmRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "LLM request failed with status {code}: {}", self.message),
            None => write!(f, "LLM request error: {}", self.message),
        }
    }
}

impl std::error::Error for LlmRequestError {}

impl LlmRequestError {
    /// §4.2 step 6: HTTP status in [400, 500) is terminal, everything else
    /// (5xx, no status at all) is retried.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status_code, Some(code) if (400..500).contains(&code))
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model_name(&self) -> &str;

    async fn send_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse, LlmRequestError>;
}
