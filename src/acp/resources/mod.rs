//! Typed resource definitions (§3 Data Model).
//!
//! Every resource is a `{meta, spec, status}` record implementing
//! [`crate::acp::store::Resource`] so it can live in a
//! [`crate::acp::store::memory::TypedStore`]. Names are expected to be
//! DNS-1123 labels; this crate doesn't re-validate that beyond what the
//! admission surface (out of scope) would already have enforced.

pub mod agent;
pub mod contactchannel;
pub mod llm;
pub mod mcpserver;
pub mod message;
pub mod task;
pub mod toolcall;

pub use agent::{Agent, AgentSpec, AgentStatus};
pub use contactchannel::{ContactChannel, ContactChannelSpec, ContactChannelStatus, ContactChannelType};
pub use llm::{LlmResource, LlmSpec, LlmStatus, Provider};
pub use mcpserver::{McpServerResource, McpServerSpec, McpServerStatus, McpTransportSpec, McpToolInfo};
pub use message::{FunctionCall, Message, Role, ToolCallRequest};
pub use task::{Task, TaskPhase, TaskSpec, TaskStatus};
pub use toolcall::{ToolCall, ToolCallPhase, ToolCallSpec, ToolCallStatus, ToolType};

/// Env var entry shared by MCPServer stdio transport config (§3, §4.1).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: Option<String>,
    pub value_from_secret: Option<crate::acp::secrets::SecretKeyRef>,
}
