//! `Agent`: a named LLM persona (§3).

use serde::{Deserialize, Serialize};

use crate::acp::store::{ObjectMeta, Resource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    pub llm_ref: String,
    pub system_prompt: String,
    #[serde(default)]
    pub mcp_servers: Vec<String>,
    #[serde(default)]
    pub contact_channels: Vec<String>,
    #[serde(default)]
    pub sub_agents: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Only `true` when every referenced dependency (LLM, MCPServers,
    /// ContactChannels, sub-Agents) is itself `Ready`.
    pub ready: bool,
    pub status_detail: String,
    /// Per-contact-channel readiness, consulted by the tool-catalog builder
    /// (§4.2.1) to decide whether to emit a `human_contact_*` tool.
    #[serde(default)]
    pub contact_channel_ready: std::collections::HashMap<String, bool>,
}

#[derive(Debug, Clone)]
pub struct Agent {
    pub meta: ObjectMeta,
    pub spec: AgentSpec,
    pub status: AgentStatus,
}

impl Resource for Agent {
    const KIND: &'static str = "Agent";
    fn metadata(&self) -> &ObjectMeta {
        &self.meta
    }
    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}
