//! `MCPServer`: a declarative tool source (§3).

use serde::{Deserialize, Serialize};

use crate::acp::resources::EnvVar;
use crate::acp::store::{ObjectMeta, Resource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum McpTransportSpec {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: Vec<EnvVar>,
    },
    Http {
        url: String,
        approval_contact_channel: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerSpec {
    pub transport: McpTransportSpec,
}

/// One tool advertised by a connected MCP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServerStatus {
    pub connected: bool,
    pub ready: bool,
    pub status_detail: String,
    pub tools: Vec<McpToolInfo>,
}

#[derive(Debug, Clone)]
pub struct McpServerResource {
    pub meta: ObjectMeta,
    pub spec: McpServerSpec,
    pub status: McpServerStatus,
}

impl Resource for McpServerResource {
    const KIND: &'static str = "MCPServer";
    fn metadata(&self) -> &ObjectMeta {
        &self.meta
    }
    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}
