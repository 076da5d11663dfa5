//! The MCPServer connection manager (§4.1): a process-wide registry of live
//! connections to external tool-providing subprocesses or HTTP endpoints.

pub mod protocol;
pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::acp::error::{AcpError, Result};
use crate::acp::mcp::protocol::{default_input_schema, CallToolResult, ListToolsResult};
use crate::acp::mcp::transport::{HttpTransport, McpTransport, StdioTransport};
use crate::acp::resources::mcpserver::{McpToolInfo, McpTransportSpec};
use crate::acp::resources::EnvVar;
use crate::acp::secrets::SecretStore;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const CALL_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// The separator `FindServerForTool` splits on. Per §9's open question, a
/// tool name that itself contains `__` resolves first-split-wins: the
/// substring before the *first* occurrence is taken as the server name.
pub const TOOL_NAME_SEPARATOR: &str = "__";

struct ConnectionRecord {
    transport_spec: McpTransportSpec,
    client: Arc<dyn McpTransport>,
    tools: Vec<McpToolInfo>,
}

/// The result of parsing a catalog tool name of the form `server__tool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    pub server: String,
    pub tool: String,
}

pub struct McpConnectionManager {
    connections: RwLock<HashMap<String, ConnectionRecord>>,
}

impl McpConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Idempotent: a record with an identical transport spec already present
    /// is left untouched (§4.1, §8 "Connect is idempotent").
    pub async fn connect(
        &self,
        server_name: &str,
        spec: &McpTransportSpec,
        secrets: &dyn SecretStore,
        namespace: &str,
    ) -> Result<Vec<McpToolInfo>> {
        {
            let connections = self.connections.read().await;
            if let Some(existing) = connections.get(server_name) {
                if &existing.transport_spec == spec {
                    return Ok(existing.tools.clone());
                }
            }
        }

        // Tear down any stale record for this name before reconnecting.
        self.disconnect(server_name).await.ok();

        let client: Arc<dyn McpTransport> = match spec {
            McpTransportSpec::Stdio { command, args, env } => {
                let resolved_env = resolve_env(env, secrets, namespace).await?;
                let transport = tokio::time::timeout(
                    CONNECT_TIMEOUT,
                    StdioTransport::spawn(command, args, &resolved_env),
                )
                .await
                .map_err(|_| AcpError::Transport(format!("timed out spawning MCP server {server_name}")))??;
                Arc::new(transport)
            }
            McpTransportSpec::Http { url, .. } => Arc::new(HttpTransport::new(url.clone())),
        };

        let result = self.initialize_and_list_tools(client.clone()).await;
        let tools = match result {
            Ok(tools) => tools,
            Err(e) => {
                let _ = client.close().await;
                return Err(e);
            }
        };

        let mut connections = self.connections.write().await;
        connections.insert(
            server_name.to_string(),
            ConnectionRecord {
                transport_spec: spec.clone(),
                client,
                tools: tools.clone(),
            },
        );
        Ok(tools)
    }

    async fn initialize_and_list_tools(&self, client: Arc<dyn McpTransport>) -> Result<Vec<McpToolInfo>> {
        tokio::time::timeout(CONNECT_TIMEOUT, async {
            client
                .call(
                    "initialize",
                    Some(serde_json::json!({ "protocolVersion": "2024-11-05" })),
                )
                .await?;

            let response = client.call("list-tools", None).await?;
            if let Some(error) = response.error {
                return Err(AcpError::Transport(format!("list-tools failed: {}", error.message)));
            }
            let result: ListToolsResult =
                serde_json::from_value(response.result.unwrap_or_else(|| serde_json::json!({})))?;
            Ok(result
                .tools
                .into_iter()
                .map(|t| McpToolInfo {
                    name: t.name,
                    description: t.description,
                    input_schema: t.input_schema.unwrap_or_else(default_input_schema),
                })
                .collect())
        })
        .await
        .map_err(|_| AcpError::Transport("timed out during initialize/list-tools".to_string()))?
    }

    pub async fn disconnect(&self, server_name: &str) -> Result<()> {
        let record = self.connections.write().await.remove(server_name);
        if let Some(record) = record {
            let _ = tokio::time::timeout(DISCONNECT_TIMEOUT, record.client.close()).await;
        }
        Ok(())
    }

    pub async fn get_tools(&self, server_name: &str) -> Option<Vec<McpToolInfo>> {
        self.connections.read().await.get(server_name).map(|r| r.tools.clone())
    }

    pub async fn call_tool(
        &self,
        server_name: &str,
        tool_name: &str,
        arguments: serde_json::Value,
    ) -> Result<(String, Option<String>)> {
        let client = {
            let connections = self.connections.read().await;
            let record = connections
                .get(server_name)
                .ok_or_else(|| AcpError::NotFound(format!("MCP server {server_name} has no live connection")))?;
            record.client.clone()
        };

        let response = tokio::time::timeout(
            CALL_TOOL_TIMEOUT,
            client.call(
                "call-tool",
                Some(serde_json::json!({ "name": tool_name, "arguments": arguments })),
            ),
        )
        .await
        .map_err(|_| AcpError::Transport(format!("call-tool timed out for {server_name}/{tool_name}")))??;

        if let Some(error) = response.error {
            return Ok((String::new(), Some(error.message)));
        }

        let result: CallToolResult =
            serde_json::from_value(response.result.unwrap_or_else(|| serde_json::json!({})))?;
        let text = result.text();
        if result.is_error {
            Ok((text.clone(), Some(if text.is_empty() { "tool reported an error".to_string() } else { text })))
        } else {
            Ok((text, None))
        }
    }

    /// Parse `server__tool` and confirm both the server and the tool name
    /// exist in its current enumeration (§4.1 FindServerForTool).
    pub async fn find_server_for_tool(&self, full_name: &str) -> Option<ResolvedTool> {
        let (server, tool) = full_name.split_once(TOOL_NAME_SEPARATOR)?;
        let connections = self.connections.read().await;
        let record = connections.get(server)?;
        if record.tools.iter().any(|t| t.name == tool) {
            Some(ResolvedTool {
                server: server.to_string(),
                tool: tool.to_string(),
            })
        } else {
            None
        }
    }
}

impl Default for McpConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// For each env entry: inline value wins, else resolve the secret ref, else
/// skip the entry entirely (§4.1 "Environment resolution").
async fn resolve_env(
    env: &[EnvVar],
    secrets: &dyn SecretStore,
    namespace: &str,
) -> Result<HashMap<String, String>> {
    let mut resolved = HashMap::new();
    for entry in env {
        if entry.name.is_empty() {
            continue;
        }
        if let Some(value) = &entry.value {
            resolved.insert(entry.name.clone(), value.clone());
        } else if let Some(secret_ref) = &entry.value_from_secret {
            let bytes = crate::acp::secrets::resolve_key(secrets, namespace, secret_ref).await?;
            let value = String::from_utf8(bytes)
                .map_err(|_| AcpError::CredentialInvalid(format!("secret value for {} is not UTF-8", entry.name)))?;
            resolved.insert(entry.name.clone(), value);
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acp::secrets::InMemorySecretStore;

    #[tokio::test]
    async fn resolve_env_prefers_inline_value_over_secret() {
        let store = InMemorySecretStore::new();
        let env = vec![EnvVar {
            name: "TOKEN".to_string(),
            value: Some("inline".to_string()),
            value_from_secret: None,
        }];
        let resolved = resolve_env(&env, &store, "default").await.unwrap();
        assert_eq!(resolved.get("TOKEN"), Some(&"inline".to_string()));
    }

    #[tokio::test]
    async fn resolve_env_skips_entries_with_empty_name() {
        let store = InMemorySecretStore::new();
        let env = vec![EnvVar {
            name: String::new(),
            value: Some("ignored".to_string()),
            value_from_secret: None,
        }];
        let resolved = resolve_env(&env, &store, "default").await.unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn find_server_for_tool_uses_first_split_wins() {
        // documents the §9 open question resolution without needing a live
        // connection: splitting "a__b__c" on the first "__" yields ("a", "b__c").
        assert_eq!("a__b__c".split_once(TOOL_NAME_SEPARATOR), Some(("a", "b__c")));
    }

    #[tokio::test]
    async fn find_server_for_tool_returns_none_when_server_not_connected() {
        let manager = McpConnectionManager::new();
        assert!(manager.find_server_for_tool("fetch__fetch").await.is_none());
    }

    #[tokio::test]
    async fn get_tools_returns_none_for_unknown_server() {
        let manager = McpConnectionManager::new();
        assert!(manager.get_tools("nope").await.is_none());
    }
}
