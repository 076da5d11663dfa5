//! Tool catalog construction (§4.2.1): the set of tools presented to the LLM
//! on one request, assembled fresh each LLM step.

use crate::acp::llm::ToolDefinition;
use crate::acp::mcp::McpConnectionManager;
use crate::acp::resources::contactchannel::ContactChannelType;
use crate::acp::resources::toolcall::ToolType;
use crate::acp::resources::Agent;

/// One catalog entry plus the internal routing tag that never reaches the
/// LLM but is recorded into the resulting ToolCall's `toolType`.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub definition: ToolDefinition,
    pub tool_type: ToolType,
}

/// A contact channel available to an agent, keyed by name with its type and
/// readiness already resolved by the caller (the Agent controller is the
/// source of truth for both).
pub struct ContactChannelRef<'a> {
    pub name: &'a str,
    pub channel_type: ContactChannelType,
}

pub struct SubAgentRef<'a> {
    pub name: &'a str,
    pub description: &'a str,
}

const MESSAGE_PARAMETER_SCHEMA: &str = r#"{"type":"object","properties":{"message":{"type":"string"}},"required":["message"]}"#;

fn message_parameter_schema() -> serde_json::Value {
    serde_json::from_str(MESSAGE_PARAMETER_SCHEMA).expect("constant is valid JSON")
}

/// Build the full catalog for one LLM step. `contact_channels` must already
/// be filtered/annotated by the caller using the Agent's
/// `contact_channel_ready` map (§4.2.1 "whose Ready bit is set").
pub async fn build_tool_catalog(
    agent: &Agent,
    mcp: &McpConnectionManager,
    contact_channels: &[ContactChannelRef<'_>],
    sub_agents: &[SubAgentRef<'_>],
) -> Vec<CatalogEntry> {
    let mut catalog = Vec::new();

    for server_name in &agent.spec.mcp_servers {
        let Some(tools) = mcp.get_tools(server_name).await else {
            tracing::warn!(server = %server_name, "mcp server has no live connection, skipping from catalog");
            continue;
        };
        for tool in tools {
            catalog.push(CatalogEntry {
                definition: ToolDefinition {
                    name: format!("{server_name}__{}", tool.name),
                    description: tool.description,
                    parameters_schema: tool.input_schema,
                },
                tool_type: ToolType::Mcp,
            });
        }
    }

    for channel in contact_channels {
        let name = match channel.channel_type {
            ContactChannelType::Email => format!("human_contact_email_{}", channel.name),
            ContactChannelType::Slack => format!("human_contact_slack_{}", channel.name),
        };
        catalog.push(CatalogEntry {
            definition: ToolDefinition {
                name,
                description: format!("Contact a human via the {} channel.", channel.name),
                parameters_schema: message_parameter_schema(),
            },
            tool_type: ToolType::HumanContact,
        });
    }

    for sub_agent in sub_agents {
        catalog.push(CatalogEntry {
            definition: ToolDefinition {
                name: format!("delegate_to_agent__{}", sub_agent.name),
                description: sub_agent.description.to_string(),
                parameters_schema: message_parameter_schema(),
            },
            tool_type: ToolType::DelegateToAgent,
        });
    }

    catalog
}

/// Narrow a catalog down to the bare [`ToolDefinition`]s an [`LlmClient`]
/// request needs, dropping the internal routing tag.
///
/// [`LlmClient`]: crate::acp::llm::LlmClient
pub fn tool_definitions(catalog: &[CatalogEntry]) -> Vec<ToolDefinition> {
    catalog.iter().map(|entry| entry.definition.clone()).collect()
}

/// Find the routing tag for a catalog entry by its emitted name, used when
/// creating a ToolCall child so its `toolType` can be set (§4.2.1 last
/// paragraph).
pub fn tool_type_for(catalog: &[CatalogEntry], name: &str) -> Option<ToolType> {
    catalog
        .iter()
        .find(|entry| entry.definition.name == name)
        .map(|entry| entry.tool_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acp::resources::{AgentSpec, AgentStatus};
    use crate::acp::store::ObjectMeta;

    fn sample_agent() -> Agent {
        Agent {
            meta: ObjectMeta::new("default", "my-agent"),
            spec: AgentSpec {
                llm_ref: "my-llm".to_string(),
                system_prompt: "you are helpful".to_string(),
                mcp_servers: vec![],
                contact_channels: vec![],
                sub_agents: vec![],
                description: None,
            },
            status: AgentStatus::default(),
        }
    }

    #[tokio::test]
    async fn catalog_includes_human_contact_and_delegate_entries() {
        let agent = sample_agent();
        let mcp = McpConnectionManager::new();
        let channels = [ContactChannelRef {
            name: "oncall",
            channel_type: ContactChannelType::Slack,
        }];
        let sub_agents = [SubAgentRef {
            name: "researcher",
            description: "does research",
        }];

        let catalog = build_tool_catalog(&agent, &mcp, &channels, &sub_agents).await;
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].definition.name, "human_contact_slack_oncall");
        assert_eq!(catalog[0].tool_type, ToolType::HumanContact);
        assert_eq!(catalog[1].definition.name, "delegate_to_agent__researcher");
        assert_eq!(catalog[1].tool_type, ToolType::DelegateToAgent);
    }

    #[tokio::test]
    async fn skips_mcp_servers_with_no_live_connection() {
        let mut agent = sample_agent();
        agent.spec.mcp_servers.push("fetch".to_string());
        let mcp = McpConnectionManager::new();
        let catalog = build_tool_catalog(&agent, &mcp, &[], &[]).await;
        assert!(catalog.is_empty());
    }
}
