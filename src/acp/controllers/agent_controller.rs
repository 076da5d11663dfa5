//! `Agent` validation controller (§3 "Agent": "only Ready when every
//! referenced dependency is Ready").

use std::collections::HashMap;

use crate::acp::controllers::{READY_REQUEUE_SECS, TRANSIENT_REQUEUE_SECS};
use crate::acp::events::{EventRecorder, ResourceEvent};
use crate::acp::reconcile::ReconcileOutcome;
use crate::acp::resources::contactchannel::ContactChannel;
use crate::acp::resources::llm::LlmResource;
use crate::acp::resources::mcpserver::McpServerResource;
use crate::acp::resources::Agent;
use crate::acp::store::memory::retry_status_update;
use crate::acp::store::{Resource, ResourceStore};

pub struct AgentDependencyStores<'a> {
    pub llms: &'a dyn ResourceStore<LlmResource>,
    pub mcp_servers: &'a dyn ResourceStore<McpServerResource>,
    pub contact_channels: &'a dyn ResourceStore<ContactChannel>,
    pub agents: &'a dyn ResourceStore<Agent>,
}

pub async fn reconcile(
    store: &dyn ResourceStore<Agent>,
    deps: &AgentDependencyStores<'_>,
    events: &dyn EventRecorder,
    namespace: &str,
    name: &str,
) -> ReconcileOutcome {
    let resource = match store.get(namespace, name).await {
        Ok(r) => r,
        Err(e) => return ReconcileOutcome::Error(e),
    };

    let mut not_ready: Vec<String> = Vec::new();

    match deps.llms.get(namespace, &resource.spec.llm_ref).await {
        Ok(llm) if !llm.status.ready => not_ready.push(format!("LLM {} not ready", resource.spec.llm_ref)),
        Err(_) => not_ready.push(format!("LLM {} does not exist", resource.spec.llm_ref)),
        Ok(_) => {}
    }

    let mut contact_channel_ready = HashMap::new();
    for channel_name in &resource.spec.contact_channels {
        match deps.contact_channels.get(namespace, channel_name).await {
            Ok(channel) => {
                contact_channel_ready.insert(channel_name.clone(), channel.status.ready);
                if !channel.status.ready {
                    not_ready.push(format!("ContactChannel {channel_name} not ready"));
                }
            }
            Err(_) => {
                contact_channel_ready.insert(channel_name.clone(), false);
                not_ready.push(format!("ContactChannel {channel_name} does not exist"));
            }
        }
    }

    for server_name in &resource.spec.mcp_servers {
        match deps.mcp_servers.get(namespace, server_name).await {
            Ok(server) if !server.status.ready => not_ready.push(format!("MCPServer {server_name} not ready")),
            Err(_) => not_ready.push(format!("MCPServer {server_name} does not exist")),
            Ok(_) => {}
        }
    }

    for sub_agent_name in &resource.spec.sub_agents {
        match deps.agents.get(namespace, sub_agent_name).await {
            Ok(sub_agent) if !sub_agent.status.ready => {
                not_ready.push(format!("sub-Agent {sub_agent_name} not ready"))
            }
            Err(_) => not_ready.push(format!("sub-Agent {sub_agent_name} does not exist")),
            Ok(_) => {}
        }
    }

    let ready = not_ready.is_empty();
    let detail = if ready {
        "all dependencies ready".to_string()
    } else {
        not_ready.join("; ")
    };

    if let Err(e) = retry_status_update(store, namespace, name, |r| {
        r.status.ready = ready;
        r.status.status_detail = detail.clone();
        r.status.contact_channel_ready = contact_channel_ready.clone();
    })
    .await
    {
        return ReconcileOutcome::Error(e);
    }

    let reason = if ready { "AgentReady" } else { "AgentNotReady" };
    events
        .record(ResourceEvent::new(Agent::KIND, namespace, name, reason, detail))
        .await;

    if ready {
        ReconcileOutcome::requeue_after_secs(READY_REQUEUE_SECS)
    } else {
        ReconcileOutcome::requeue_after_secs(TRANSIENT_REQUEUE_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acp::events::TracingEventRecorder;
    use crate::acp::resources::llm::{GenerationParameters, LlmSpec, LlmStatus, Provider};
    use crate::acp::resources::{AgentSpec, AgentStatus};
    use crate::acp::secrets::SecretKeyRef;
    use crate::acp::store::memory::TypedStore;
    use crate::acp::store::ObjectMeta;

    #[tokio::test]
    async fn not_ready_when_llm_missing() {
        let agents = TypedStore::<Agent>::new();
        let llms = TypedStore::<LlmResource>::new();
        let mcp_servers = TypedStore::<McpServerResource>::new();
        let contact_channels = TypedStore::<ContactChannel>::new();

        agents
            .create(Agent {
                meta: ObjectMeta::new("default", "assistant"),
                spec: AgentSpec {
                    llm_ref: "missing-llm".to_string(),
                    system_prompt: "be helpful".to_string(),
                    mcp_servers: vec![],
                    contact_channels: vec![],
                    sub_agents: vec![],
                    description: None,
                },
                status: AgentStatus::default(),
            })
            .await
            .unwrap();

        let deps = AgentDependencyStores {
            llms: &llms,
            mcp_servers: &mcp_servers,
            contact_channels: &contact_channels,
            agents: &agents,
        };

        reconcile(&agents, &deps, &TracingEventRecorder, "default", "assistant").await;
        let updated = agents.get("default", "assistant").await.unwrap();
        assert!(!updated.status.ready);
    }

    #[tokio::test]
    async fn ready_when_llm_dependency_is_ready() {
        let agents = TypedStore::<Agent>::new();
        let llms = TypedStore::<LlmResource>::new();
        let mcp_servers = TypedStore::<McpServerResource>::new();
        let contact_channels = TypedStore::<ContactChannel>::new();

        llms.create(LlmResource {
            meta: ObjectMeta::new("default", "my-llm"),
            spec: LlmSpec {
                provider: Provider::Openai,
                api_key_secret_ref: SecretKeyRef {
                    name: "creds".to_string(),
                    key: "apiKey".to_string(),
                },
                parameters: GenerationParameters {
                    model: "gpt-4".to_string(),
                    ..Default::default()
                },
            },
            status: LlmStatus {
                ready: true,
                status_detail: "ok".to_string(),
            },
        })
        .await
        .unwrap();

        agents
            .create(Agent {
                meta: ObjectMeta::new("default", "assistant"),
                spec: AgentSpec {
                    llm_ref: "my-llm".to_string(),
                    system_prompt: "be helpful".to_string(),
                    mcp_servers: vec![],
                    contact_channels: vec![],
                    sub_agents: vec![],
                    description: None,
                },
                status: AgentStatus::default(),
            })
            .await
            .unwrap();

        let deps = AgentDependencyStores {
            llms: &llms,
            mcp_servers: &mcp_servers,
            contact_channels: &contact_channels,
            agents: &agents,
        };

        reconcile(&agents, &deps, &TracingEventRecorder, "default", "assistant").await;
        let updated = agents.get("default", "assistant").await.unwrap();
        assert!(updated.status.ready);
    }
}
