//! `MCPServer` validation controller (§4.1 "Health maintenance").
//!
//! Drives the connection manager's `Connect` and keeps the resource's status
//! in sync with the live tool enumeration, detecting drift by set-of-names
//! comparison.

use std::collections::BTreeSet;

use crate::acp::controllers::{READY_REQUEUE_SECS, TRANSIENT_REQUEUE_SECS};
use crate::acp::events::{EventRecorder, ResourceEvent};
use crate::acp::mcp::McpConnectionManager;
use crate::acp::reconcile::ReconcileOutcome;
use crate::acp::resources::mcpserver::McpServerResource;
use crate::acp::secrets::SecretStore;
use crate::acp::store::memory::retry_status_update;
use crate::acp::store::{Resource, ResourceStore};

fn tool_name_set(tools: &[crate::acp::resources::mcpserver::McpToolInfo]) -> BTreeSet<&str> {
    tools.iter().map(|t| t.name.as_str()).collect()
}

pub async fn reconcile(
    store: &dyn ResourceStore<McpServerResource>,
    mcp: &McpConnectionManager,
    secrets: &dyn SecretStore,
    events: &dyn EventRecorder,
    namespace: &str,
    name: &str,
) -> ReconcileOutcome {
    let resource = match store.get(namespace, name).await {
        Ok(r) => r,
        Err(e) => return ReconcileOutcome::Error(e),
    };

    let connect_result = mcp.connect(name, &resource.spec.transport, secrets, namespace).await;

    match connect_result {
        Ok(tools) => {
            let drifted = tool_name_set(&tools) != tool_name_set(&resource.status.tools);
            let status_detail = if drifted {
                format!("connected, {} tools (updated)", tools.len())
            } else {
                format!("connected, {} tools", tools.len())
            };

            if let Err(e) = retry_status_update(store, namespace, name, |r| {
                r.status.connected = true;
                r.status.ready = true;
                r.status.status_detail = status_detail.clone();
                r.status.tools = tools.clone();
            })
            .await
            {
                return ReconcileOutcome::Error(e);
            }

            if drifted {
                events
                    .record(ResourceEvent::new(
                        McpServerResource::KIND,
                        namespace,
                        name,
                        "MCPServerToolsChanged",
                        "tool enumeration changed",
                    ))
                    .await;
            }

            ReconcileOutcome::requeue_after_secs(READY_REQUEUE_SECS)
        }
        Err(e) => {
            let detail = e.to_string();
            if let Err(update_err) = retry_status_update(store, namespace, name, |r| {
                r.status.connected = false;
                r.status.ready = false;
                r.status.status_detail = detail.clone();
            })
            .await
            {
                return ReconcileOutcome::Error(update_err);
            }

            events
                .record(ResourceEvent::new(
                    McpServerResource::KIND,
                    namespace,
                    name,
                    "MCPServerConnectFailed",
                    detail,
                ))
                .await;

            ReconcileOutcome::requeue_after_secs(TRANSIENT_REQUEUE_SECS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acp::events::TracingEventRecorder;
    use crate::acp::resources::mcpserver::{McpServerSpec, McpServerStatus, McpTransportSpec};
    use crate::acp::secrets::InMemorySecretStore;
    use crate::acp::store::memory::TypedStore;
    use crate::acp::store::ObjectMeta;

    #[tokio::test]
    async fn empty_stdio_command_is_not_ready_and_requeued_quickly() {
        let store = TypedStore::<McpServerResource>::new();
        let secrets = InMemorySecretStore::new();
        let mcp = McpConnectionManager::new();

        store
            .create(McpServerResource {
                meta: ObjectMeta::new("default", "broken"),
                spec: McpServerSpec {
                    transport: McpTransportSpec::Stdio {
                        command: String::new(),
                        args: vec![],
                        env: vec![],
                    },
                },
                status: McpServerStatus::default(),
            })
            .await
            .unwrap();

        let outcome = reconcile(&store, &mcp, &secrets, &TracingEventRecorder, "default", "broken").await;
        assert!(matches!(
            outcome,
            ReconcileOutcome::RequeueAfter(d) if d.as_secs() == TRANSIENT_REQUEUE_SECS
        ));
        let updated = store.get("default", "broken").await.unwrap();
        assert!(!updated.status.ready);
        assert!(!updated.status.connected);
    }
}
