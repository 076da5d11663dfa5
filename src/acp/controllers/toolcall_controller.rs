//! The ToolCall state machine (§4.3): execution of one tool the LLM asked
//! for, routed to an MCP server, a human approver/contact channel, or a
//! delegated sub-Agent depending on `toolType`.

use crate::acp::controllers::DEPENDENCY_REQUEUE_SECS;
use crate::acp::error::AcpError;
use crate::acp::events::{EventRecorder, ResourceEvent};
use crate::acp::humanlayer::{ApprovalStatus, ContactStatus, HumanLayerClient};
use crate::acp::ids::generate_tool_call_request_id;
use crate::acp::mcp::McpConnectionManager;
use crate::acp::reconcile::ReconcileOutcome;
use crate::acp::resources::mcpserver::{McpServerResource, McpTransportSpec};
use crate::acp::resources::task::{Task, TaskPhase, TaskSpec, TaskStatus};
use crate::acp::resources::toolcall::{ToolCall, ToolCallPhase, ToolType};
use crate::acp::store::memory::retry_status_update;
use crate::acp::store::{ObjectMeta, OwnerReference, Resource, ResourceStore};

const APPROVAL_ERROR_REQUEUE_SECS: u64 = 30;
const DELEGATE_TO_AGENT_PREFIX: &str = "delegate_to_agent__";

pub struct ToolCallControllerContext<'a> {
    pub tool_calls: &'a dyn ResourceStore<ToolCall>,
    pub tasks: &'a dyn ResourceStore<Task>,
    pub mcp_servers: &'a dyn ResourceStore<McpServerResource>,
    pub mcp: &'a McpConnectionManager,
    pub human_layer: &'a dyn HumanLayerClient,
    pub events: &'a dyn EventRecorder,
}

pub async fn reconcile(ctx: &ToolCallControllerContext<'_>, namespace: &str, name: &str) -> ReconcileOutcome {
    let tool_call = match ctx.tool_calls.get(namespace, name).await {
        Ok(t) => t,
        Err(e) => return ReconcileOutcome::Error(e),
    };

    match tool_call.status.phase {
        ToolCallPhase::Pending => pending(ctx, tool_call, namespace, name).await,
        ToolCallPhase::AwaitingHumanApproval => awaiting_human_approval(ctx, tool_call, namespace, name).await,
        ToolCallPhase::ReadyToExecuteApprovedTool => run_mcp_tool(ctx, &tool_call, namespace, name).await,
        ToolCallPhase::ErrorRequestingHumanApproval => retry_approval_request(ctx, &tool_call, namespace, name).await,
        ToolCallPhase::Running => run_mcp_tool(ctx, &tool_call, namespace, name).await,
        ToolCallPhase::AwaitingHumanInput => awaiting_human_input(ctx, &tool_call, namespace, name).await,
        ToolCallPhase::AwaitingSubAgent => awaiting_sub_agent(ctx, &tool_call, namespace, name).await,
        ToolCallPhase::Succeeded | ToolCallPhase::Failed | ToolCallPhase::ToolCallRejected => ReconcileOutcome::Done,
    }
}

fn ensure_external_call_id(tool_call: &ToolCall) -> String {
    if tool_call.status.external_call_id.is_empty() {
        generate_tool_call_request_id()
    } else {
        tool_call.status.external_call_id.clone()
    }
}

fn parse_message_argument(arguments: &str) -> Result<String, AcpError> {
    let value: serde_json::Value = serde_json::from_str(arguments)?;
    value
        .get("message")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| AcpError::ToolExecution("arguments missing required \"message\" field".to_string()))
}

fn approval_channel<'a>(spec: &'a McpTransportSpec) -> Option<&'a str> {
    match spec {
        McpTransportSpec::Http { approval_contact_channel, .. } => approval_contact_channel.as_deref(),
        McpTransportSpec::Stdio { .. } => None,
    }
}

async fn pending(ctx: &ToolCallControllerContext<'_>, tool_call: ToolCall, namespace: &str, name: &str) -> ReconcileOutcome {
    match tool_call.spec.tool_type {
        ToolType::Mcp => pending_mcp(ctx, &tool_call, namespace, name).await,
        ToolType::HumanContact => pending_human_contact(ctx, &tool_call, namespace, name).await,
        ToolType::DelegateToAgent => pending_delegate_to_agent(ctx, &tool_call, namespace, name).await,
    }
}

async fn pending_mcp(ctx: &ToolCallControllerContext<'_>, tool_call: &ToolCall, namespace: &str, name: &str) -> ReconcileOutcome {
    let Some(resolved) = ctx.mcp.find_server_for_tool(&tool_call.spec.tool_name).await else {
        return fail(ctx, namespace, name, format!("no live MCP connection resolves tool {}", tool_call.spec.tool_name)).await;
    };

    let server = match ctx.mcp_servers.get(namespace, &resolved.server).await {
        Ok(s) => s,
        Err(e) => return ReconcileOutcome::Error(e),
    };

    if approval_channel(&server.spec.transport).is_some() {
        request_approval(ctx, tool_call, namespace, name).await
    } else {
        let external_call_id = ensure_external_call_id(tool_call);
        advance(ctx, namespace, name, move |s| {
            s.external_call_id = external_call_id.clone();
            s.phase = ToolCallPhase::Running;
            s.status_detail = "no approval channel configured, executing directly".to_string();
        })
        .await
    }
}

async fn request_approval(ctx: &ToolCallControllerContext<'_>, tool_call: &ToolCall, namespace: &str, name: &str) -> ReconcileOutcome {
    let external_call_id = ensure_external_call_id(tool_call);
    let arguments: serde_json::Value = serde_json::from_str(&tool_call.spec.arguments).unwrap_or(serde_json::Value::Null);

    let result = ctx
        .human_layer
        .request_approval(&external_call_id, &tool_call.spec.tool_name, &arguments)
        .await;

    match result {
        Ok(()) => {
            advance(ctx, namespace, name, move |s| {
                s.external_call_id = external_call_id.clone();
                s.phase = ToolCallPhase::AwaitingHumanApproval;
                s.status_detail = "awaiting human approval".to_string();
            })
            .await
        }
        Err(e) => {
            let detail = e.to_string();
            let outcome = advance(ctx, namespace, name, move |s| {
                s.external_call_id = external_call_id.clone();
                s.phase = ToolCallPhase::ErrorRequestingHumanApproval;
                s.status_detail = detail.clone();
            })
            .await;
            ctx.events
                .record(ResourceEvent::new(ToolCall::KIND, namespace, name, "ApprovalRequestFailed", e.to_string()))
                .await;
            outcome
        }
    }
}

async fn retry_approval_request(ctx: &ToolCallControllerContext<'_>, tool_call: &ToolCall, namespace: &str, name: &str) -> ReconcileOutcome {
    let outcome = request_approval(ctx, tool_call, namespace, name).await;
    match outcome {
        ReconcileOutcome::RequeueImmediate => ReconcileOutcome::requeue_after_secs(APPROVAL_ERROR_REQUEUE_SECS),
        other => other,
    }
}

async fn awaiting_human_approval(ctx: &ToolCallControllerContext<'_>, tool_call: ToolCall, namespace: &str, name: &str) -> ReconcileOutcome {
    let status = match ctx.human_layer.get_function_call_status(&tool_call.status.external_call_id).await {
        Ok(s) => s,
        Err(_) => return ReconcileOutcome::requeue_after_secs(DEPENDENCY_REQUEUE_SECS),
    };

    match status.status {
        ApprovalStatus::Pending => ReconcileOutcome::requeue_after_secs(DEPENDENCY_REQUEUE_SECS),
        ApprovalStatus::Approved => {
            advance(ctx, namespace, name, |s| {
                s.phase = ToolCallPhase::ReadyToExecuteApprovedTool;
                s.status_detail = "approved".to_string();
            })
            .await
        }
        ApprovalStatus::Rejected => {
            let comment = status.comment.clone().unwrap_or_else(|| "no reason given".to_string());
            let result_text = format!("tool call rejected by human approver: {comment}");
            let outcome = advance(ctx, namespace, name, move |s| {
                s.phase = ToolCallPhase::ToolCallRejected;
                s.result = Some(result_text.clone());
                s.status_detail = "rejected by human approver".to_string();
            })
            .await;
            ctx.events
                .record(ResourceEvent::new(ToolCall::KIND, namespace, name, "ToolCallRejected", comment))
                .await;
            outcome
        }
    }
}

async fn run_mcp_tool(ctx: &ToolCallControllerContext<'_>, tool_call: &ToolCall, namespace: &str, name: &str) -> ReconcileOutcome {
    let Some(resolved) = ctx.mcp.find_server_for_tool(&tool_call.spec.tool_name).await else {
        return fail(ctx, namespace, name, format!("no live MCP connection resolves tool {}", tool_call.spec.tool_name)).await;
    };

    let arguments: serde_json::Value = serde_json::from_str(&tool_call.spec.arguments).unwrap_or(serde_json::Value::Null);
    let call_result = ctx.mcp.call_tool(&resolved.server, &resolved.tool, arguments).await;

    match call_result {
        Ok((text, None)) => {
            advance(ctx, namespace, name, move |s| {
                s.phase = ToolCallPhase::Succeeded;
                s.result = Some(text.clone());
                s.status_detail = "tool executed successfully".to_string();
            })
            .await
        }
        Ok((text, Some(error_message))) => {
            let outcome = advance(ctx, namespace, name, move |s| {
                s.phase = ToolCallPhase::Failed;
                // The error text still flows back to the LLM as a transcript
                // tool message (§4.3), so it's recorded in `result` too.
                s.result = Some(text.clone());
                s.error = Some(error_message.clone());
                s.status_detail = "tool reported an error".to_string();
            })
            .await;
            outcome
        }
        Err(e) => fail(ctx, namespace, name, e.to_string()).await,
    }
}

async fn pending_human_contact(ctx: &ToolCallControllerContext<'_>, tool_call: &ToolCall, namespace: &str, name: &str) -> ReconcileOutcome {
    let message = match parse_message_argument(&tool_call.spec.arguments) {
        Ok(m) => m,
        Err(e) => return fail(ctx, namespace, name, e.to_string()).await,
    };

    let external_call_id = ensure_external_call_id(tool_call);
    let result = ctx.human_layer.request_human_contact(&external_call_id, &message).await;

    match result {
        Ok(()) => {
            advance(ctx, namespace, name, move |s| {
                s.external_call_id = external_call_id.clone();
                s.phase = ToolCallPhase::AwaitingHumanInput;
                s.status_detail = "awaiting human reply".to_string();
            })
            .await
        }
        Err(e) => {
            let detail = e.to_string();
            advance(ctx, namespace, name, move |s| {
                s.external_call_id = external_call_id.clone();
                s.status_detail = detail.clone();
            })
            .await;
            ReconcileOutcome::requeue_after_secs(APPROVAL_ERROR_REQUEUE_SECS)
        }
    }
}

async fn awaiting_human_input(ctx: &ToolCallControllerContext<'_>, tool_call: &ToolCall, namespace: &str, name: &str) -> ReconcileOutcome {
    let status = match ctx.human_layer.get_human_contact_status(&tool_call.status.external_call_id).await {
        Ok(s) => s,
        Err(_) => return ReconcileOutcome::requeue_after_secs(DEPENDENCY_REQUEUE_SECS),
    };

    match status.status {
        ContactStatus::Pending => ReconcileOutcome::requeue_after_secs(DEPENDENCY_REQUEUE_SECS),
        ContactStatus::Responded => {
            let response = status.response.unwrap_or_default();
            advance(ctx, namespace, name, move |s| {
                s.phase = ToolCallPhase::Succeeded;
                s.result = Some(response.clone());
                s.status_detail = "human replied".to_string();
            })
            .await
        }
    }
}

async fn pending_delegate_to_agent(ctx: &ToolCallControllerContext<'_>, tool_call: &ToolCall, namespace: &str, name: &str) -> ReconcileOutcome {
    let Some(sub_agent) = tool_call.spec.tool_name.strip_prefix(DELEGATE_TO_AGENT_PREFIX) else {
        return fail(ctx, namespace, name, format!("{} is not a delegate_to_agent tool", tool_call.spec.tool_name)).await;
    };

    let message = match parse_message_argument(&tool_call.spec.arguments) {
        Ok(m) => m,
        Err(e) => return fail(ctx, namespace, name, e.to_string()).await,
    };

    let sub_task_name = sub_task_child_name(name);
    let mut sub_task = Task {
        meta: ObjectMeta::new(namespace, &sub_task_name),
        spec: TaskSpec {
            agent_ref: sub_agent.to_string(),
            user_message: Some(message),
            context_window: None,
            contact_channel_ref: None,
            v1beta3_respond_via_tool_call: false,
        },
        status: TaskStatus::default(),
    };
    sub_task.meta.owner_references.push(OwnerReference {
        kind: ToolCall::KIND,
        name: name.to_string(),
        controller: true,
    });

    if let Err(e) = ctx.tasks.create(sub_task).await {
        return ReconcileOutcome::Error(e);
    }

    advance(ctx, namespace, name, |s| {
        s.phase = ToolCallPhase::AwaitingSubAgent;
        s.status_detail = "delegated to sub-agent".to_string();
    })
    .await
}

async fn awaiting_sub_agent(ctx: &ToolCallControllerContext<'_>, tool_call: &ToolCall, namespace: &str, name: &str) -> ReconcileOutcome {
    let sub_task_name = sub_task_child_name(name);
    let sub_task = match ctx.tasks.get(namespace, &sub_task_name).await {
        Ok(t) => t,
        Err(e) => return ReconcileOutcome::Error(e),
    };

    match sub_task.status.phase {
        TaskPhase::FinalAnswer => {
            let output = sub_task.status.output.unwrap_or_default();
            advance(ctx, namespace, name, move |s| {
                s.phase = ToolCallPhase::Succeeded;
                s.result = Some(output.clone());
                s.status_detail = "sub-agent produced a final answer".to_string();
            })
            .await
        }
        TaskPhase::Failed => {
            let error = sub_task.status.error.unwrap_or_else(|| "sub-agent task failed".to_string());
            advance(ctx, namespace, name, move |s| {
                s.phase = ToolCallPhase::Failed;
                s.error = Some(error.clone());
                s.status_detail = "sub-agent task failed".to_string();
            })
            .await
        }
        _ => ReconcileOutcome::requeue_after_secs(DEPENDENCY_REQUEUE_SECS),
    }
}

/// Name of the synthetic sub-Task a `DelegateToAgent` ToolCall creates.
fn sub_task_child_name(tool_call_name: &str) -> String {
    format!("{tool_call_name}-subtask")
}

async fn advance<F>(ctx: &ToolCallControllerContext<'_>, namespace: &str, name: &str, mutate: F) -> ReconcileOutcome
where
    F: Fn(&mut crate::acp::resources::toolcall::ToolCallStatus),
{
    let result = retry_status_update(ctx.tool_calls, namespace, name, move |t| mutate(&mut t.status)).await;
    match result {
        Ok(updated) => match updated.status.phase {
            ToolCallPhase::Succeeded | ToolCallPhase::Failed | ToolCallPhase::ToolCallRejected => ReconcileOutcome::Done,
            _ => ReconcileOutcome::RequeueImmediate,
        },
        Err(e) => ReconcileOutcome::Error(e),
    }
}

async fn fail(ctx: &ToolCallControllerContext<'_>, namespace: &str, name: &str, message: String) -> ReconcileOutcome {
    let outcome = advance(ctx, namespace, name, move |s| {
        s.phase = ToolCallPhase::Failed;
        s.error = Some(message.clone());
        s.status_detail = message.clone();
    })
    .await;
    ctx.events
        .record(ResourceEvent::new(ToolCall::KIND, namespace, name, "ToolCallFailed", "tool call failed"))
        .await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acp::events::TracingEventRecorder;
    use crate::acp::humanlayer::{FunctionCallStatus, HumanContactStatus};
    use crate::acp::resources::toolcall::{ToolCallSpec, ToolCallStatus};
    use crate::acp::store::memory::TypedStore;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct ScriptedHumanLayer {
        approval: StdMutex<ApprovalStatus>,
        contact: StdMutex<ContactStatus>,
        contact_response: StdMutex<Option<String>>,
    }

    impl Default for ScriptedHumanLayer {
        fn default() -> Self {
            Self {
                approval: StdMutex::new(ApprovalStatus::Pending),
                contact: StdMutex::new(ContactStatus::Pending),
                contact_response: StdMutex::new(None),
            }
        }
    }

    #[async_trait]
    impl HumanLayerClient for ScriptedHumanLayer {
        async fn request_approval(&self, _: &str, _: &str, _: &serde_json::Value) -> crate::acp::error::Result<()> {
            Ok(())
        }
        async fn request_human_contact(&self, _: &str, _: &str) -> crate::acp::error::Result<()> {
            Ok(())
        }
        async fn get_function_call_status(&self, _: &str) -> crate::acp::error::Result<FunctionCallStatus> {
            Ok(FunctionCallStatus {
                status: *self.approval.lock().unwrap(),
                comment: Some("no".to_string()),
            })
        }
        async fn get_human_contact_status(&self, _: &str) -> crate::acp::error::Result<HumanContactStatus> {
            Ok(HumanContactStatus {
                status: *self.contact.lock().unwrap(),
                response: self.contact_response.lock().unwrap().clone(),
            })
        }
        async fn notify_final_answer(&self, _: &str, _: &str, _: &str) {}
    }

    struct Fixture {
        tool_calls: TypedStore<ToolCall>,
        tasks: TypedStore<Task>,
        mcp_servers: TypedStore<McpServerResource>,
        mcp: McpConnectionManager,
        human_layer: ScriptedHumanLayer,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tool_calls: TypedStore::new(),
                tasks: TypedStore::new(),
                mcp_servers: TypedStore::new(),
                mcp: McpConnectionManager::new(),
                human_layer: ScriptedHumanLayer::default(),
            }
        }

        fn ctx(&self) -> ToolCallControllerContext<'_> {
            ToolCallControllerContext {
                tool_calls: &self.tool_calls,
                tasks: &self.tasks,
                mcp_servers: &self.mcp_servers,
                mcp: &self.mcp,
                human_layer: &self.human_layer,
                events: &TracingEventRecorder,
            }
        }
    }

    fn mcp_tool_call(name: &str, tool_name: &str) -> ToolCall {
        ToolCall {
            meta: ObjectMeta::new("default", name),
            spec: ToolCallSpec {
                task_ref: "t1".to_string(),
                tool_name: tool_name.to_string(),
                tool_type: ToolType::Mcp,
                tool_call_id: "call_1".to_string(),
                arguments: "{}".to_string(),
            },
            status: ToolCallStatus::default(),
        }
    }

    #[tokio::test]
    async fn mcp_tool_call_fails_when_no_connection_resolves_it() {
        let fx = Fixture::new();
        fx.tool_calls.create(mcp_tool_call("tc1", "fetch__fetch")).await.unwrap();

        let outcome = reconcile(&fx.ctx(), "default", "tc1").await;
        assert!(matches!(outcome, ReconcileOutcome::Done));
        let updated = fx.tool_calls.get("default", "tc1").await.unwrap();
        assert_eq!(updated.status.phase, ToolCallPhase::Failed);
        assert!(updated.status.error.is_some());
    }

    #[tokio::test]
    async fn human_contact_without_message_argument_fails() {
        let fx = Fixture::new();
        let tool_call = ToolCall {
            meta: ObjectMeta::new("default", "tc1"),
            spec: ToolCallSpec {
                task_ref: "t1".to_string(),
                tool_name: "respond_to_human".to_string(),
                tool_type: ToolType::HumanContact,
                tool_call_id: "call_1".to_string(),
                arguments: "{}".to_string(),
            },
            status: ToolCallStatus::default(),
        };
        fx.tool_calls.create(tool_call).await.unwrap();

        reconcile(&fx.ctx(), "default", "tc1").await;
        let updated = fx.tool_calls.get("default", "tc1").await.unwrap();
        assert_eq!(updated.status.phase, ToolCallPhase::Failed);
    }

    #[tokio::test]
    async fn human_contact_requests_then_succeeds_on_response() {
        let fx = Fixture::new();
        let tool_call = ToolCall {
            meta: ObjectMeta::new("default", "tc1"),
            spec: ToolCallSpec {
                task_ref: "t1".to_string(),
                tool_name: "respond_to_human".to_string(),
                tool_type: ToolType::HumanContact,
                tool_call_id: "call_1".to_string(),
                arguments: serde_json::json!({ "message": "are you sure?" }).to_string(),
            },
            status: ToolCallStatus::default(),
        };
        fx.tool_calls.create(tool_call).await.unwrap();

        let outcome = reconcile(&fx.ctx(), "default", "tc1").await;
        assert!(matches!(outcome, ReconcileOutcome::RequeueImmediate));
        let updated = fx.tool_calls.get("default", "tc1").await.unwrap();
        assert_eq!(updated.status.phase, ToolCallPhase::AwaitingHumanInput);
        assert!(!updated.status.external_call_id.is_empty());

        *fx.human_layer.contact.lock().unwrap() = ContactStatus::Responded;
        *fx.human_layer.contact_response.lock().unwrap() = Some("yes".to_string());

        let outcome = reconcile(&fx.ctx(), "default", "tc1").await;
        assert!(matches!(outcome, ReconcileOutcome::Done));
        let updated = fx.tool_calls.get("default", "tc1").await.unwrap();
        assert_eq!(updated.status.phase, ToolCallPhase::Succeeded);
        assert_eq!(updated.status.result, Some("yes".to_string()));
    }

    #[tokio::test]
    async fn delegate_to_agent_creates_sub_task_and_waits() {
        let fx = Fixture::new();
        let tool_call = ToolCall {
            meta: ObjectMeta::new("default", "tc1"),
            spec: ToolCallSpec {
                task_ref: "t1".to_string(),
                tool_name: "delegate_to_agent__researcher".to_string(),
                tool_type: ToolType::DelegateToAgent,
                tool_call_id: "call_1".to_string(),
                arguments: serde_json::json!({ "message": "look into this" }).to_string(),
            },
            status: ToolCallStatus::default(),
        };
        fx.tool_calls.create(tool_call).await.unwrap();

        let outcome = reconcile(&fx.ctx(), "default", "tc1").await;
        assert!(matches!(outcome, ReconcileOutcome::RequeueImmediate));
        let updated = fx.tool_calls.get("default", "tc1").await.unwrap();
        assert_eq!(updated.status.phase, ToolCallPhase::AwaitingSubAgent);

        let sub_task = fx.tasks.get("default", "tc1-subtask").await.unwrap();
        assert_eq!(sub_task.spec.agent_ref, "researcher");
        assert_eq!(sub_task.spec.user_message.as_deref(), Some("look into this"));

        let outcome = reconcile(&fx.ctx(), "default", "tc1").await;
        assert!(matches!(outcome, ReconcileOutcome::RequeueAfter(_)));

        let result = retry_status_update(&fx.tasks, "default", "tc1-subtask", |t| {
            t.status.phase = TaskPhase::FinalAnswer;
            t.status.output = Some("done".to_string());
        })
        .await;
        result.unwrap();

        let outcome = reconcile(&fx.ctx(), "default", "tc1").await;
        assert!(matches!(outcome, ReconcileOutcome::Done));
        let updated = fx.tool_calls.get("default", "tc1").await.unwrap();
        assert_eq!(updated.status.phase, ToolCallPhase::Succeeded);
        assert_eq!(updated.status.result, Some("done".to_string()));
    }

    #[test]
    fn approval_channel_is_only_read_from_the_http_transport() {
        let http_with_channel = McpTransportSpec::Http {
            url: "https://tools.example/mcp".to_string(),
            approval_contact_channel: Some("oncall".to_string()),
        };
        let http_without_channel = McpTransportSpec::Http {
            url: "https://tools.example/mcp".to_string(),
            approval_contact_channel: None,
        };
        let stdio = McpTransportSpec::Stdio {
            command: "fetch-server".to_string(),
            args: vec![],
            env: vec![],
        };

        assert_eq!(approval_channel(&http_with_channel), Some("oncall"));
        assert_eq!(approval_channel(&http_without_channel), None);
        assert_eq!(approval_channel(&stdio), None);
    }
}
