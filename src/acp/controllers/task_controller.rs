//! The Task state machine (§4.2): the reasoning loop that alternates
//! between LLM calls and tool invocations.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, RwLock};

use crate::acp::catalog::{build_tool_catalog, tool_definitions, tool_type_for, CatalogEntry, ContactChannelRef, SubAgentRef};
use crate::acp::controllers::DEPENDENCY_REQUEUE_SECS;
use crate::acp::error::AcpError;
use crate::acp::events::{EventRecorder, ResourceEvent};
use crate::acp::humanlayer::HumanLayerClient;
use crate::acp::ids::generate_tool_call_request_id;
use crate::acp::llm::provider::build_client;
use crate::acp::llm::LlmResponse;
use crate::acp::mcp::McpConnectionManager;
use crate::acp::reconcile::ReconcileOutcome;
use crate::acp::resources::contactchannel::ContactChannel;
use crate::acp::resources::llm::LlmResource;
use crate::acp::resources::message::Message;
use crate::acp::resources::task::{Task, TaskPhase};
use crate::acp::resources::toolcall::{
    respond_to_human_child_name, tool_call_child_name, ToolCall, ToolCallSpec, ToolCallStatus, ToolType, LABEL_TASK,
    LABEL_TOOLCALLREQUEST,
};
use crate::acp::resources::Agent;
use crate::acp::secrets::{resolve_key, SecretStore};
use crate::acp::store::lease::{lease_name_for_task, LeaseStore};
use crate::acp::store::memory::retry_status_update;
use crate::acp::store::{ObjectMeta, OwnerReference, Resource, ResourceStore};

const LEASE_DURATION_SECS: i64 = 30;
const LEASE_REQUEUE_SECS: u64 = 5;
const LEASE_FAILURE_REQUEUE_SECS: u64 = 2;

/// Per-process mutex map keyed by Task name (§5 "per-task process mutex",
/// double-locking alongside the distributed Lease). Entries are never
/// removed — bounded by the number of distinct Tasks a process has ever
/// reconciled.
pub struct TaskMutexMap {
    mutexes: RwLock<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl TaskMutexMap {
    pub fn new() -> Self {
        Self {
            mutexes: RwLock::new(HashMap::new()),
        }
    }

    pub async fn mutex_for(&self, task_name: &str) -> Arc<AsyncMutex<()>> {
        if let Some(existing) = self.mutexes.read().await.get(task_name) {
            return existing.clone();
        }
        self.mutexes
            .write()
            .await
            .entry(task_name.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

impl Default for TaskMutexMap {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TaskControllerContext<'a> {
    pub tasks: &'a dyn ResourceStore<Task>,
    pub tool_calls: &'a dyn ResourceStore<ToolCall>,
    pub agents: &'a dyn ResourceStore<Agent>,
    pub llms: &'a dyn ResourceStore<LlmResource>,
    pub contact_channels: &'a dyn ResourceStore<ContactChannel>,
    pub mcp: &'a McpConnectionManager,
    pub secrets: &'a dyn SecretStore,
    pub leases: &'a LeaseStore,
    pub task_mutexes: &'a TaskMutexMap,
    pub human_layer: Arc<dyn HumanLayerClient>,
    pub events: &'a dyn EventRecorder,
    pub pod_name: &'a str,
}

pub async fn reconcile(ctx: &TaskControllerContext<'_>, namespace: &str, name: &str) -> ReconcileOutcome {
    let task = match ctx.tasks.get(namespace, name).await {
        Ok(t) => t,
        Err(e) => return ReconcileOutcome::Error(e),
    };

    match task.status.phase {
        TaskPhase::Initializing | TaskPhase::Pending => initializing_or_pending(ctx, task, namespace, name).await,
        TaskPhase::ReadyForLlm => llm_step(ctx, task, namespace, name).await,
        TaskPhase::ToolCallsPending => tool_calls_pending(ctx, task, namespace, name).await,
        TaskPhase::FinalAnswer | TaskPhase::Failed => ReconcileOutcome::Done,
    }
}

async fn initializing_or_pending(
    ctx: &TaskControllerContext<'_>,
    task: Task,
    namespace: &str,
    name: &str,
) -> ReconcileOutcome {
    // ∅ → Initializing: allocate the root trace span on first sight.
    if task.status.trace_id.is_empty() {
        let trace_id = uuid::Uuid::new_v4().to_string();
        let span_id = uuid::Uuid::new_v4().to_string();
        let result = retry_status_update(ctx.tasks, namespace, name, move |t| {
            t.status.trace_id = trace_id.clone();
            t.status.span_id = span_id.clone();
            t.status.phase = TaskPhase::Initializing;
        })
        .await;
        return match result {
            Ok(_) => ReconcileOutcome::RequeueImmediate,
            Err(e) => ReconcileOutcome::Error(e),
        };
    }

    if let Err(e) = crate::acp::transcript::validate_spec_exclusivity(&task.spec.user_message, &task.spec.context_window)
    {
        return fail_task(ctx, namespace, name, e).await;
    }

    if let Some(channel_ref) = &task.spec.contact_channel_ref {
        match ctx.contact_channels.get(namespace, channel_ref).await {
            Ok(channel) if !channel.status.ready => {
                return fail_task(
                    ctx,
                    namespace,
                    name,
                    AcpError::SpecInvalid(format!("contactChannelRef {channel_ref} is not Ready")),
                )
                .await;
            }
            Err(_) => {
                return fail_task(
                    ctx,
                    namespace,
                    name,
                    AcpError::SpecInvalid(format!("contactChannelRef {channel_ref} does not exist")),
                )
                .await;
            }
            Ok(_) => {}
        }
    }

    let agent = match ctx.agents.get(namespace, &task.spec.agent_ref).await {
        Ok(a) => a,
        Err(_) => {
            return park_pending(ctx, namespace, name, format!("waiting for Agent {} to exist", task.spec.agent_ref)).await;
        }
    };

    if !agent.status.ready {
        return park_pending(
            ctx,
            namespace,
            name,
            format!("waiting for Agent {} to become Ready", task.spec.agent_ref),
        )
        .await;
    }

    let transcript = match crate::acp::transcript::build_initial_transcript(
        &task.spec.user_message,
        &task.spec.context_window,
        &agent.spec.system_prompt,
    ) {
        Ok(t) => t,
        Err(e) => return fail_task(ctx, namespace, name, e).await,
    };

    let preview = crate::acp::resources::task::user_message_preview(task.spec.user_message.as_deref().unwrap_or_default());

    let result = retry_status_update(ctx.tasks, namespace, name, move |t| {
        t.status.transcript = transcript.clone();
        t.status.user_message_preview = preview.clone();
        t.status.phase = TaskPhase::ReadyForLlm;
        t.status.status_detail = "transcript ready".to_string();
    })
    .await;

    match result {
        Ok(_) => ReconcileOutcome::RequeueImmediate,
        Err(e) => ReconcileOutcome::Error(e),
    }
}

async fn park_pending(ctx: &TaskControllerContext<'_>, namespace: &str, name: &str, detail: String) -> ReconcileOutcome {
    let result = retry_status_update(ctx.tasks, namespace, name, move |t| {
        t.status.phase = TaskPhase::Pending;
        t.status.status_detail = detail.clone();
    })
    .await;
    match result {
        Ok(_) => ReconcileOutcome::requeue_after_secs(DEPENDENCY_REQUEUE_SECS),
        Err(e) => ReconcileOutcome::Error(e),
    }
}

async fn fail_task(ctx: &TaskControllerContext<'_>, namespace: &str, name: &str, error: AcpError) -> ReconcileOutcome {
    let message = error.to_string();
    let result = retry_status_update(ctx.tasks, namespace, name, move |t| {
        t.status.phase = TaskPhase::Failed;
        t.status.error = Some(message.clone());
        t.status.status_detail = message.clone();
    })
    .await;
    ctx.events
        .record(ResourceEvent::new(Task::KIND, namespace, name, "TaskFailed", error.to_string()))
        .await;
    match result {
        Ok(_) => ReconcileOutcome::Done,
        Err(e) => ReconcileOutcome::Error(e),
    }
}

async fn tool_calls_pending(ctx: &TaskControllerContext<'_>, task: Task, namespace: &str, name: &str) -> ReconcileOutcome {
    let children = match ctx
        .tool_calls
        .list(namespace, Some((LABEL_TOOLCALLREQUEST, task.status.tool_call_request_id.as_str())))
        .await
    {
        Ok(c) => c,
        Err(e) => return ReconcileOutcome::Error(e),
    };

    if children.is_empty() || children.iter().any(|c| !c.status.phase.is_terminal()) {
        return ReconcileOutcome::requeue_after_secs(DEPENDENCY_REQUEUE_SECS);
    }

    let mut ordered = children;
    ordered.sort_by(|a, b| a.meta.name.cmp(&b.meta.name));

    let tool_messages: Vec<Message> = ordered
        .iter()
        .map(|c| {
            let content = c
                .status
                .result
                .clone()
                .or_else(|| c.status.error.clone())
                .unwrap_or_default();
            Message::tool_result(c.spec.tool_call_id.clone(), content)
        })
        .collect();

    let result = retry_status_update(ctx.tasks, namespace, name, move |t| {
        t.status.transcript.extend(tool_messages.clone());
        t.status.phase = TaskPhase::ReadyForLlm;
        t.status.status_detail = "all tool calls terminal, resuming".to_string();
    })
    .await;

    match result {
        Ok(_) => ReconcileOutcome::RequeueImmediate,
        Err(e) => ReconcileOutcome::Error(e),
    }
}

/// Rebuild the tool catalog for one Agent as it stands right now. Cheap: no
/// LLM call, just a snapshot of already-connected MCP tool lists.
async fn catalog_for_agent(ctx: &TaskControllerContext<'_>, namespace: &str, agent: &Agent) -> Vec<CatalogEntry> {
    let mut names = Vec::new();
    let mut types = Vec::new();
    for channel_name in &agent.spec.contact_channels {
        if !agent.status.contact_channel_ready.get(channel_name).copied().unwrap_or(false) {
            continue;
        }
        if let Ok(channel) = ctx.contact_channels.get(namespace, channel_name).await {
            names.push(channel_name.clone());
            types.push(channel.spec.channel_type);
        }
    }
    let contact_channels: Vec<ContactChannelRef> = names
        .iter()
        .zip(types.iter())
        .map(|(name, channel_type)| ContactChannelRef {
            name,
            channel_type: *channel_type,
        })
        .collect();

    let sub_agents: Vec<SubAgentRef> = agent
        .spec
        .sub_agents
        .iter()
        .map(|n| SubAgentRef { name: n, description: "" })
        .collect();

    build_tool_catalog(agent, ctx.mcp, &contact_channels, &sub_agents).await
}

async fn llm_step(ctx: &TaskControllerContext<'_>, task: Task, namespace: &str, name: &str) -> ReconcileOutcome {
    let task_mutex = ctx.task_mutexes.mutex_for(name).await;
    let _mutex_guard = task_mutex.lock().await;

    let lease_name = lease_name_for_task(name);
    match ctx.leases.try_acquire(&lease_name, ctx.pod_name, LEASE_DURATION_SECS).await {
        Ok(true) => {}
        Ok(false) => return ReconcileOutcome::requeue_after_secs(LEASE_REQUEUE_SECS),
        Err(_) => return ReconcileOutcome::requeue_after_secs(LEASE_FAILURE_REQUEUE_SECS),
    }

    let outcome = llm_step_inner(ctx, &task, namespace, name).await;

    let _ = ctx.leases.release(&lease_name, ctx.pod_name).await;
    outcome
}

async fn llm_step_inner(ctx: &TaskControllerContext<'_>, task: &Task, namespace: &str, name: &str) -> ReconcileOutcome {
    let agent = match ctx.agents.get(namespace, &task.spec.agent_ref).await {
        Ok(a) => a,
        Err(_) => {
            return park_pending(ctx, namespace, name, format!("waiting for Agent {} to exist", task.spec.agent_ref)).await
        }
    };
    if !agent.status.ready {
        return park_pending(
            ctx,
            namespace,
            name,
            format!("waiting for Agent {} to become Ready", task.spec.agent_ref),
        )
        .await;
    }

    let llm_resource = match ctx.llms.get(namespace, &agent.spec.llm_ref).await {
        Ok(l) => l,
        Err(e) => return fail_task(ctx, namespace, name, e).await,
    };

    let api_key = match resolve_key(ctx.secrets, namespace, &llm_resource.spec.api_key_secret_ref).await {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(_) => {
                return fail_task(
                    ctx,
                    namespace,
                    name,
                    AcpError::CredentialInvalid("LLM API key is not valid UTF-8".to_string()),
                )
                .await
            }
        },
        Err(e) => return fail_task(ctx, namespace, name, e).await,
    };

    let client = match build_client(&llm_resource, &api_key) {
        Ok(c) => c,
        Err(e) => return fail_task(ctx, namespace, name, e).await,
    };

    let catalog = catalog_for_agent(ctx, namespace, &agent).await;
    let tools = tool_definitions(&catalog);

    let response = client.send_request(&task.status.transcript, &tools).await;

    match response {
        Ok(llm_response) if llm_response.has_tool_calls() => {
            tool_call_branch(ctx, namespace, name, llm_response, &catalog).await
        }
        Ok(llm_response) => final_answer_branch(ctx, task, namespace, name, llm_response.content).await,
        Err(e) if e.is_terminal() => {
            let detail = e.to_string();
            ctx.events
                .record(ResourceEvent::new(Task::KIND, namespace, name, "LLMRequestFailed4xx", detail))
                .await;
            fail_task(
                ctx,
                namespace,
                name,
                AcpError::LlmClientError {
                    status: e.status_code.unwrap_or(0),
                    message: e.message,
                },
            )
            .await
        }
        Err(e) => {
            let detail = e.to_string();
            if let Err(update_err) = retry_status_update(ctx.tasks, namespace, name, move |t| {
                t.status.status_detail = detail.clone();
            })
            .await
            {
                return ReconcileOutcome::Error(update_err);
            }
            ctx.events
                .record(ResourceEvent::new(Task::KIND, namespace, name, "LLMRequestFailed", e.to_string()))
                .await;
            ReconcileOutcome::Error(AcpError::LlmServerError(e.message))
        }
    }
}

async fn final_answer_branch(
    ctx: &TaskControllerContext<'_>,
    task: &Task,
    namespace: &str,
    name: &str,
    content: String,
) -> ReconcileOutcome {
    if task.spec.v1beta3_respond_via_tool_call {
        return create_respond_to_human_tool_call(ctx, namespace, name, content).await;
    }

    let assistant_message = Message::assistant(content.clone());
    let result = retry_status_update(ctx.tasks, namespace, name, move |t| {
        t.status.transcript.push(assistant_message.clone());
        t.status.output = Some(content.clone());
        t.status.phase = TaskPhase::FinalAnswer;
        t.status.status_detail = "final answer".to_string();
    })
    .await;

    if let Err(e) = result {
        return ReconcileOutcome::Error(e);
    }

    ctx.events
        .record(ResourceEvent::new(Task::KIND, namespace, name, "LLMFinalAnswer", "task reached a final answer"))
        .await;

    if let Some(channel) = &task.spec.contact_channel_ref {
        // Done asynchronously per §4.2: the notify's own retry/backoff (up to
        // 7s across 3 attempts, humanlayer.rs) must never hold the Task's
        // lease or per-task mutex, and a failure here never fails the Task.
        let output = ctx
            .tasks
            .get(namespace, name)
            .await
            .ok()
            .and_then(|t| t.status.output)
            .unwrap_or_default();
        let human_layer = ctx.human_layer.clone();
        let channel = channel.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            human_layer.notify_final_answer(&channel, &name, &output).await;
        });
    }

    ReconcileOutcome::Done
}

async fn tool_call_branch(
    ctx: &TaskControllerContext<'_>,
    namespace: &str,
    name: &str,
    llm_response: LlmResponse,
    catalog: &[CatalogEntry],
) -> ReconcileOutcome {
    let request_id = generate_tool_call_request_id();
    let assistant_message = Message::assistant_with_tool_calls(llm_response.tool_calls.clone());

    for (index, requested_call) in llm_response.tool_calls.iter().enumerate() {
        let tool_type = tool_type_for(catalog, &requested_call.function.name).unwrap_or(ToolType::Mcp);
        let child_name = tool_call_child_name(name, &request_id, (index + 1) as u32);

        let mut child = ToolCall {
            meta: ObjectMeta::new(namespace, &child_name)
                .with_label(LABEL_TASK, name)
                .with_label(LABEL_TOOLCALLREQUEST, &request_id),
            spec: ToolCallSpec {
                task_ref: name.to_string(),
                tool_name: requested_call.function.name.clone(),
                tool_type,
                tool_call_id: requested_call.id.clone(),
                arguments: requested_call.function.arguments.clone(),
            },
            status: ToolCallStatus::default(),
        };
        child.meta.owner_references.push(OwnerReference {
            kind: Task::KIND,
            name: name.to_string(),
            controller: true,
        });

        if let Err(e) = ctx.tool_calls.create(child).await {
            return ReconcileOutcome::Error(e);
        }
    }

    let result = retry_status_update(ctx.tasks, namespace, name, move |t| {
        t.status.transcript.push(assistant_message.clone());
        t.status.tool_call_request_id = request_id.clone();
        t.status.phase = TaskPhase::ToolCallsPending;
        t.status.status_detail = "awaiting tool calls".to_string();
    })
    .await;

    match result {
        Ok(_) => ReconcileOutcome::RequeueImmediate,
        Err(e) => ReconcileOutcome::Error(e),
    }
}

/// §4.2.4 v1beta3 variant: route the final answer through a synthetic
/// `respond_to_human` ToolCall instead of terminating directly.
async fn create_respond_to_human_tool_call(
    ctx: &TaskControllerContext<'_>,
    namespace: &str,
    name: &str,
    content: String,
) -> ReconcileOutcome {
    let request_id = generate_tool_call_request_id();
    let child_name = respond_to_human_child_name(name, &request_id);

    let mut child = ToolCall {
        meta: ObjectMeta::new(namespace, &child_name)
            .with_label(LABEL_TASK, name)
            .with_label(LABEL_TOOLCALLREQUEST, &request_id),
        spec: ToolCallSpec {
            task_ref: name.to_string(),
            tool_name: "respond_to_human".to_string(),
            tool_type: ToolType::HumanContact,
            tool_call_id: request_id.clone(),
            arguments: serde_json::json!({ "content": content }).to_string(),
        },
        status: ToolCallStatus::default(),
    };
    child.meta.owner_references.push(OwnerReference {
        kind: Task::KIND,
        name: name.to_string(),
        controller: true,
    });

    if let Err(e) = ctx.tool_calls.create(child).await {
        return ReconcileOutcome::Error(e);
    }

    let result = retry_status_update(ctx.tasks, namespace, name, move |t| {
        t.status.tool_call_request_id = request_id.clone();
        t.status.phase = TaskPhase::ToolCallsPending;
        t.status.status_detail = "routing final answer through respond_to_human".to_string();
    })
    .await;

    match result {
        Ok(_) => ReconcileOutcome::RequeueImmediate,
        Err(e) => ReconcileOutcome::Error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acp::events::TracingEventRecorder;
    use crate::acp::humanlayer::{ApprovalStatus, ContactStatus, FunctionCallStatus, HumanContactStatus};
    use crate::acp::resources::llm::{GenerationParameters, LlmSpec, LlmStatus, Provider};
    use crate::acp::resources::{AgentSpec, AgentStatus};
    use crate::acp::secrets::{InMemorySecretStore, SecretKeyRef};
    use crate::acp::store::memory::TypedStore;
    use async_trait::async_trait;

    struct NoopHumanLayer;

    #[async_trait]
    impl HumanLayerClient for NoopHumanLayer {
        async fn request_approval(&self, _: &str, _: &str, _: &serde_json::Value) -> crate::acp::error::Result<()> {
            Ok(())
        }
        async fn request_human_contact(&self, _: &str, _: &str) -> crate::acp::error::Result<()> {
            Ok(())
        }
        async fn get_function_call_status(&self, _: &str) -> crate::acp::error::Result<FunctionCallStatus> {
            Ok(FunctionCallStatus {
                status: ApprovalStatus::Pending,
                comment: None,
            })
        }
        async fn get_human_contact_status(&self, _: &str) -> crate::acp::error::Result<HumanContactStatus> {
            Ok(HumanContactStatus {
                status: ContactStatus::Pending,
                response: None,
            })
        }
        async fn notify_final_answer(&self, _: &str, _: &str, _: &str) {}
    }

    struct Fixture {
        tasks: TypedStore<Task>,
        tool_calls: TypedStore<ToolCall>,
        agents: TypedStore<Agent>,
        llms: TypedStore<LlmResource>,
        contact_channels: TypedStore<ContactChannel>,
        mcp: McpConnectionManager,
        secrets: InMemorySecretStore,
        leases: LeaseStore,
        task_mutexes: TaskMutexMap,
        human_layer: Arc<NoopHumanLayer>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tasks: TypedStore::new(),
                tool_calls: TypedStore::new(),
                agents: TypedStore::new(),
                llms: TypedStore::new(),
                contact_channels: TypedStore::new(),
                mcp: McpConnectionManager::new(),
                secrets: InMemorySecretStore::new(),
                leases: LeaseStore::new("default"),
                task_mutexes: TaskMutexMap::new(),
                human_layer: Arc::new(NoopHumanLayer),
            }
        }

        fn ctx(&self) -> TaskControllerContext<'_> {
            TaskControllerContext {
                tasks: &self.tasks,
                tool_calls: &self.tool_calls,
                agents: &self.agents,
                llms: &self.llms,
                contact_channels: &self.contact_channels,
                mcp: &self.mcp,
                secrets: &self.secrets,
                leases: &self.leases,
                task_mutexes: &self.task_mutexes,
                human_layer: self.human_layer.clone(),
                events: &TracingEventRecorder,
                pod_name: "test-pod",
            }
        }
    }

    async fn seed_ready_agent(fx: &Fixture) {
        let mut data = HashMap::new();
        data.insert("apiKey".to_string(), b"sk-test".to_vec());
        fx.secrets.insert("default", "openai-creds", data);

        fx.llms
            .create(LlmResource {
                meta: ObjectMeta::new("default", "my-llm"),
                spec: LlmSpec {
                    provider: Provider::Openai,
                    api_key_secret_ref: SecretKeyRef {
                        name: "openai-creds".to_string(),
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

        fx.agents
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
                status: AgentStatus {
                    ready: true,
                    status_detail: "ok".to_string(),
                    contact_channel_ready: HashMap::new(),
                },
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fresh_task_allocates_trace_id_then_requeues_immediately() {
        let fx = Fixture::new();
        seed_ready_agent(&fx).await;

        fx.tasks
            .create(Task {
                meta: ObjectMeta::new("default", "t1"),
                spec: crate::acp::resources::task::TaskSpec {
                    agent_ref: "assistant".to_string(),
                    user_message: Some("hello".to_string()),
                    context_window: None,
                    contact_channel_ref: None,
                    v1beta3_respond_via_tool_call: false,
                },
                status: Default::default(),
            })
            .await
            .unwrap();

        let outcome = reconcile(&fx.ctx(), "default", "t1").await;
        assert!(matches!(outcome, ReconcileOutcome::RequeueImmediate));
        let updated = fx.tasks.get("default", "t1").await.unwrap();
        assert!(!updated.status.trace_id.is_empty());
        assert_eq!(updated.status.phase, TaskPhase::Initializing);
    }

    #[tokio::test]
    async fn task_with_both_user_message_and_context_window_fails() {
        let fx = Fixture::new();
        seed_ready_agent(&fx).await;

        fx.tasks
            .create(Task {
                meta: ObjectMeta::new("default", "t1"),
                spec: crate::acp::resources::task::TaskSpec {
                    agent_ref: "assistant".to_string(),
                    user_message: Some("hello".to_string()),
                    context_window: Some(vec![Message::user("hi")]),
                    contact_channel_ref: None,
                    v1beta3_respond_via_tool_call: false,
                },
                status: crate::acp::resources::task::TaskStatus {
                    trace_id: "trace".to_string(),
                    span_id: "span".to_string(),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        reconcile(&fx.ctx(), "default", "t1").await;
        let updated = fx.tasks.get("default", "t1").await.unwrap();
        assert_eq!(updated.status.phase, TaskPhase::Failed);
    }

    #[tokio::test]
    async fn task_parks_pending_when_agent_not_ready() {
        let fx = Fixture::new();

        fx.agents
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

        fx.tasks
            .create(Task {
                meta: ObjectMeta::new("default", "t1"),
                spec: crate::acp::resources::task::TaskSpec {
                    agent_ref: "assistant".to_string(),
                    user_message: Some("hello".to_string()),
                    context_window: None,
                    contact_channel_ref: None,
                    v1beta3_respond_via_tool_call: false,
                },
                status: crate::acp::resources::task::TaskStatus {
                    trace_id: "trace".to_string(),
                    span_id: "span".to_string(),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        let outcome = reconcile(&fx.ctx(), "default", "t1").await;
        assert!(matches!(outcome, ReconcileOutcome::RequeueAfter(_)));
        let updated = fx.tasks.get("default", "t1").await.unwrap();
        assert_eq!(updated.status.phase, TaskPhase::Pending);
    }

    #[tokio::test]
    async fn ready_task_builds_transcript_and_advances_to_ready_for_llm() {
        let fx = Fixture::new();
        seed_ready_agent(&fx).await;

        fx.tasks
            .create(Task {
                meta: ObjectMeta::new("default", "t1"),
                spec: crate::acp::resources::task::TaskSpec {
                    agent_ref: "assistant".to_string(),
                    user_message: Some("hello".to_string()),
                    context_window: None,
                    contact_channel_ref: None,
                    v1beta3_respond_via_tool_call: false,
                },
                status: crate::acp::resources::task::TaskStatus {
                    trace_id: "trace".to_string(),
                    span_id: "span".to_string(),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        reconcile(&fx.ctx(), "default", "t1").await;
        let updated = fx.tasks.get("default", "t1").await.unwrap();
        assert_eq!(updated.status.phase, TaskPhase::ReadyForLlm);
        assert_eq!(updated.status.transcript.len(), 2);
        assert_eq!(updated.status.user_message_preview, "hello");
    }

    #[tokio::test]
    async fn tool_calls_pending_stays_put_until_all_children_terminal() {
        let fx = Fixture::new();
        seed_ready_agent(&fx).await;

        fx.tasks
            .create(Task {
                meta: ObjectMeta::new("default", "t1"),
                spec: crate::acp::resources::task::TaskSpec {
                    agent_ref: "assistant".to_string(),
                    user_message: Some("hello".to_string()),
                    context_window: None,
                    contact_channel_ref: None,
                    v1beta3_respond_via_tool_call: false,
                },
                status: crate::acp::resources::task::TaskStatus {
                    trace_id: "trace".to_string(),
                    span_id: "span".to_string(),
                    phase: TaskPhase::ToolCallsPending,
                    tool_call_request_id: "abc1234".to_string(),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        fx.tool_calls
            .create(ToolCall {
                meta: ObjectMeta::new("default", "t1-abc1234-tc-01").with_label(LABEL_TOOLCALLREQUEST, "abc1234"),
                spec: ToolCallSpec {
                    task_ref: "t1".to_string(),
                    tool_name: "fetch__fetch".to_string(),
                    tool_type: ToolType::Mcp,
                    tool_call_id: "call_1".to_string(),
                    arguments: "{}".to_string(),
                },
                status: ToolCallStatus::default(),
            })
            .await
            .unwrap();

        let outcome = reconcile(&fx.ctx(), "default", "t1").await;
        assert!(matches!(outcome, ReconcileOutcome::RequeueAfter(_)));
        let updated = fx.tasks.get("default", "t1").await.unwrap();
        assert_eq!(updated.status.phase, TaskPhase::ToolCallsPending);
    }

    #[tokio::test]
    async fn tool_calls_pending_resumes_once_children_are_terminal() {
        let fx = Fixture::new();
        seed_ready_agent(&fx).await;

        fx.tasks
            .create(Task {
                meta: ObjectMeta::new("default", "t1"),
                spec: crate::acp::resources::task::TaskSpec {
                    agent_ref: "assistant".to_string(),
                    user_message: Some("hello".to_string()),
                    context_window: None,
                    contact_channel_ref: None,
                    v1beta3_respond_via_tool_call: false,
                },
                status: crate::acp::resources::task::TaskStatus {
                    trace_id: "trace".to_string(),
                    span_id: "span".to_string(),
                    phase: TaskPhase::ToolCallsPending,
                    tool_call_request_id: "abc1234".to_string(),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        fx.tool_calls
            .create(ToolCall {
                meta: ObjectMeta::new("default", "t1-abc1234-tc-01").with_label(LABEL_TOOLCALLREQUEST, "abc1234"),
                spec: ToolCallSpec {
                    task_ref: "t1".to_string(),
                    tool_name: "fetch__fetch".to_string(),
                    tool_type: ToolType::Mcp,
                    tool_call_id: "call_1".to_string(),
                    arguments: "{}".to_string(),
                },
                status: crate::acp::resources::toolcall::ToolCallStatus {
                    phase: crate::acp::resources::toolcall::ToolCallPhase::Succeeded,
                    result: Some("42".to_string()),
                    ..Default::default()
                },
            })
            .await
            .unwrap();

        let outcome = reconcile(&fx.ctx(), "default", "t1").await;
        assert!(matches!(outcome, ReconcileOutcome::RequeueImmediate));
        let updated = fx.tasks.get("default", "t1").await.unwrap();
        assert_eq!(updated.status.phase, TaskPhase::ReadyForLlm);
        let last = updated.status.transcript.last().unwrap();
        assert_eq!(last.role, crate::acp::resources::message::Role::Tool);
        assert_eq!(last.content, "42");
    }
}
