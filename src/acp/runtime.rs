//! Wires the store, MCP connection manager, secrets, and HumanLayer client
//! together with one watch-fed reconcile loop per resource kind.
//!
//! The full distributed control plane (informers, leader election across
//! many processes) is out of scope (§2); what's here is the scheduler that
//! actually drives the in-memory reference store to convergence for tests,
//! local runs, and the `acp-controller-manager` binary: a bounded pool of
//! workers per resource kind, pulling from that kind's own [`WorkQueue`],
//! fed by [`WatchEvent`]s and by a controller's own
//! [`ReconcileOutcome::RequeueAfter`] delayed re-enqueue, until the supplied
//! [`CancellationToken`] fires. Distinct keys reconcile in parallel; the
//! queue itself guarantees a given key is never run by two workers at once
//! (§6 "Each controller has a bounded worker pool... across resources,
//! reconciles run in parallel").

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::acp::controllers::{
    agent_controller, contactchannel_controller, llm_controller, mcpserver_controller, task_controller,
    toolcall_controller,
};
use crate::acp::events::{EventRecorder, TracingEventRecorder};
use crate::acp::humanlayer::HumanLayerClient;
use crate::acp::mcp::McpConnectionManager;
use crate::acp::reconcile::{ReconcileOutcome, ResourceKey};
use crate::acp::resources::{Agent, ContactChannel, LlmResource, McpServerResource, Task, ToolCall};
use crate::acp::secrets::SecretStore;
use crate::acp::store::lease::LeaseStore;
use crate::acp::store::memory::TypedStore;
use crate::acp::store::{Resource, WatchEvent};

/// Workers reconciling a single resource kind. Width, not depth: each Task
/// (or Agent, or ToolCall, ...) still only ever has one reconcile in flight,
/// but unrelated Tasks reconcile concurrently instead of queuing behind one
/// another.
const WORKERS_PER_KIND: usize = 4;

/// Everything a controller loop needs to exist: the typed stores, the
/// process-wide MCP registry, the secret/lease/mutex/human-layer plumbing,
/// and the pod identity used as the lease-holder.
pub struct Runtime {
    pub agents: TypedStore<Agent>,
    pub llms: TypedStore<LlmResource>,
    pub mcp_servers: TypedStore<McpServerResource>,
    pub contact_channels: TypedStore<ContactChannel>,
    pub tasks: TypedStore<Task>,
    pub tool_calls: TypedStore<ToolCall>,

    pub mcp: McpConnectionManager,
    pub leases: LeaseStore,
    pub task_mutexes: task_controller::TaskMutexMap,

    pub secrets: Box<dyn SecretStore>,
    /// `Arc`, not `Box`: the final-answer notification is detached into its
    /// own task (§6 "done asynchronously"), which needs an owned, cloneable
    /// handle that outlives the reconcile call that spawned it.
    pub human_layer: Arc<dyn HumanLayerClient>,
    pub events: Box<dyn EventRecorder>,

    pub pod_namespace: String,
    pub pod_name: String,
}

impl Runtime {
    /// Build a runtime over fresh in-memory stores, given the external
    /// plumbing (secrets, HumanLayer client) a caller has already chosen.
    pub fn new(
        pod_namespace: impl Into<String>,
        pod_name: impl Into<String>,
        secrets: Box<dyn SecretStore>,
        human_layer: Arc<dyn HumanLayerClient>,
    ) -> Self {
        Self {
            agents: TypedStore::new(),
            llms: TypedStore::new(),
            mcp_servers: TypedStore::new(),
            contact_channels: TypedStore::new(),
            tasks: TypedStore::new(),
            tool_calls: TypedStore::new(),
            mcp: McpConnectionManager::new(),
            leases: LeaseStore::new(pod_namespace.into()),
            task_mutexes: task_controller::TaskMutexMap::new(),
            secrets,
            human_layer,
            events: Box::new(TracingEventRecorder),
            pod_namespace: String::new(),
            pod_name: pod_name.into(),
        }
        .with_namespace_fixed()
    }

    // `leases.namespace()` is set from the first constructor argument above;
    // `pod_namespace` itself is tracked separately since callers query it
    // directly (e.g. to scope which namespace's resources this process
    // reconciles).
    fn with_namespace_fixed(mut self) -> Self {
        self.pod_namespace = self.leases.namespace().to_string();
        self
    }

    /// Spawn every controller's reconcile loop, returning their join
    /// handles. Loops run until `shutdown` is cancelled.
    pub fn spawn_controllers(self: &Arc<Self>, shutdown: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.spawn_agent_loop(shutdown.clone()),
            self.spawn_llm_loop(shutdown.clone()),
            self.spawn_mcpserver_loop(shutdown.clone()),
            self.spawn_contactchannel_loop(shutdown.clone()),
            self.spawn_task_loop(shutdown.clone()),
            self.spawn_toolcall_loop(shutdown),
        ]
    }

    fn spawn_agent_loop(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let rt = self.clone();
        let watch = self.agents.watch();
        run_loop(watch, shutdown, move |key| {
            let rt = rt.clone();
            async move {
                let deps = agent_controller::AgentDependencyStores {
                    llms: &rt.llms,
                    mcp_servers: &rt.mcp_servers,
                    contact_channels: &rt.contact_channels,
                    agents: &rt.agents,
                };
                agent_controller::reconcile(&rt.agents, &deps, rt.events.as_ref(), &key.namespace, &key.name).await
            }
        })
    }

    fn spawn_llm_loop(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let rt = self.clone();
        let watch = self.llms.watch();
        run_loop(watch, shutdown, move |key| {
            let rt = rt.clone();
            async move { llm_controller::reconcile(&rt.llms, rt.secrets.as_ref(), rt.events.as_ref(), &key.namespace, &key.name).await }
        })
    }

    fn spawn_mcpserver_loop(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let rt = self.clone();
        let watch = self.mcp_servers.watch();
        run_loop(watch, shutdown, move |key| {
            let rt = rt.clone();
            async move {
                mcpserver_controller::reconcile(
                    &rt.mcp_servers,
                    &rt.mcp,
                    rt.secrets.as_ref(),
                    rt.events.as_ref(),
                    &key.namespace,
                    &key.name,
                )
                .await
            }
        })
    }

    fn spawn_contactchannel_loop(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let rt = self.clone();
        let watch = self.contact_channels.watch();
        run_loop(watch, shutdown, move |key| {
            let rt = rt.clone();
            async move {
                contactchannel_controller::reconcile(
                    &rt.contact_channels,
                    rt.secrets.as_ref(),
                    rt.events.as_ref(),
                    &key.namespace,
                    &key.name,
                )
                .await
            }
        })
    }

    fn spawn_task_loop(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let rt = self.clone();
        let watch = self.tasks.watch();
        run_loop(watch, shutdown, move |key| {
            let rt = rt.clone();
            async move {
                let ctx = task_controller::TaskControllerContext {
                    tasks: &rt.tasks,
                    tool_calls: &rt.tool_calls,
                    agents: &rt.agents,
                    llms: &rt.llms,
                    contact_channels: &rt.contact_channels,
                    mcp: &rt.mcp,
                    secrets: rt.secrets.as_ref(),
                    leases: &rt.leases,
                    task_mutexes: &rt.task_mutexes,
                    human_layer: rt.human_layer.clone(),
                    events: rt.events.as_ref(),
                    pod_name: &rt.pod_name,
                };
                task_controller::reconcile(&ctx, &key.namespace, &key.name).await
            }
        })
    }

    fn spawn_toolcall_loop(self: &Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let rt = self.clone();
        let watch = self.tool_calls.watch();
        run_loop(watch, shutdown, move |key| {
            let rt = rt.clone();
            async move {
                let ctx = toolcall_controller::ToolCallControllerContext {
                    tool_calls: &rt.tool_calls,
                    tasks: &rt.tasks,
                    mcp_servers: &rt.mcp_servers,
                    mcp: &rt.mcp,
                    human_layer: rt.human_layer.as_ref(),
                    events: rt.events.as_ref(),
                };
                toolcall_controller::reconcile(&ctx, &key.namespace, &key.name).await
            }
        })
    }
}

/// Per-kind work queue (modeled on a Kubernetes controller workqueue): keys
/// are deduplicated while sitting in the queue, and a key already being
/// reconciled by a worker is marked dirty instead of handed to a second
/// worker — it's re-enqueued the instant the in-flight run finishes. This is
/// what lets [`run_loop`] hand out distinct keys to [`WORKERS_PER_KIND`]
/// workers concurrently while still serializing same-key reconciles.
struct WorkQueue {
    state: Mutex<WorkQueueState>,
    notify: Notify,
}

#[derive(Default)]
struct WorkQueueState {
    queue: VecDeque<ResourceKey>,
    queued: HashSet<ResourceKey>,
    processing: HashSet<ResourceKey>,
    /// Reconciled again once the in-flight run for this key finishes,
    /// because a fresh watch event arrived for it while it was processing.
    dirty: HashSet<ResourceKey>,
    /// Keys with an outstanding delayed `push` (`RequeueAfter`/backoff)
    /// sleeper, so a burst of identical delays doesn't spawn redundant ones.
    scheduled_delay: HashSet<ResourceKey>,
}

impl WorkQueue {
    fn new() -> Self {
        Self {
            state: Mutex::new(WorkQueueState::default()),
            notify: Notify::new(),
        }
    }

    fn push(&self, key: ResourceKey) {
        let mut state = self.state.lock().unwrap();
        if state.processing.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.queued.insert(key.clone()) {
            state.queue.push_back(key);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Schedule `key` to be pushed again after `delay`, unless a delayed
    /// push for it is already pending — a burst of `RequeueAfter` results
    /// for the same key shouldn't spawn redundant sleepers.
    fn push_after(self: &Arc<Self>, key: ResourceKey, delay: Duration, shutdown: &CancellationToken) {
        if !self.state.lock().unwrap().scheduled_delay.insert(key.clone()) {
            return;
        }
        let this = self.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    this.state.lock().unwrap().scheduled_delay.remove(&key);
                    this.push(key);
                }
            }
        });
    }

    async fn pop(&self) -> ResourceKey {
        loop {
            {
                let mut state = self.state.lock().unwrap();
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());
                    return key;
                }
            }
            self.notify.notified().await;
        }
    }

    fn done(&self, key: &ResourceKey) {
        let mut state = self.state.lock().unwrap();
        state.processing.remove(key);
        if state.dirty.remove(key) && state.queued.insert(key.clone()) {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }
}

/// Drive one resource kind's reconcile loop: a feeder task turns watch
/// events into work-queue pushes, and [`WORKERS_PER_KIND`] worker tasks pull
/// from that shared queue, each handling one key's reconcile (and its own
/// `RequeueImmediate`/`RequeueAfter` follow-up) at a time. Distinct Tasks (or
/// Agents, or ToolCalls, ...) reconcile in parallel; the queue's dedup/dirty
/// tracking keeps any one key single-flight.
fn run_loop<T, F, Fut>(
    mut watch: tokio::sync::broadcast::Receiver<WatchEvent<T>>,
    shutdown: CancellationToken,
    reconcile_one: F,
) -> tokio::task::JoinHandle<()>
where
    T: Resource,
    F: Fn(ResourceKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ReconcileOutcome> + Send + 'static,
{
    let queue = Arc::new(WorkQueue::new());
    let reconcile_one = Arc::new(reconcile_one);

    let feeder = {
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = watch.recv() => {
                        match event {
                            Ok(WatchEvent::Added(r) | WatchEvent::Modified(r)) => {
                                let meta = r.metadata();
                                queue.push(ResourceKey::new(meta.namespace.clone(), meta.name.clone()));
                            }
                            Ok(WatchEvent::Deleted(_)) => {}
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        })
    };

    let workers: Vec<_> = (0..WORKERS_PER_KIND)
        .map(|_| {
            let queue = queue.clone();
            let shutdown = shutdown.clone();
            let reconcile_one = reconcile_one.clone();
            tokio::spawn(async move {
                loop {
                    let key = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        key = queue.pop() => key,
                    };

                    match reconcile_one(key.clone()).await {
                        ReconcileOutcome::Done => {}
                        ReconcileOutcome::RequeueImmediate => queue.push(key.clone()),
                        ReconcileOutcome::RequeueAfter(delay) => queue.push_after(key.clone(), delay, &shutdown),
                        ReconcileOutcome::Error(e) => {
                            tracing::warn!(error = %e, namespace = %key.namespace, name = %key.name, "reconcile error, backing off");
                            queue.push_after(key.clone(), Duration::from_secs(5), &shutdown);
                        }
                    }

                    queue.done(&key);
                }
            })
        })
        .collect();

    tokio::spawn(async move {
        let _ = feeder.await;
        for worker in workers {
            let _ = worker.await;
        }
    })
}
