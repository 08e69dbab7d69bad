//! The scheduler main loop, spec.md §4.2, §5 "Concurrency & Resource
//! Model".
//!
//! Generalized from the teacher's `mofa-kernel::scheduler::Scheduler`
//! (tick-driven dispatch loop over `ScheduleDefinition`s, a
//! `JoinSet`-style handle per running job, `ShutdownSignal`-gated
//! graceful/forced stop) narrowed from "run a job on a timer" to "run one
//! agent-turn per idle agent with pending messages, bounded by
//! `maxConcurrent`".

use crate::bus::MessageBus;
use crate::conversation_manager::ConversationManager;
use crate::llm_handler::LlmHandler;
use crate::org::OrgPrimitives;
use orgkernel::{ComputeStatus, ShutdownMode, ShutdownSignal};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// A point-in-time snapshot of scheduler load, exposed for introspection
/// (spec.md §9 supplement: operators need to see what the runtime is
/// doing without reading its logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerStats {
    pub in_flight: usize,
    pub queued_agents: usize,
    pub delayed_count: usize,
}

/// Drives the runtime: delivers due delayed messages, dispatches one
/// [`LlmHandler::run_turn`] per idle agent with a pending message (oldest
/// queued first), up to `max_concurrent` at a time, until shutdown is
/// requested and every in-flight turn has settled (spec.md §4.2).
pub struct Scheduler {
    org: Arc<OrgPrimitives>,
    bus: MessageBus,
    conversations: Arc<ConversationManager>,
    llm_handler: Arc<LlmHandler>,
    max_concurrent: usize,
    poll_interval: Duration,
    shutdown: ShutdownSignal,
    mode: Mutex<ShutdownMode>,
}

impl Scheduler {
    pub fn new(
        org: Arc<OrgPrimitives>,
        bus: MessageBus,
        conversations: Arc<ConversationManager>,
        llm_handler: Arc<LlmHandler>,
        max_concurrent: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            org,
            bus,
            conversations,
            llm_handler,
            max_concurrent: max_concurrent.max(1),
            poll_interval,
            shutdown: ShutdownSignal::new(),
            mode: Mutex::new(ShutdownMode::Graceful),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Begin shutdown in the given mode. Safe to call more than once;
    /// the first call's mode wins (spec.md §4.2 "Graceful vs Forced").
    pub fn request_shutdown(&self, mode: ShutdownMode) {
        if !self.shutdown.is_requested() {
            *self.mode.lock() = mode;
        }
        self.shutdown.request();
    }

    pub fn stats(&self, in_flight: usize) -> SchedulerStats {
        SchedulerStats {
            in_flight,
            queued_agents: self.bus.agents_with_pending_messages().len(),
            delayed_count: self.bus.get_delayed_count(),
        }
    }

    /// Run until shutdown is requested and every dispatched turn has
    /// completed. Returns once the runtime is quiescent and persisted.
    pub async fn run(&self) {
        let mut in_flight: JoinSet<String> = JoinSet::new();

        loop {
            self.bus.deliver_due_messages();

            if !self.shutdown.is_requested() {
                self.dispatch_eligible(&mut in_flight);
            }

            if in_flight.is_empty() {
                if self.shutdown.is_requested() {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = self.shutdown.cancelled() => {}
                }
                continue;
            }

            if self.shutdown.is_requested() && *self.mode.lock() == ShutdownMode::Forced {
                self.llm_handler.abort_all();
            }

            tokio::select! {
                joined = in_flight.join_next() => {
                    if let Some(Err(err)) = joined {
                        tracing::error!(%err, "agent turn task panicked");
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        self.drain_and_persist(in_flight).await;
    }

    fn dispatch_eligible(&self, in_flight: &mut JoinSet<String>) {
        let available = self.max_concurrent.saturating_sub(in_flight.len());
        if available == 0 {
            return;
        }
        let pending = self.bus.agents_with_pending_messages();
        let idle = self.org.idle_among(pending.iter());
        for agent_id in idle.into_iter().take(available) {
            // Claim immediately so the same agent isn't dispatched twice
            // before its handler task gets scheduled (spec.md §8 Property 9).
            self.org.set_status(&agent_id, ComputeStatus::Processing);
            let handler = self.llm_handler.clone();
            let aid = agent_id.clone();
            tracing::debug!(agent_id = %aid, "dispatching agent turn");
            in_flight.spawn(async move {
                handler.run_turn(&aid).await;
                aid
            });
        }
    }

    async fn drain_and_persist(&self, mut in_flight: JoinSet<String>) {
        let mode = *self.mode.lock();
        match mode {
            ShutdownMode::Graceful => {
                self.bus.force_deliver_all_delayed();
                while let Some(joined) = in_flight.join_next().await {
                    if let Err(err) = joined {
                        tracing::error!(%err, "agent turn task panicked during graceful drain");
                    }
                }
            }
            ShutdownMode::Forced => {
                self.llm_handler.abort_all();
                self.bus.discard_all_delayed();
                let drain_budget = Duration::from_secs(5);
                let _ = tokio::time::timeout(drain_budget, async {
                    while let Some(joined) = in_flight.join_next().await {
                        if let Err(err) = joined {
                            tracing::error!(%err, "agent turn task panicked during forced drain");
                        }
                    }
                })
                .await;
                if in_flight.len() > 0 {
                    tracing::warn!(remaining = in_flight.len(), "forced shutdown: abandoning slow turns");
                }
            }
        }

        if let Err(err) = self.org.persist_now() {
            tracing::error!(%err, "org persistence failed during shutdown");
        }
        for (agent_id, err) in self.conversations.flush_all() {
            tracing::error!(agent_id, %err, "conversation persistence failed during shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SendRequest;
    use crate::context_builder::ContextBuilder;
    use crate::persistence::PersistenceLayout;
    use crate::retry::RetryConfig;
    use crate::tools::builtin::register_all;
    use crate::tools::ToolDispatcher;
    use async_trait::async_trait;
    use orgkernel::{AbortSignal, ArtifactStore, ChatRequest, ChatResponse, CoreResult, LlmClient, Role, ROOT_AGENT_ID, USER_AGENT_ID};

    struct NullArtifacts;
    #[async_trait]
    impl ArtifactStore for NullArtifacts {
        async fn put_artifact(&self, _artifact_type: &str, _content: &str, _meta: Option<serde_json::Value>) -> CoreResult<String> {
            Ok("a1".into())
        }
        async fn get_artifact(&self, _reference: &str) -> CoreResult<Option<orgkernel::Artifact>> {
            Ok(None)
        }
    }

    struct EchoLlm;
    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn chat(&self, _request: ChatRequest, _abort: AbortSignal) -> CoreResult<ChatResponse> {
            Ok(ChatResponse { content: Some("ack".into()), ..Default::default() })
        }
    }

    fn scheduler(dir: &std::path::Path) -> (Arc<OrgPrimitives>, MessageBus, Scheduler) {
        let layout = PersistenceLayout::new(dir);
        let org = Arc::new(OrgPrimitives::new(layout.clone()));
        org.bootstrap(Role::new("root", "you are root")).unwrap();
        let conversations = Arc::new(ConversationManager::new(
            layout,
            orgkernel::ContextLimitConfig::default(),
            Duration::from_millis(10),
        ));
        let bus = MessageBus::new(Arc::new(orgkernel::SystemClock));
        bus.set_status_lookup(org.clone() as Arc<dyn crate::bus::AgentStatusLookup>);
        let mut dispatcher = ToolDispatcher::new();
        register_all(&mut dispatcher);
        let llm_handler = Arc::new(LlmHandler::new(
            org.clone(),
            bus.clone(),
            conversations.clone(),
            ContextBuilder::default(),
            Arc::new(dispatcher),
            Arc::new(EchoLlm),
            Arc::new(NullArtifacts),
            RetryConfig::default(),
            200,
            dir,
        ));
        bus.set_interruption_hook(llm_handler.clone());
        let scheduler = Scheduler::new(org.clone(), bus.clone(), conversations, llm_handler, 4, Duration::from_millis(5));
        (org, bus, scheduler)
    }

    #[tokio::test]
    async fn dispatches_idle_agent_with_pending_message_then_quiesces() {
        let dir = tempfile::tempdir().unwrap();
        let (org, bus, scheduler) = scheduler(dir.path());
        bus.send(SendRequest::new(ROOT_AGENT_ID, USER_AGENT_ID, serde_json::json!({"text": "hi"}))).await.unwrap();

        let sched_handle = scheduler.shutdown_signal();
        let runner = tokio::spawn(async move { scheduler.run().await });
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(org.status_of_agent(ROOT_AGENT_ID), ComputeStatus::Idle);
        sched_handle.request();
        tokio::time::timeout(Duration::from_secs(2), runner).await.unwrap().unwrap();
    }
}
