//! The `Runtime` aggregate, spec.md §9 "Global mutable state: forbid
//! ambient globals; every component receives what it needs by explicit
//! reference through a `Runtime` value."
//!
//! Generalized from the teacher's `mofa-runtime::runtime::Runtime`
//! (owns the registry, bus and scheduler, exposes one `bootstrap`/`run`
//! entry point) — this is the only place the bus's status lookup and
//! interruption hook get wired to `OrgPrimitives`/`LlmHandler`, since
//! those two are constructed independently and each needs a handle to
//! the other.

use crate::bus::{AgentStatusLookup, MessageBus};
use crate::context_builder::ContextBuilder;
use crate::conversation_manager::ConversationManager;
use crate::llm_handler::LlmHandler;
use crate::org::OrgPrimitives;
use crate::persistence::PersistenceLayout;
use crate::retry::RetryConfig;
use crate::scheduler::{Scheduler, SchedulerStats};
use crate::tools::builtin::register_all;
use crate::tools::ToolDispatcher;
use orgkernel::{ArtifactStore, CoreResult, LlmClient, Role, RuntimeConfig, ShutdownMode};
use std::sync::Arc;

/// Every collaborator the runtime needs, wired together once at startup
/// (spec.md §4 component list). Construct with [`RuntimeBuilder`].
pub struct Runtime {
    pub org: Arc<OrgPrimitives>,
    pub bus: MessageBus,
    pub conversations: Arc<ConversationManager>,
    pub tool_dispatcher: Arc<ToolDispatcher>,
    pub llm_handler: Arc<LlmHandler>,
    pub scheduler: Arc<Scheduler>,
}

impl Runtime {
    /// Load persisted state (if any) and ensure the distinguished `user`
    /// and `root` agents exist (spec.md §4.7 "Load semantics").
    pub fn bootstrap(&self, root_role: Role) -> CoreResult<()> {
        self.org.load()?;
        self.org.bootstrap(root_role)?;
        let agent_ids: Vec<String> = self.org.list_agents().into_iter().map(|a| a.id).collect();
        self.conversations.load(&agent_ids)?;
        Ok(())
    }

    /// Run the scheduler loop until shutdown is requested (spec.md §4.2).
    pub async fn run(&self) {
        self.scheduler.run().await;
    }

    pub fn request_shutdown(&self, mode: ShutdownMode) {
        self.scheduler.request_shutdown(mode);
    }

    pub fn stats(&self, in_flight: usize) -> SchedulerStats {
        self.scheduler.stats(in_flight)
    }
}

/// Assembles a [`Runtime`] from its external collaborators (spec.md §6
/// "External interfaces"): an LLM client and an artifact store, both
/// supplied by the caller since neither has an in-repo implementation.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    llm_client: Arc<dyn LlmClient>,
    artifacts: Arc<dyn ArtifactStore>,
    context_builder: ContextBuilder,
    extra_tools: Vec<Arc<dyn crate::tools::Tool>>,
}

impl RuntimeBuilder {
    pub fn new(config: RuntimeConfig, llm_client: Arc<dyn LlmClient>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self {
            config,
            llm_client,
            artifacts,
            context_builder: ContextBuilder::default(),
            extra_tools: Vec::new(),
        }
    }

    pub fn with_context_builder(mut self, builder: ContextBuilder) -> Self {
        self.context_builder = builder;
        self
    }

    /// Register an additional tool beyond the built-ins (spec.md §4.4
    /// "module tools").
    pub fn with_tool(mut self, tool: Arc<dyn crate::tools::Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    pub fn build(self) -> Runtime {
        let layout = PersistenceLayout::new(self.config.runtime_dir.clone());
        let org = Arc::new(OrgPrimitives::new(layout.clone()));
        let conversations = Arc::new(ConversationManager::new(
            layout,
            self.config.context_limit,
            std::time::Duration::from_millis(self.config.persist_debounce_ms),
        ));
        let bus = MessageBus::new(Arc::new(orgkernel::SystemClock));
        bus.set_status_lookup(org.clone() as Arc<dyn AgentStatusLookup>);

        let mut dispatcher = ToolDispatcher::new();
        register_all(&mut dispatcher);
        for tool in self.extra_tools {
            dispatcher.register(tool);
        }
        let tool_dispatcher = Arc::new(dispatcher);

        let llm_handler = Arc::new(LlmHandler::new(
            org.clone(),
            bus.clone(),
            conversations.clone(),
            self.context_builder,
            tool_dispatcher.clone(),
            self.llm_client,
            self.artifacts,
            RetryConfig::default(),
            self.config.max_tool_rounds,
            self.config.runtime_dir.clone(),
        ));
        bus.set_interruption_hook(llm_handler.clone());

        let scheduler = Arc::new(Scheduler::new(
            org.clone(),
            bus.clone(),
            conversations.clone(),
            llm_handler.clone(),
            self.config.max_concurrent,
            std::time::Duration::from_millis(25),
        ));

        Runtime { org, bus, conversations, tool_dispatcher, llm_handler, scheduler }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use orgkernel::{AbortSignal, Artifact, ChatRequest, ChatResponse, ROOT_AGENT_ID, USER_AGENT_ID};

    struct NullArtifacts;
    #[async_trait]
    impl ArtifactStore for NullArtifacts {
        async fn put_artifact(&self, _artifact_type: &str, _content: &str, _meta: Option<serde_json::Value>) -> CoreResult<String> {
            Ok("a1".into())
        }
        async fn get_artifact(&self, _reference: &str) -> CoreResult<Option<Artifact>> {
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

    #[tokio::test]
    async fn bootstrap_creates_distinguished_agents_and_wires_bus() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RuntimeConfig::default();
        config.runtime_dir = dir.path().to_path_buf();
        let runtime = RuntimeBuilder::new(config, Arc::new(EchoLlm), Arc::new(NullArtifacts)).build();
        runtime.bootstrap(Role::new("root", "you are root")).unwrap();

        assert!(runtime.org.get_agent(ROOT_AGENT_ID).is_some());
        assert!(runtime.org.get_agent(USER_AGENT_ID).is_some());

        // The bus's status lookup is wired: sending to a registered agent
        // succeeds, to an unregistered one rejects.
        runtime
            .bus
            .send(crate::bus::SendRequest::new(ROOT_AGENT_ID, USER_AGENT_ID, serde_json::json!({"text": "hi"})))
            .await
            .unwrap();
        let err = runtime
            .bus
            .send(crate::bus::SendRequest::new("ghost", USER_AGENT_ID, serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, orgkernel::CoreError::AgentNotFound(id) if id == "ghost"));
    }
}
