//! One agent-turn over its conversation, spec.md §4.3.
//!
//! Generalized from the teacher's `mofa-foundation::llm::agent::LLMAgent`
//! (`chat_with_session`/`ask` builder-style request assembly, tool
//! execution wired through a `ToolExecutor`, before/after/on-error hooks
//! around the model call) narrowed to a stateless-per-turn shape: there is
//! no persistent chat session object, just the agent's conversation
//! entries rebuilt into a request on every turn (spec.md §4.5 "rebuilt at
//! index 0 on every turn").

use crate::bus::{InterruptionHook, MessageBus, SendRequest};
use crate::conversation_manager::{blocks_turn, ConversationManager};
use crate::context_builder::ContextBuilder;
use crate::org::OrgPrimitives;
use crate::retry::{retry_with_policy, RetryConfig};
use crate::tools::{AgentCtx, ToolDispatcher};
use async_trait::async_trait;
use dashmap::DashMap;
use orgkernel::{
    AbortSignal, ArtifactStore, ChatRequest, ComputeStatus, ContentPart, ConversationEntry,
    CoreError, CoreResult, Envelope, LlmClient, MessageContent, ROOT_AGENT_ID, USER_AGENT_ID,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Runs one agent's turn to completion: merge inbound messages, call the
/// LLM, dispatch any tool calls, repeat until the model stops calling
/// tools or the round budget is spent (spec.md §4.3).
pub struct LlmHandler {
    org: Arc<OrgPrimitives>,
    bus: MessageBus,
    conversations: Arc<ConversationManager>,
    context_builder: ContextBuilder,
    tool_dispatcher: Arc<ToolDispatcher>,
    llm_client: Arc<dyn LlmClient>,
    artifacts: Arc<dyn ArtifactStore>,
    retry_config: RetryConfig,
    max_tool_rounds: u32,
    runtime_dir: PathBuf,
    /// One lock per agent so two handlers can never run the same agent's
    /// turn concurrently (spec.md §8 Property 9).
    turn_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    /// The in-flight LLM call's abort handle, if any, keyed by agent id.
    /// Consulted by [`InterruptionHook::on_interruption_needed`].
    in_flight: DashMap<String, AbortSignal>,
}

impl LlmHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        org: Arc<OrgPrimitives>,
        bus: MessageBus,
        conversations: Arc<ConversationManager>,
        context_builder: ContextBuilder,
        tool_dispatcher: Arc<ToolDispatcher>,
        llm_client: Arc<dyn LlmClient>,
        artifacts: Arc<dyn ArtifactStore>,
        retry_config: RetryConfig,
        max_tool_rounds: u32,
        runtime_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            org,
            bus,
            conversations,
            context_builder,
            tool_dispatcher,
            llm_client,
            artifacts,
            retry_config,
            max_tool_rounds,
            runtime_dir: runtime_dir.into(),
            turn_locks: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    fn lock_for(&self, agent_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.turn_locks.entry(agent_id.to_string()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
    }

    /// Run `agent_id`'s turn: drain its pending inbound messages into the
    /// conversation, then loop request/tool-dispatch until the model
    /// produces a turn with no tool calls, the round budget is exceeded,
    /// or the context is already past the hard limit. Always leaves the
    /// agent `idle` on return (spec.md §4.3 "Terminal states").
    pub async fn run_turn(&self, agent_id: &str) {
        let lock = self.lock_for(agent_id);
        let _guard = lock.lock().await;

        let Some(agent) = self.org.get_agent(agent_id) else {
            tracing::warn!(agent_id, "run_turn for unknown agent, no-op");
            return;
        };
        let Some(role) = self.org.get_role(agent.role_id) else {
            tracing::error!(agent_id, "agent's role no longer resolves, no-op");
            return;
        };

        self.drain_inbound(agent_id);

        // Step 1: a context already past the hard limit never reaches the
        // model — the agent is told to compress instead (spec.md §4.3
        // step 1, §4.6 "Exceeded").
        let status = self.conversations.get_context_status(agent_id);
        if blocks_turn(status.status) {
            self.conversations.append(
                agent_id,
                ConversationEntry::assistant_text(
                    "Your context window is exhausted. Call compress_context before replying to anything else.",
                ),
            );
            self.org.set_status(agent_id, ComputeStatus::Idle);
            self.conversations.persist(agent_id).await;
            return;
        }

        self.conversations.strip_unresolved_tail(agent_id);

        let mut round: u32 = 0;
        loop {
            let request = ChatRequest {
                messages: self.build_messages(agent_id, &agent, &role),
                tools: self.tool_dispatcher.catalog_for(&role),
                service_id: role.llm_service_id.clone(),
            };

            self.org.set_status(agent_id, ComputeStatus::WaitingLlm);
            let abort = AbortSignal::new();
            self.in_flight.insert(agent_id.to_string(), abort.clone());
            let outcome = {
                let client = self.llm_client.clone();
                retry_with_policy(&self.retry_config, || {
                    let client = client.clone();
                    let request = request.clone();
                    let abort = abort.clone();
                    async move { client.chat(request, abort).await }
                })
                .await
            };
            self.in_flight.remove(agent_id);

            let response = match outcome {
                Ok(response) => response,
                Err(CoreError::LlmAborted) => {
                    // Property 8: the conversation must look exactly as it
                    // did before this call — nothing was appended yet.
                    tracing::info!(agent_id, "llm call aborted, turn ends with conversation unchanged");
                    self.org.set_status(agent_id, ComputeStatus::Idle);
                    return;
                }
                Err(err) => {
                    self.escalate_error(agent_id, &agent, &err).await;
                    self.org.set_status(agent_id, ComputeStatus::Idle);
                    self.conversations.persist(agent_id).await;
                    return;
                }
            };

            if let Some(usage) = response.usage {
                self.conversations.update_token_usage(agent_id, usage);
            }

            self.conversations.append(
                agent_id,
                ConversationEntry::assistant_with_tool_calls(
                    response.content.clone(),
                    response.tool_calls.clone(),
                    response.reasoning_content.clone(),
                ),
            );

            if response.tool_calls.is_empty() {
                break;
            }

            self.org.set_status(agent_id, ComputeStatus::Processing);
            round += 1;
            if round > self.max_tool_rounds {
                self.conversations.append(
                    agent_id,
                    ConversationEntry::assistant_text(format!(
                        "tool_rounds_exceeded: stopped after {round} rounds without a final reply"
                    )),
                );
                let err = CoreError::ToolRoundsExceeded(agent_id.to_string(), round);
                self.escalate_error(agent_id, &agent, &err).await;
                break;
            }

            let ctx = self.agent_ctx(agent_id);
            for call in &response.tool_calls {
                let args: serde_json::Value =
                    serde_json::from_str(&call.function.arguments).unwrap_or(serde_json::Value::Null);
                let outcome = self.tool_dispatcher.dispatch(&call.function.name, args, &role, &ctx).await;
                self.conversations.append(agent_id, ConversationEntry::tool_result(call.id.clone(), outcome.content));
            }

            // Interruption merge: messages that arrived while we were
            // waiting on the LLM or dispatching tools join the next
            // request instead of waiting for a future turn.
            self.drain_inbound(agent_id);
        }

        self.org.set_status(agent_id, ComputeStatus::Idle);
        self.conversations.persist(agent_id).await;
    }

    fn build_messages(
        &self,
        agent_id: &str,
        agent: &orgkernel::Agent,
        role: &orgkernel::Role,
    ) -> Vec<ConversationEntry> {
        let task_brief = self.org.get_task_brief(agent_id);
        let contacts = self.org.contacts_of(agent_id);
        let system_prompt = self.context_builder.build_system_prompt(
            agent_id,
            agent.parent_agent_id.as_deref(),
            role,
            task_brief.as_ref(),
            &contacts,
        );
        self.conversations.ensure(agent_id, &system_prompt);
        self.conversations.entries(agent_id)
    }

    /// Pop every currently queued envelope for `agent_id`, record its
    /// sender as a contact if new, and append it as a `user` entry
    /// (spec.md §4.3 step 2, §4.5 "per-message formatter").
    fn drain_inbound(&self, agent_id: &str) {
        while let Some(envelope) = self.bus.receive_next(agent_id) {
            self.append_inbound(agent_id, envelope);
        }
    }

    fn append_inbound(&self, agent_id: &str, envelope: Envelope) {
        let from_role_name = self.org.role_name_of(&envelope.from);
        self.org.observe_correspondent(agent_id, &envelope.from, &from_role_name);
        let content = envelope.text().unwrap_or_default();
        let rendered = self.context_builder.format_inbound(
            agent_id == ROOT_AGENT_ID,
            &envelope.from,
            &from_role_name,
            agent_id,
            envelope.task_id.as_deref(),
            content,
            &envelope.payload,
        );
        self.conversations.append(agent_id, ConversationEntry::user(rendered));
    }

    fn agent_ctx(&self, agent_id: &str) -> AgentCtx {
        AgentCtx {
            agent_id: agent_id.to_string(),
            task_id: None,
            org: self.org.clone(),
            bus: self.bus.clone(),
            conversations: self.conversations.clone(),
            artifacts: self.artifacts.clone(),
            tool_dispatcher: self.tool_dispatcher.clone(),
            runtime_dir: self.runtime_dir.clone(),
        }
    }

    /// A terminal (non-retryable, non-abort) LLM failure is reported to
    /// the agent's parent, or to `user` if the agent is `root` (spec.md
    /// §4.7 "Error escalation").
    async fn escalate_error(&self, agent_id: &str, agent: &orgkernel::Agent, err: &CoreError) {
        let target = agent.parent_agent_id.as_deref().unwrap_or(USER_AGENT_ID);
        let payload = serde_json::json!({
            "kind": "error",
            "errorType": error_type_tag(err),
            "agentId": agent_id,
            "message": err.to_string(),
        });
        if let Err(send_err) = self.bus.send(SendRequest::new(target, agent_id, payload)).await {
            tracing::error!(agent_id, target, %send_err, "failed to escalate llm error to parent/user");
        }
    }

    /// Request cancellation of `agent_id`'s in-flight LLM call, if any.
    /// Returns whether a call was actually in flight.
    pub fn cancel_in_flight(&self, agent_id: &str) -> bool {
        if let Some(abort) = self.in_flight.get(agent_id) {
            abort.abort();
            true
        } else {
            false
        }
    }

    /// Abort every currently in-flight LLM call (spec.md §4.2 "Forced"
    /// shutdown). Turns mid-tool-dispatch are not interrupted — their
    /// next LLM call, if any, will observe an aborted signal instead.
    pub fn abort_all(&self) {
        for entry in self.in_flight.iter() {
            entry.value().abort();
        }
    }
}

fn error_type_tag(err: &CoreError) -> &'static str {
    match err {
        CoreError::LlmTransportError(_) => "llm_transport_error",
        CoreError::ContextExceeded(_) => "context_exceeded",
        CoreError::ToolRoundsExceeded(_, _) => "tool_rounds_exceeded",
        _ => "internal_error",
    }
}

#[async_trait]
impl InterruptionHook for LlmHandler {
    async fn on_interruption_needed(&self, agent_id: &str, _msg: &Envelope) {
        self.cancel_in_flight(agent_id);
    }
}

/// Builds a multimodal [`MessageContent`] for a tool outcome that
/// references a stored artifact, used when a tool result should be shown
/// to the model as an image or file rather than plain text (spec.md §4.3
/// "Multimodal tool results").
pub async fn artifact_content(artifacts: &Arc<dyn ArtifactStore>, reference: &str) -> CoreResult<MessageContent> {
    let Some(artifact) = artifacts.get_artifact(reference).await? else {
        return Ok(MessageContent::Text(format!("artifact not found: {reference}")));
    };
    let part = match artifact.mime_type.as_deref() {
        Some(mime) if mime.starts_with("image/") => ContentPart::ImageUrl { image_url: artifact.content },
        _ => ContentPart::File { file_ref: artifact.id, mime_type: artifact.mime_type },
    };
    Ok(MessageContent::Parts(vec![part]))
}
