//! External collaborator contracts: the LLM wire client and the artifact
//! store (spec.md §6). Both are out of scope for the core per spec.md §1
//! — this module only fixes the trait shape callers (tests, `orgcli`)
//! implement against.
//!
//! Generalized from the teacher's `mofa-kernel::llm::provider::LLMProvider`
//! trait, narrowed to the single `chat` operation spec.md §6 specifies
//! and widened with the cancellation (`abortSignal`) and `hasActiveRequest`
//! hooks the interruption path in spec.md §4.3 needs.

use crate::conversation::{ConversationEntry, ToolCall};
use crate::error::CoreResult;
use crate::tool::ToolDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Token counts reported by the LLM client on each call (spec.md §3.8).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One `chat` call's input: the assembled conversation tail and the
/// filtered tool catalog for this turn (spec.md §4.3 step 3).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ConversationEntry>,
    pub tools: Vec<ToolDescriptor>,
    pub service_id: Option<String>,
}

/// The assistant turn returned by the LLM client (spec.md §6).
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub reasoning_content: Option<String>,
    /// `None` when the client omitted usage — ConversationManager then
    /// logs a warning and leaves accounting unchanged (spec.md §4.6).
    pub usage: Option<TokenUsage>,
}

/// Cooperative cancellation signal threaded through one in-flight `chat`
/// call, keyed by agent ID in the LlmHandler's abort registry (spec.md
/// §4.3 "Abort and interruption"). Cloning shares the same underlying
/// flag: the handler holds one clone, the in-flight call observes the
/// other.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The LLM wire client contract the core consumes (spec.md §6). No
/// concrete implementation lives in this repo — callers supply a fake
/// (tests) or a real transport (out of scope per spec.md §1).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, request: ChatRequest, abort: AbortSignal) -> CoreResult<ChatResponse>;
}

/// An artifact retrieved from the external blob store (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub artifact_type: String,
    pub content: String,
    pub is_binary: bool,
    pub mime_type: Option<String>,
    pub meta: Option<serde_json::Value>,
}

/// The artifact store contract the core consumes (spec.md §6). `put`
/// returns an `artifact:<uuid>` reference; `get` resolves one back.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put_artifact(
        &self,
        artifact_type: &str,
        content: &str,
        meta: Option<serde_json::Value>,
    ) -> CoreResult<String>;

    async fn get_artifact(&self, reference: &str) -> CoreResult<Option<Artifact>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_signal_clone_shares_state() {
        let signal = AbortSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_aborted());
        signal.abort();
        assert!(clone.is_aborted());
    }
}
