//! A local, no-network `LlmClient` for running the CLI without a wired-up
//! model provider, spec.md §6: "No concrete implementation lives in this
//! repo — callers supply a fake (tests) or a real transport". `orgcli`
//! needs *something* to boot `agentmesh run` against out of the box, so
//! this echoes the latest user turn back with no tool calls — enough to
//! exercise spawn/send/run end to end. Point `--llm-service-id` at a real
//! provider's adapter (implementing `orgkernel::LlmClient`) for anything
//! beyond a smoke test.

use async_trait::async_trait;
use orgkernel::{AbortSignal, ChatRequest, ChatResponse, ConversationEntry, CoreResult};

pub struct EchoLlmClient;

#[async_trait]
impl orgkernel::LlmClient for EchoLlmClient {
    async fn chat(&self, request: ChatRequest, abort: AbortSignal) -> CoreResult<ChatResponse> {
        if abort.is_aborted() {
            return Err(orgkernel::CoreError::LlmAborted);
        }
        let last_user_text = request
            .messages
            .iter()
            .rev()
            .find_map(|entry| match entry {
                ConversationEntry::User { content } => Some(content.as_text()),
                _ => None,
            })
            .unwrap_or_default();
        Ok(ChatResponse {
            content: Some(format!("(echo) received: {last_user_text}")),
            tool_calls: Vec::new(),
            reasoning_content: None,
            usage: Some(orgkernel::TokenUsage {
                prompt_tokens: last_user_text.len() as u32,
                completion_tokens: 8,
                total_tokens: last_user_text.len() as u32 + 8,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgkernel::LlmClient;

    #[tokio::test]
    async fn echoes_last_user_message() {
        let client = EchoLlmClient;
        let request = ChatRequest {
            messages: vec![ConversationEntry::user("hello there")],
            tools: vec![],
            service_id: None,
        };
        let response = client.chat(request, AbortSignal::new()).await.unwrap();
        assert!(response.content.unwrap().contains("hello there"));
    }

    #[tokio::test]
    async fn aborted_signal_short_circuits() {
        let client = EchoLlmClient;
        let abort = AbortSignal::new();
        abort.abort();
        let request = ChatRequest { messages: vec![], tools: vec![], service_id: None };
        let err = client.chat(request, abort).await.unwrap_err();
        assert!(matches!(err, orgkernel::CoreError::LlmAborted));
    }
}
