//! Per-agent conversation entries, spec.md §3.5.
//!
//! Shape is generalized from the teacher's `mofa-kernel::llm::types`
//! `ChatMessage`/`ToolCall`/`MessageContent` (session-style chat history)
//! to the fixed four-variant entry set spec.md §3.5 requires, with the
//! structural invariants I1–I3 owned by `orgruntime`'s conversation
//! manager rather than by this type.

use serde::{Deserialize, Serialize};

/// Identifies one `assistant.tool_calls[*].id` / `tool.tool_call_id` pair.
pub type ToolCallId = String;

/// A tool call requested by the assistant within one [`ConversationEntry::Assistant`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: ToolCallId,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Raw JSON-encoded arguments, exactly as returned by the LLM client
    /// (spec.md §6 `tool_calls[].function.arguments: string`).
    pub arguments: String,
}

/// Content of a `user`/`tool` entry: either plain text or a multimodal
/// parts array (spec.md §3.5, §9 design note (d)).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    pub fn text(s: impl Into<String>) -> Self {
        MessageContent::Text(s.into())
    }

    /// Best-effort flattening to a single string, used for token-estimate
    /// heuristics and for rendering tool results into logs.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.clone()),
                    ContentPart::ImageUrl { .. } => None,
                    ContentPart::File { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// One part of a multimodal content array. The exact shape beyond
/// `{type, ...}` follows the LLM client (spec.md §9 (d)); this is the
/// minimum the core itself constructs for artifact-backed tool results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: String },
    File { file_ref: String, mime_type: Option<String> },
}

/// One entry in a per-agent conversation (spec.md §3.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ConversationEntry {
    System {
        content: String,
    },
    User {
        content: MessageContent,
    },
    Assistant {
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reasoning_content: Option<String>,
    },
    Tool {
        tool_call_id: ToolCallId,
        content: MessageContent,
    },
}

impl ConversationEntry {
    pub fn system(content: impl Into<String>) -> Self {
        ConversationEntry::System { content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ConversationEntry::User { content: MessageContent::text(content) }
    }

    pub fn user_with_content(content: MessageContent) -> Self {
        ConversationEntry::User { content }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        ConversationEntry::Assistant {
            content: Some(content.into()),
            tool_calls: None,
            reasoning_content: None,
        }
    }

    pub fn assistant_with_tool_calls(
        content: Option<String>,
        tool_calls: Vec<ToolCall>,
        reasoning_content: Option<String>,
    ) -> Self {
        ConversationEntry::Assistant {
            content,
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            reasoning_content,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: MessageContent) -> Self {
        ConversationEntry::Tool { tool_call_id: tool_call_id.into(), content }
    }

    /// Tool call ids declared by this entry, if it is an assistant entry
    /// carrying tool calls.
    pub fn tool_call_ids(&self) -> Vec<&ToolCallId> {
        match self {
            ConversationEntry::Assistant { tool_calls: Some(calls), .. } => {
                calls.iter().map(|c| &c.id).collect()
            }
            _ => Vec::new(),
        }
    }

    /// The `tool_call_id` this entry responds to, if it is a tool entry.
    pub fn responds_to(&self) -> Option<&ToolCallId> {
        match self {
            ConversationEntry::Tool { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }

    /// Rough token estimate using the teacher's `chars / 4` heuristic
    /// (`mofa-kernel::agent::components::context_compressor`), used only
    /// as a fallback when the LLM client reports no usage (spec.md §4.6
    /// "Token model").
    pub fn estimated_tokens(&self) -> usize {
        let text_len = match self {
            ConversationEntry::System { content } => content.len(),
            ConversationEntry::User { content } => content.as_text().len(),
            ConversationEntry::Assistant { content, reasoning_content, tool_calls } => {
                let mut len = content.as_deref().map(str::len).unwrap_or(0);
                len += reasoning_content.as_deref().map(str::len).unwrap_or(0);
                if let Some(calls) = tool_calls {
                    for c in calls {
                        len += c.function.name.len() + c.function.arguments.len();
                    }
                }
                len
            }
            ConversationEntry::Tool { content, .. } => content.as_text().len(),
        };
        text_len / 4 + 1
    }
}
