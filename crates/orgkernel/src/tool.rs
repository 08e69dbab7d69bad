//! Tool data types shared between `orgruntime`'s dispatcher and the
//! conversation entries it produces (spec.md §4.4).
//!
//! Generalized from the teacher's `mofa-kernel::agent::components::tool`
//! (`ToolDescriptor`, `ToolMetadata`) split between "what a tool looks
//! like" (kept here, kernel-owned, data only) and "how it is registered
//! and dispatched" (the `Tool` trait and `ToolDispatcher`, which live in
//! `orgruntime` since they depend on the running `Runtime`).

use crate::conversation::MessageContent;
use serde::{Deserialize, Serialize};

/// The authorisation bucket a tool belongs to, matched against a role's
/// `toolGroups` (spec.md §3.1, §4.4 "Authorisation").
pub type ToolGroup = String;

/// Declares one callable tool: name, description, JSON-Schema parameters,
/// and the group used for role-based authorisation. This is the shape
/// merged into the per-turn tool catalog sent to the LLM (spec.md §4.3
/// step 3, §9 "Dynamic tool dispatch").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
    pub group: ToolGroup,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: serde_json::Value,
        group: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            group: group.into(),
        }
    }
}

/// The result of dispatching one tool call, serialized by the LlmHandler
/// into a `tool` conversation entry (spec.md §4.3 step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub content: MessageContent,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn success(content: impl Into<String>) -> Self {
        Self { content: MessageContent::text(content), is_error: false }
    }

    pub fn success_content(content: MessageContent) -> Self {
        Self { content, is_error: false }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { content: MessageContent::text(message), is_error: true }
    }
}

/// Errors surfaced by tool resolution/authorisation/execution (spec.md §7
/// taxonomy subset: `tool_not_found`, `tool_disallowed`,
/// `missing_parameter`, plus a catch-all execution failure). Every
/// variant round-trips into a `tool` entry via [`ToolError::into_outcome`]
/// rather than aborting the turn (spec.md §4.3 "Error handling").
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ToolError {
    #[error("tool '{0}' not found")]
    NotFound(String),

    #[error("tool '{tool}' is not permitted for role '{role}'")]
    Disallowed { tool: String, role: String },

    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("tool execution failed: {0}")]
    Execution(String),

    #[error("tool not implemented: {0}")]
    NotImplemented(String),
}

impl ToolError {
    pub fn into_outcome(self) -> ToolOutcome {
        ToolOutcome::error(self.to_string())
    }
}
