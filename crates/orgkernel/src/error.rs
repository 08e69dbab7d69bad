//! Core error taxonomy, spec.md §7.
//!
//! One `thiserror`-derived, `#[non_exhaustive]` enum per the teacher's
//! convention (see `mofa-kernel::bus::traits::MessageBusError` and
//! `mofa-kernel::scheduler::SchedulerError`) rather than one enum per
//! subsystem — the taxonomy in §7 is explicitly process-wide, so a single
//! enum is the faithful rendering.

use crate::conversation::ToolCallId;
use serde::{Deserialize, Serialize};

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CoreError {
    #[error("agent '{0}' is terminating or terminated and cannot receive messages")]
    AgentTerminating(String),

    #[error("agent '{0}' not found")]
    AgentNotFound(String),

    #[error("role '{0}' not found")]
    RoleNotFound(String),

    #[error("agent '{caller}' is not the parent of agent '{target}'")]
    NotChildAgent { caller: String, target: String },

    #[error("parent agent '{0}' does not exist")]
    InvalidParent(String),

    #[error("invalid task brief: {0}")]
    InvalidTaskBrief(String),

    #[error("context window exceeded for agent '{0}'")]
    ContextExceeded(String),

    #[error("tool round budget exceeded for agent '{0}' after {1} rounds")]
    ToolRoundsExceeded(String, u32),

    #[error("tool '{0}' not found")]
    ToolNotFound(String),

    #[error("tool '{tool}' is not permitted for role '{role}'")]
    ToolDisallowed { tool: String, role: String },

    #[error("LLM transport error: {0}")]
    LlmTransportError(String),

    #[error("LLM call aborted")]
    LlmAborted,

    #[error("persistence error: {0}")]
    PersistenceError(String),

    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("orphaned tool response for call id '{0}'")]
    OrphanedToolResponse(ToolCallId),
}

impl CoreError {
    /// Whether this error should be surfaced synchronously to the `send`
    /// caller (spec.md §7 "Bus-level") rather than recorded as a `tool`
    /// entry or escalated to the parent.
    pub fn is_bus_level(&self) -> bool {
        matches!(self, CoreError::AgentTerminating(_))
    }
}
