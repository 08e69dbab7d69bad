//! `orgkernel` — the microkernel of the agentmesh runtime.
//!
//! Per the teacher's (`mofa-kernel`) split: this crate holds only types,
//! traits and errors shared by every component. It has no opinion on how a
//! message bus, scheduler or LLM client is actually implemented — those
//! live in `orgruntime`. Keeping the dependency arrow one-directional
//! (`orgruntime` depends on `orgkernel`, never the reverse) is what lets
//! the bus, conversation manager and scheduler be tested in isolation.

pub mod clock;
pub mod config;
pub mod contact;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod message;
pub mod org;
pub mod signal;
pub mod status;
pub mod task_brief;
pub mod tool;

pub use clock::{Clock, SystemClock};
pub use config::{ContextLimitConfig, ContextStatus, RuntimeConfig};
pub use contact::{Contact, ContactRegistry, ContactSource};
pub use conversation::{
    ContentPart, ConversationEntry, MessageContent, ToolCall, ToolCallFunction, ToolCallId,
};
pub use error::{CoreError, CoreResult};
pub use llm::{AbortSignal, Artifact, ArtifactStore, ChatRequest, ChatResponse, LlmClient, TokenUsage};
pub use message::Envelope;
pub use org::{Agent, AgentStatus, Role};
pub use signal::{ShutdownMode, ShutdownSignal};
pub use status::ComputeStatus;
pub use task_brief::{Collaborator, TaskBrief};
pub use tool::{ToolDescriptor, ToolError, ToolGroup, ToolOutcome};

/// The two distinguished agent IDs that always exist, implicitly, per
/// spec.md §3.2.
pub const USER_AGENT_ID: &str = "user";
pub const ROOT_AGENT_ID: &str = "root";
