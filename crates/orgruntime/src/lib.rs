//! `orgruntime` — every concrete implementation the agentmesh runtime
//! needs, built on the types and traits `orgkernel` declares.
//!
//! Per the teacher's (`mofa-kernel`/`mofa-runtime`) split: `orgkernel`
//! fixes the vocabulary, this crate does the work. Module layout mirrors
//! the component list in spec.md §4: a message bus, an org/agent
//! registry, a conversation manager, a context builder, a tool
//! dispatcher, an LLM handler, a scheduler and the `Runtime` aggregate
//! that wires them together.

pub mod bus;
pub mod context_builder;
pub mod conversation_manager;
pub mod llm_handler;
pub mod org;
pub mod persistence;
pub mod retry;
pub mod runtime;
pub mod scheduler;
pub mod tools;

pub use bus::{AgentStatusLookup, InterruptionHook, MessageBus, NoopInterruptionHook, SendOutcome, SendRequest};
pub use context_builder::ContextBuilder;
pub use conversation_manager::{CompressOutcome, ConsistencyReport, ContextReport, ConversationManager};
pub use llm_handler::LlmHandler;
pub use org::OrgPrimitives;
pub use persistence::{ConversationRecord, OrgDocument, PersistenceLayout, TerminationRecord};
pub use retry::{retry_with_policy, RetryConfig, RetryPolicy};
pub use runtime::{Runtime, RuntimeBuilder};
pub use scheduler::{Scheduler, SchedulerStats};
pub use tools::{AgentCtx, Tool, ToolDispatcher};
