//! ToolDispatcher and the `Tool` trait, spec.md §4.4, §9 "Dynamic tool
//! dispatch".
//!
//! Generalized from the teacher's `mofa-kernel::agent::components::tool::Tool`
//! trait (`name`/`description`/`parameters_schema`/`execute(input, ctx)`)
//! narrowed to the JSON-args-in, `ToolOutcome`-out shape spec.md §4.4
//! specifies, plus the `group` field used for role-based authorization
//! (spec.md §3.1 `toolGroups`, §4.4 "Authorisation").

pub mod builtin;

use crate::bus::MessageBus;
use crate::conversation_manager::ConversationManager;
use crate::org::OrgPrimitives;
use async_trait::async_trait;
use orgkernel::{ArtifactStore, Role, ToolDescriptor, ToolError, ToolGroup, ToolOutcome};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Handles threaded through every tool call: the calling agent's
/// identity and the runtime collaborators it may need (spec.md §4.4
/// "Tools receive the agent context... and JSON arguments").
pub struct AgentCtx {
    pub agent_id: String,
    pub task_id: Option<String>,
    pub org: Arc<OrgPrimitives>,
    pub bus: MessageBus,
    pub conversations: Arc<ConversationManager>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub tool_dispatcher: Arc<ToolDispatcher>,
    /// Root directory `read_file`/`write_file`/`list_files` are scoped
    /// under (spec.md §4.4 "their bodies do the minimal real thing").
    pub runtime_dir: PathBuf,
}

/// One callable tool. Implementors never panic on bad input — invalid
/// arguments become `Err(ToolError::InvalidArguments)`, which the
/// dispatcher turns into a `tool` entry the LLM observes (spec.md §4.3
/// "Tool errors").
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> serde_json::Value;
    fn group(&self) -> ToolGroup;
    async fn execute(&self, args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name(), self.description(), self.parameters_schema(), self.group())
    }
}

/// Resolves a tool name against the registered built-ins and module
/// tools, filtering by the calling role's `toolGroups` (spec.md §4.4).
pub struct ToolDispatcher {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// The tool catalog a role would see on its next turn (spec.md §4.3
    /// step 3, and the `list_tools` supplement).
    pub fn catalog_for(&self, role: &Role) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .filter(|t| role.allows_tool_group(&t.group()))
            .map(|t| t.descriptor())
            .collect()
    }

    /// Dispatch one tool call. Resolution/authorization failures and
    /// execution errors both become an error [`ToolOutcome`] rather than
    /// propagating — the turn continues and the LLM sees the failure
    /// (spec.md §4.3 "Tool not found / disallowed by role").
    pub async fn dispatch(&self, name: &str, args: serde_json::Value, role: &Role, ctx: &AgentCtx) -> ToolOutcome {
        let Some(tool) = self.tools.get(name) else {
            return ToolError::NotFound(name.to_string()).into_outcome();
        };
        if !role.allows_tool_group(&tool.group()) {
            return ToolError::Disallowed { tool: name.to_string(), role: role.name.clone() }.into_outcome();
        }
        match tool.execute(args, ctx).await {
            Ok(outcome) => outcome,
            Err(err) => err.into_outcome(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn group(&self) -> ToolGroup {
            "messaging".to_string()
        }
        async fn execute(&self, args: serde_json::Value, _ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
            Ok(ToolOutcome::success(args.to_string()))
        }
    }

    fn role_with_groups(groups: Option<&[&str]>) -> Role {
        let mut role = Role::new("r", "p");
        role.tool_groups = groups.map(|g| g.iter().map(|s| s.to_string()).collect());
        role
    }

    #[test]
    fn catalog_filters_by_tool_groups() {
        let mut dispatcher = ToolDispatcher::new();
        dispatcher.register(Arc::new(Echo));
        assert_eq!(dispatcher.catalog_for(&role_with_groups(None)).len(), 1);
        assert_eq!(dispatcher.catalog_for(&role_with_groups(Some(&["messaging"]))).len(), 1);
        assert_eq!(dispatcher.catalog_for(&role_with_groups(Some(&["other"]))).len(), 0);
    }
}
