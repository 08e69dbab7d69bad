//! Built-in tools, spec.md §4.4 "Built-in tools (minimum set the core
//! must provide)".
//!
//! `run_command`, `http_request` and `run_javascript` are thin stubs: the
//! dispatch/authorization/round-budget machinery runs uniformly over
//! them, but their bodies return `tool_not_implemented` rather than
//! faking a real SSH/browser/JS sandbox, which spec.md §1 puts out of
//! scope. `read_file`/`write_file`/`list_files` do the real thing,
//! scoped under `runtimeDir` (spec.md §4.4).

use super::{AgentCtx, Tool};
use crate::bus::SendRequest;
use async_trait::async_trait;
use orgkernel::{Collaborator, CoreError, TaskBrief, ToolError, ToolGroup, ToolOutcome};
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn missing(field: &str) -> ToolError {
    ToolError::MissingParameter(field.to_string())
}

fn bad_args(err: impl std::fmt::Display) -> ToolError {
    ToolError::InvalidArguments(err.to_string())
}

// ---- find_role_by_name / create_role ---------------------------------------

pub struct FindRoleByNameTool;

#[async_trait]
impl Tool for FindRoleByNameTool {
    fn name(&self) -> &str {
        "find_role_by_name"
    }
    fn description(&self) -> &str {
        "Look up a role by its unique name."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"]
        })
    }
    fn group(&self) -> ToolGroup {
        "org".to_string()
    }
    async fn execute(&self, args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let name = args.get("name").and_then(|v| v.as_str()).ok_or_else(|| missing("name"))?;
        let role = ctx.org.find_role_by_name(name);
        Ok(ToolOutcome::success(serde_json::to_string(&role).unwrap_or_else(|_| "null".into())))
    }
}

#[derive(Deserialize)]
struct CreateRoleArgs {
    name: String,
    #[serde(rename = "rolePrompt")]
    role_prompt: String,
    #[serde(rename = "llmServiceId", default)]
    llm_service_id: Option<String>,
    #[serde(rename = "toolGroups", default)]
    tool_groups: Option<std::collections::HashSet<String>>,
}

pub struct CreateRoleTool;

#[async_trait]
impl Tool for CreateRoleTool {
    fn name(&self) -> &str {
        "create_role"
    }
    fn description(&self) -> &str {
        "Create a new role (idempotent on name)."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "rolePrompt": { "type": "string" },
                "llmServiceId": { "type": "string" },
                "toolGroups": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["name", "rolePrompt"]
        })
    }
    fn group(&self) -> ToolGroup {
        "org".to_string()
    }
    async fn execute(&self, args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let args: CreateRoleArgs = serde_json::from_value(args).map_err(bad_args)?;
        let role = ctx.org.create_role(
            &args.name,
            &args.role_prompt,
            args.llm_service_id,
            args.tool_groups,
            Some(ctx.agent_id.clone()),
        );
        Ok(ToolOutcome::success(serde_json::to_string(&role).map_err(bad_args)?))
    }
}

// ---- spawn_agent / spawn_agent_with_task -----------------------------------

#[derive(Deserialize)]
struct SpawnAgentArgs {
    #[serde(rename = "roleId")]
    role_id: uuid::Uuid,
    #[serde(rename = "taskBrief")]
    task_brief: TaskBrief,
}

fn do_spawn(ctx: &AgentCtx, role_id: uuid::Uuid, brief: &TaskBrief) -> Result<orgkernel::Agent, ToolError> {
    brief.validate().map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
    let agent = ctx.org.spawn_agent(role_id, &ctx.agent_id).map_err(|e| match e {
        CoreError::RoleNotFound(id) => ToolError::InvalidArguments(format!("role not found: {id}")),
        CoreError::InvalidParent(id) => ToolError::InvalidArguments(format!("invalid parent: {id}")),
        other => ToolError::Execution(other.to_string()),
    })?;
    let parent_role_name = ctx.org.role_name_of(&ctx.agent_id);
    let collaborators: Vec<Collaborator> = brief.collaborators.clone();
    ctx.org.seed_contacts(&agent.id, &ctx.agent_id, &parent_role_name, &collaborators);
    ctx.org.set_task_brief(&agent.id, brief.clone());
    Ok(agent)
}

pub struct SpawnAgentTool;

#[async_trait]
impl Tool for SpawnAgentTool {
    fn name(&self) -> &str {
        "spawn_agent"
    }
    fn description(&self) -> &str {
        "Spawn a new agent instance of a role with a task brief."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "roleId": { "type": "string" },
                "taskBrief": { "type": "object" }
            },
            "required": ["roleId", "taskBrief"]
        })
    }
    fn group(&self) -> ToolGroup {
        "org".to_string()
    }
    async fn execute(&self, args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let args: SpawnAgentArgs = serde_json::from_value(args).map_err(bad_args)?;
        let agent = do_spawn(ctx, args.role_id, &args.task_brief)?;
        let role_name = ctx.org.role_name_of(&agent.id);
        Ok(ToolOutcome::success(
            serde_json::json!({ "id": agent.id, "roleId": agent.role_id, "roleName": role_name }).to_string(),
        ))
    }
}

#[derive(Deserialize)]
struct SpawnAgentWithTaskArgs {
    #[serde(rename = "roleId")]
    role_id: uuid::Uuid,
    #[serde(rename = "taskBrief")]
    task_brief: TaskBrief,
    #[serde(rename = "initialMessage")]
    initial_message: serde_json::Value,
}

pub struct SpawnAgentWithTaskTool;

#[async_trait]
impl Tool for SpawnAgentWithTaskTool {
    fn name(&self) -> &str {
        "spawn_agent_with_task"
    }
    fn description(&self) -> &str {
        "Spawn a new agent and atomically send it its first message."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "roleId": { "type": "string" },
                "taskBrief": { "type": "object" },
                "initialMessage": { "type": "object" }
            },
            "required": ["roleId", "taskBrief", "initialMessage"]
        })
    }
    fn group(&self) -> ToolGroup {
        "org".to_string()
    }
    async fn execute(&self, args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let args: SpawnAgentWithTaskArgs = serde_json::from_value(args).map_err(bad_args)?;
        let agent = do_spawn(ctx, args.role_id, &args.task_brief)?;
        let role_name = ctx.org.role_name_of(&agent.id);
        let send_req = SendRequest::new(agent.id.clone(), ctx.agent_id.clone(), args.initial_message);
        let outcome = ctx
            .bus
            .send(send_req)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;
        Ok(ToolOutcome::success(
            serde_json::json!({
                "id": agent.id,
                "roleId": agent.role_id,
                "roleName": role_name,
                "messageId": outcome.message_id,
            })
            .to_string(),
        ))
    }
}

// ---- terminate_agent --------------------------------------------------------

#[derive(Deserialize)]
struct TerminateAgentArgs {
    #[serde(rename = "agentId")]
    agent_id: String,
    reason: Option<String>,
}

pub struct TerminateAgentTool;

#[async_trait]
impl Tool for TerminateAgentTool {
    fn name(&self) -> &str {
        "terminate_agent"
    }
    fn description(&self) -> &str {
        "Terminate a child agent. Only the parent may call this."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "agentId": { "type": "string" }, "reason": { "type": "string" } },
            "required": ["agentId"]
        })
    }
    fn group(&self) -> ToolGroup {
        "org".to_string()
    }
    async fn execute(&self, args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let args: TerminateAgentArgs = serde_json::from_value(args).map_err(bad_args)?;
        ctx.org.begin_termination(&ctx.agent_id, &args.agent_id).map_err(|e| match e {
            CoreError::AgentNotFound(id) => ToolError::InvalidArguments(format!("agent_not_found: {id}")),
            CoreError::NotChildAgent { .. } => ToolError::Execution("not_child_agent".to_string()),
            other => ToolError::Execution(other.to_string()),
        })?;
        ctx.bus.drop_recipient(&args.agent_id);
        ctx.conversations.drop_agent(&args.agent_id).map_err(|e| ToolError::Execution(e.to_string()))?;
        ctx.org.clear_task_brief(&args.agent_id);
        ctx.org.finish_termination(&args.agent_id, args.reason);
        Ok(ToolOutcome::success(
            serde_json::json!({ "ok": true, "terminatedAgentId": args.agent_id }).to_string(),
        ))
    }
}

// ---- send_message -----------------------------------------------------------

#[derive(Deserialize)]
struct SendMessageArgs {
    to: String,
    payload: serde_json::Value,
    #[serde(rename = "delayMs", default)]
    delay_ms: Option<i64>,
}

pub struct SendMessageTool;

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }
    fn description(&self) -> &str {
        "Send a message to another agent, optionally delayed."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "to": { "type": "string" },
                "payload": { "type": "object" },
                "delayMs": { "type": "integer" }
            },
            "required": ["to", "payload"]
        })
    }
    fn group(&self) -> ToolGroup {
        "messaging".to_string()
    }
    async fn execute(&self, args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let args: SendMessageArgs = serde_json::from_value(args).map_err(bad_args)?;
        let mut req = SendRequest::new(args.to, ctx.agent_id.clone(), args.payload);
        if let Some(task_id) = &ctx.task_id {
            req = req.with_task_id(task_id.clone());
        }
        if let Some(delay) = args.delay_ms {
            req = req.with_delay_ms(delay);
        }
        let outcome = ctx.bus.send(req).await.map_err(|e| ToolError::Execution(e.to_string()))?;
        Ok(ToolOutcome::success(
            serde_json::json!({
                "messageId": outcome.message_id,
                "scheduledDeliveryTime": outcome.scheduled_delivery_time,
            })
            .to_string(),
        ))
    }
}

// ---- put_artifact / get_artifact --------------------------------------------

#[derive(Deserialize)]
struct PutArtifactArgs {
    #[serde(rename = "type")]
    artifact_type: String,
    content: String,
    meta: Option<serde_json::Value>,
}

pub struct PutArtifactTool;

#[async_trait]
impl Tool for PutArtifactTool {
    fn name(&self) -> &str {
        "put_artifact"
    }
    fn description(&self) -> &str {
        "Store a blob in the external artifact store, returning an artifact:<uuid> reference."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "type": { "type": "string" }, "content": { "type": "string" }, "meta": { "type": "object" } },
            "required": ["type", "content"]
        })
    }
    fn group(&self) -> ToolGroup {
        "artifact".to_string()
    }
    async fn execute(&self, args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let args: PutArtifactArgs = serde_json::from_value(args).map_err(bad_args)?;
        let reference = ctx
            .artifacts
            .put_artifact(&args.artifact_type, &args.content, args.meta)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;
        Ok(ToolOutcome::success(reference))
    }
}

pub struct GetArtifactTool;

#[async_trait]
impl Tool for GetArtifactTool {
    fn name(&self) -> &str {
        "get_artifact"
    }
    fn description(&self) -> &str {
        "Resolve an artifact:<uuid> reference from the external artifact store."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "reference": { "type": "string" } },
            "required": ["reference"]
        })
    }
    fn group(&self) -> ToolGroup {
        "artifact".to_string()
    }
    async fn execute(&self, args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let reference = args.get("reference").and_then(|v| v.as_str()).ok_or_else(|| missing("reference"))?;
        let artifact = ctx.artifacts.get_artifact(reference).await.map_err(|e| ToolError::Execution(e.to_string()))?;
        Ok(ToolOutcome::success(serde_json::to_string(&artifact).map_err(bad_args)?))
    }
}

// ---- compress_context / get_context_status ----------------------------------

#[derive(Deserialize)]
struct CompressContextArgs {
    summary: String,
    #[serde(rename = "keepRecentCount", default)]
    keep_recent_count: Option<usize>,
}

pub struct CompressContextTool;

#[async_trait]
impl Tool for CompressContextTool {
    fn name(&self) -> &str {
        "compress_context"
    }
    fn description(&self) -> &str {
        "Compress this agent's conversation history to a summary plus the most recent entries."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "summary": { "type": "string" }, "keepRecentCount": { "type": "integer" } },
            "required": ["summary"]
        })
    }
    fn group(&self) -> ToolGroup {
        "context".to_string()
    }
    async fn execute(&self, args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let args: CompressContextArgs = serde_json::from_value(args).map_err(bad_args)?;
        let keep = args.keep_recent_count.unwrap_or(10);
        let outcome = ctx.conversations.compress(&ctx.agent_id, &args.summary, keep);
        Ok(ToolOutcome::success(
            serde_json::json!({
                "ok": outcome.ok,
                "compressed": outcome.compressed,
                "originalCount": outcome.original_count,
                "newCount": outcome.new_count,
            })
            .to_string(),
        ))
    }
}

pub struct GetContextStatusTool;

#[async_trait]
impl Tool for GetContextStatusTool {
    fn name(&self) -> &str {
        "get_context_status"
    }
    fn description(&self) -> &str {
        "Report this agent's current token usage against its context window."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn group(&self) -> ToolGroup {
        "context".to_string()
    }
    async fn execute(&self, _args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let report = ctx.conversations.get_context_status(&ctx.agent_id);
        Ok(ToolOutcome::success(
            serde_json::json!({
                "usedTokens": report.used_tokens,
                "maxTokens": report.max_tokens,
                "usagePercent": report.usage_percent,
                "status": report.status,
            })
            .to_string(),
        ))
    }
}

// ---- list_tools (supplement) -------------------------------------------------

pub struct ListToolsTool;

#[async_trait]
impl Tool for ListToolsTool {
    fn name(&self) -> &str {
        "list_tools"
    }
    fn description(&self) -> &str {
        "List the tool catalog this agent's role is permitted to call."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn group(&self) -> ToolGroup {
        "introspection".to_string()
    }
    async fn execute(&self, _args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let Some(agent) = ctx.org.get_agent(&ctx.agent_id) else {
            return Err(ToolError::Execution("calling agent no longer exists".to_string()));
        };
        let Some(role) = ctx.org.get_role(agent.role_id) else {
            return Err(ToolError::Execution("calling agent's role no longer exists".to_string()));
        };
        let catalog = ctx.tool_dispatcher.catalog_for(&role);
        Ok(ToolOutcome::success(serde_json::to_string(&catalog).map_err(bad_args)?))
    }
}

// ---- external-collaborator stubs --------------------------------------------

/// Resolves `relative` under `root`, rejecting any path that escapes it
/// (`..` components or absolute paths).
fn scoped_path(root: &Path, relative: &str) -> Result<PathBuf, ToolError> {
    let candidate = Path::new(relative);
    if candidate.is_absolute() || candidate.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(ToolError::InvalidArguments(format!("path escapes runtime directory: {relative}")));
    }
    Ok(root.join(candidate))
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }
    fn description(&self) -> &str {
        "Read a text file relative to the runtime directory."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": { "path": { "type": "string" } }, "required": ["path"] })
    }
    fn group(&self) -> ToolGroup {
        "system".to_string()
    }
    async fn execute(&self, args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let path = args.get("path").and_then(|v| v.as_str()).ok_or_else(|| missing("path"))?;
        let full = scoped_path(&ctx.runtime_dir, path)?;
        let content = tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| ToolError::Execution(format!("read {path}: {e}")))?;
        Ok(ToolOutcome::success(content))
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }
    fn description(&self) -> &str {
        "Write a text file relative to the runtime directory."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "path": { "type": "string" }, "content": { "type": "string" } },
            "required": ["path", "content"]
        })
    }
    fn group(&self) -> ToolGroup {
        "system".to_string()
    }
    async fn execute(&self, args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let path = args.get("path").and_then(|v| v.as_str()).ok_or_else(|| missing("path"))?;
        let content = args.get("content").and_then(|v| v.as_str()).ok_or_else(|| missing("content"))?;
        let full = scoped_path(&ctx.runtime_dir, path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| ToolError::Execution(e.to_string()))?;
        }
        tokio::fs::write(&full, content).await.map_err(|e| ToolError::Execution(format!("write {path}: {e}")))?;
        Ok(ToolOutcome::success("ok"))
    }
}

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }
    fn description(&self) -> &str {
        "List entries of a directory relative to the runtime directory."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": { "path": { "type": "string" } } })
    }
    fn group(&self) -> ToolGroup {
        "system".to_string()
    }
    async fn execute(&self, args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let full = scoped_path(&ctx.runtime_dir, path)?;
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&full).await.map_err(|e| ToolError::Execution(format!("list {path}: {e}")))?;
        while let Some(entry) = dir.next_entry().await.map_err(|e| ToolError::Execution(e.to_string()))? {
            entries.push(entry.file_name().to_string_lossy().to_string());
        }
        Ok(ToolOutcome::success(serde_json::to_string(&entries).map_err(bad_args)?))
    }
}

macro_rules! not_implemented_tool {
    ($struct_name:ident, $tool_name:literal, $description:literal) => {
        pub struct $struct_name;

        #[async_trait]
        impl Tool for $struct_name {
            fn name(&self) -> &str {
                $tool_name
            }
            fn description(&self) -> &str {
                $description
            }
            fn parameters_schema(&self) -> serde_json::Value {
                serde_json::json!({ "type": "object" })
            }
            fn group(&self) -> ToolGroup {
                "system".to_string()
            }
            async fn execute(&self, _args: serde_json::Value, _ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
                Err(ToolError::NotImplemented($tool_name.to_string()))
            }
        }
    };
}

not_implemented_tool!(RunCommandTool, "run_command", "Run a shell command (external collaborator, not wired in core).");
not_implemented_tool!(HttpRequestTool, "http_request", "Perform an HTTP request (external collaborator, not wired in core).");
not_implemented_tool!(RunJavascriptTool, "run_javascript", "Execute a JavaScript snippet (external collaborator, not wired in core).");

pub struct ConsolePrintTool;

#[async_trait]
impl Tool for ConsolePrintTool {
    fn name(&self) -> &str {
        "console_print"
    }
    fn description(&self) -> &str {
        "Print a line to the runtime's log output."
    }
    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": { "text": { "type": "string" } }, "required": ["text"] })
    }
    fn group(&self) -> ToolGroup {
        "system".to_string()
    }
    async fn execute(&self, args: serde_json::Value, ctx: &AgentCtx) -> Result<ToolOutcome, ToolError> {
        let text = args.get("text").and_then(|v| v.as_str()).ok_or_else(|| missing("text"))?;
        tracing::info!(agent_id = %ctx.agent_id, %text, "console_print");
        Ok(ToolOutcome::success("ok"))
    }
}

/// Register every built-in tool (spec.md §4.4 "minimum set") onto `dispatcher`.
pub fn register_all(dispatcher: &mut super::ToolDispatcher) {
    dispatcher.register(std::sync::Arc::new(FindRoleByNameTool));
    dispatcher.register(std::sync::Arc::new(CreateRoleTool));
    dispatcher.register(std::sync::Arc::new(SpawnAgentTool));
    dispatcher.register(std::sync::Arc::new(SpawnAgentWithTaskTool));
    dispatcher.register(std::sync::Arc::new(TerminateAgentTool));
    dispatcher.register(std::sync::Arc::new(SendMessageTool));
    dispatcher.register(std::sync::Arc::new(PutArtifactTool));
    dispatcher.register(std::sync::Arc::new(GetArtifactTool));
    dispatcher.register(std::sync::Arc::new(CompressContextTool));
    dispatcher.register(std::sync::Arc::new(GetContextStatusTool));
    dispatcher.register(std::sync::Arc::new(ListToolsTool));
    dispatcher.register(std::sync::Arc::new(ReadFileTool));
    dispatcher.register(std::sync::Arc::new(WriteFileTool));
    dispatcher.register(std::sync::Arc::new(ListFilesTool));
    dispatcher.register(std::sync::Arc::new(RunCommandTool));
    dispatcher.register(std::sync::Arc::new(HttpRequestTool));
    dispatcher.register(std::sync::Arc::new(RunJavascriptTool));
    dispatcher.register(std::sync::Arc::new(ConsolePrintTool));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation_manager::ConversationManager;
    use crate::persistence::PersistenceLayout;
    use orgkernel::{Artifact, CoreResult};
    use std::sync::Arc;

    struct NullArtifacts;
    #[async_trait]
    impl ArtifactStore for NullArtifacts {
        async fn put_artifact(&self, _t: &str, _c: &str, _m: Option<serde_json::Value>) -> CoreResult<String> {
            Ok("artifact:test".to_string())
        }
        async fn get_artifact(&self, _r: &str) -> CoreResult<Option<Artifact>> {
            Ok(None)
        }
    }

    fn ctx(dir: &std::path::Path, agent_id: &str) -> (AgentCtx, Arc<crate::org::OrgPrimitives>) {
        let layout = PersistenceLayout::new(dir);
        let org = Arc::new(crate::org::OrgPrimitives::new(layout.clone()));
        org.bootstrap(orgkernel::Role::new("root", "root prompt")).unwrap();
        let conversations = Arc::new(ConversationManager::new(
            layout,
            orgkernel::ContextLimitConfig::default(),
            std::time::Duration::from_millis(500),
        ));
        let bus = crate::bus::MessageBus::new(Arc::new(orgkernel::SystemClock));
        bus.set_status_lookup(org.clone());
        let mut dispatcher = super::super::ToolDispatcher::new();
        register_all(&mut dispatcher);
        let dispatcher = Arc::new(dispatcher);
        (
            AgentCtx {
                agent_id: agent_id.to_string(),
                task_id: None,
                org: org.clone(),
                bus,
                conversations,
                artifacts: Arc::new(NullArtifacts),
                tool_dispatcher: dispatcher,
                runtime_dir: dir.to_path_buf(),
            },
            org,
        )
    }

    fn brief_json() -> serde_json::Value {
        serde_json::json!({
            "objective": "do it",
            "constraints": [],
            "inputs": {},
            "outputs": {},
            "completion_criteria": "done",
        })
    }

    #[tokio::test]
    async fn spawn_then_terminate_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, org) = ctx(dir.path(), orgkernel::ROOT_AGENT_ID);
        let role = org.create_role("worker", "work", None, None, None);

        let spawn_args = serde_json::json!({ "roleId": role.id, "taskBrief": brief_json() });
        let outcome = SpawnAgentTool.execute(spawn_args, &ctx).await.unwrap();
        assert!(!outcome.is_error);
        let spawned: serde_json::Value = serde_json::from_str(&outcome.content.as_text()).unwrap();
        let child_id = spawned["id"].as_str().unwrap().to_string();
        assert_eq!(org.get_task_brief(&child_id).unwrap().objective, "do it");

        let terminate_args = serde_json::json!({ "agentId": child_id });
        let outcome = TerminateAgentTool.execute(terminate_args, &ctx).await.unwrap();
        assert!(!outcome.is_error);
        assert!(org.get_task_brief(&child_id).is_none());
    }

    #[tokio::test]
    async fn terminate_by_non_parent_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, org) = ctx(dir.path(), orgkernel::ROOT_AGENT_ID);
        let role = org.create_role("worker", "work", None, None, None);
        let spawn_args = serde_json::json!({ "roleId": role.id, "taskBrief": brief_json() });
        let outcome = SpawnAgentTool.execute(spawn_args, &ctx).await.unwrap();
        let spawned: serde_json::Value = serde_json::from_str(&outcome.content.as_text()).unwrap();
        let child_id = spawned["id"].as_str().unwrap().to_string();

        let (impostor_ctx, _) = ctx_as(dir.path(), &child_id);
        let result = TerminateAgentTool.execute(serde_json::json!({ "agentId": child_id }), &impostor_ctx).await;
        assert!(result.is_err());
    }

    fn ctx_as(dir: &std::path::Path, agent_id: &str) -> (AgentCtx, Arc<crate::org::OrgPrimitives>) {
        ctx(dir, agent_id)
    }

    #[tokio::test]
    async fn read_write_file_round_trip_scoped_to_runtime_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _org) = ctx(dir.path(), orgkernel::ROOT_AGENT_ID);
        WriteFileTool
            .execute(serde_json::json!({ "path": "notes.txt", "content": "hello" }), &ctx)
            .await
            .unwrap();
        let read = ReadFileTool.execute(serde_json::json!({ "path": "notes.txt" }), &ctx).await.unwrap();
        assert_eq!(read.content.as_text(), "hello");
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _org) = ctx(dir.path(), orgkernel::ROOT_AGENT_ID);
        let result = ReadFileTool.execute(serde_json::json!({ "path": "../escape.txt" }), &ctx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn run_command_is_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _org) = ctx(dir.path(), orgkernel::ROOT_AGENT_ID);
        let result = RunCommandTool.execute(serde_json::json!({}), &ctx).await;
        assert!(matches!(result, Err(ToolError::NotImplemented(_))));
    }
}
