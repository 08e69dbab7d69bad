//! System-prompt composition and per-message formatting, spec.md §4.5.
//!
//! Grounded on the teacher's `mofa-foundation::agent::context::prompt::PromptContext`
//! (identity + bootstrap-file + memory sections assembled into one system
//! prompt) and `mofa-foundation::prompt::builder` (ordered section
//! composition), narrowed to the fixed section order spec.md §4.5 mandates:
//! base prompt, role prompt, runtime line, task brief, contact list, tool
//! rules. Rebuilt at index 0 on every turn so that task-brief, contact and
//! tool-catalog changes are reflected immediately (spec.md §4.3 step 3).

use orgkernel::{ContactRegistry, Role, TaskBrief, ROOT_AGENT_ID};

/// Composes the index-0 system entry and the per-message inbound
/// formatter (spec.md §4.5).
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    base_prompt: String,
    tool_rules_prompt: String,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            base_prompt: DEFAULT_BASE_PROMPT.to_string(),
            tool_rules_prompt: DEFAULT_TOOL_RULES_PROMPT.to_string(),
        }
    }
}

const DEFAULT_BASE_PROMPT: &str = "You are one agent in a multi-agent organization. \
Messages from other agents arrive as user turns; reply to them by calling send_message.";

const DEFAULT_TOOL_RULES_PROMPT: &str = "Use tools exactly as described by their schemas. \
Call compress_context before your history grows unmanageable. \
Only call terminate_agent on agents you directly spawned.";

impl ContextBuilder {
    pub fn new(base_prompt: impl Into<String>, tool_rules_prompt: impl Into<String>) -> Self {
        Self { base_prompt: base_prompt.into(), tool_rules_prompt: tool_rules_prompt.into() }
    }

    /// Build the system prompt for `agent_id` (spec.md §4.5 composition
    /// order). `root` only sees `<role prompt>` + `<runtime>` — no task
    /// brief, contacts, or tool rules section, since root's brief is
    /// implicit and its tool catalog is the same as any other agent's.
    pub fn build_system_prompt(
        &self,
        agent_id: &str,
        parent_agent_id: Option<&str>,
        role: &Role,
        task_brief: Option<&TaskBrief>,
        contacts: &ContactRegistry,
    ) -> String {
        if agent_id == ROOT_AGENT_ID {
            return format!(
                "{}\n\n{}",
                role.role_prompt,
                runtime_line(agent_id, parent_agent_id)
            );
        }

        let mut out = String::new();
        out.push_str(&self.base_prompt);
        out.push_str("\n\n");
        out.push_str(&role.role_prompt);
        out.push_str("\n\n");
        out.push_str(&runtime_line(agent_id, parent_agent_id));
        out.push('\n');
        if let Some(brief) = task_brief {
            out.push_str(&brief.render());
            out.push('\n');
        }
        if !contacts.is_empty() {
            out.push_str(&contacts.render());
            out.push('\n');
        }
        out.push_str(&self.tool_rules_prompt);
        out
    }

    /// Render an inbound message for appending as a `user` entry
    /// (spec.md §4.5 "per-message formatter"):
    /// - `user`-originating messages: `"【from user】 {content}"`, no reply suffix.
    /// - `root`: a minimal `from/to/taskId/payload` form.
    /// - everything else: `"【from {role}({id})】 {content} — reply with send_message(to='{from}', …)"`.
    pub fn format_inbound(
        &self,
        recipient_is_root: bool,
        from: &str,
        from_role_name: &str,
        to: &str,
        task_id: Option<&str>,
        content: &str,
        payload: &serde_json::Value,
    ) -> String {
        if recipient_is_root {
            return format!(
                "from={from}\nto={to}\ntaskId={}\npayload={payload}",
                task_id.unwrap_or("")
            );
        }
        if from == orgkernel::USER_AGENT_ID {
            return format!("【from user】 {content}");
        }
        format!(
            "【from {from_role_name}({from})】 {content} — reply with send_message(to='{from}', …)"
        )
    }
}

fn runtime_line(agent_id: &str, parent_agent_id: Option<&str>) -> String {
    format!(
        "【runtime】 agentId={}  parentAgentId={}",
        agent_id,
        parent_agent_id.unwrap_or("null")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brief() -> TaskBrief {
        TaskBrief {
            objective: "ship it".into(),
            constraints: vec![],
            inputs: serde_json::json!({}),
            outputs: serde_json::json!({}),
            completion_criteria: "done".into(),
            collaborators: vec![],
            references: vec![],
            priority: None,
        }
    }

    #[test]
    fn root_prompt_has_no_task_brief_or_tool_rules() {
        let builder = ContextBuilder::default();
        let role = Role::new("root", "you are root");
        let prompt = builder.build_system_prompt("root", None, &role, None, &ContactRegistry::new());
        assert!(prompt.contains("you are root"));
        assert!(prompt.contains("agentId=root"));
        assert!(!prompt.contains("Objective"));
        assert!(!prompt.contains(DEFAULT_TOOL_RULES_PROMPT));
    }

    #[test]
    fn non_root_prompt_includes_every_section() {
        let builder = ContextBuilder::default();
        let role = Role::new("worker", "you work");
        let mut contacts = ContactRegistry::new();
        contacts.add(orgkernel::Contact::new("root", "root", orgkernel::ContactSource::Parent));
        let prompt = builder.build_system_prompt(
            "a1",
            Some("root"),
            &role,
            Some(&brief()),
            &contacts,
        );
        assert!(prompt.contains("you work"));
        assert!(prompt.contains("Objective: ship it"));
        assert!(prompt.contains("- root（root）"));
        assert!(prompt.contains("compress_context"));
    }

    #[test]
    fn format_inbound_user_message_has_no_reply_suffix() {
        let builder = ContextBuilder::default();
        let rendered = builder.format_inbound(false, "user", "user", "root", None, "hi", &serde_json::json!({}));
        assert_eq!(rendered, "【from user】 hi");
    }

    #[test]
    fn format_inbound_agent_message_has_reply_suffix() {
        let builder = ContextBuilder::default();
        let rendered =
            builder.format_inbound(false, "a1", "planner", "a2", None, "status?", &serde_json::json!({}));
        assert!(rendered.starts_with("【from planner(a1)】 status?"));
        assert!(rendered.contains("reply with send_message(to='a1'"));
    }

    #[test]
    fn format_inbound_to_root_uses_minimal_form() {
        let builder = ContextBuilder::default();
        let payload = serde_json::json!({"text": "hi"});
        let rendered = builder.format_inbound(true, "user", "user", "root", Some("t1"), "hi", &payload);
        assert!(rendered.starts_with("from=user\nto=root\ntaskId=t1\npayload="));
    }
}
