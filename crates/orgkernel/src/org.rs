//! Role and Agent, spec.md §3.1–3.2.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// A named template from which agents are spawned (spec.md §3.1).
///
/// Roles are permanent once created — there is no delete in core
/// (spec.md §3.8 "Lifecycle"). `name` is a unique secondary key used by
/// `find_role_by_name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub role_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_service_id: Option<String>,
    /// `None` means "all tool groups allowed" (spec.md §3.1).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_groups: Option<HashSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Role {
    pub fn new(name: impl Into<String>, role_prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role_prompt: role_prompt.into(),
            llm_service_id: None,
            tool_groups: None,
            created_by: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Whether a tool declared as belonging to `group` is permitted for
    /// this role (spec.md §4.4 "Authorisation").
    pub fn allows_tool_group(&self, group: &str) -> bool {
        match &self.tool_groups {
            None => true,
            Some(groups) => groups.contains(group),
        }
    }
}

/// Lifecycle status of an [`Agent`] (spec.md §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Terminated,
}

/// A running instance of a [`Role`] (spec.md §3.2).
///
/// `parent_agent_id` of any non-root agent refers to an agent that
/// existed at creation time; the parent may later terminate, but the
/// child keeps the reference as history (spec.md §3.2 invariant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub role_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_agent_id: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub status: AgentStatus,
}

impl Agent {
    pub fn new(id: impl Into<String>, role_id: Uuid, parent_agent_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            role_id,
            parent_agent_id,
            created_at: chrono::Utc::now(),
            status: AgentStatus::Active,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_agent_id.is_none() && self.id == crate::ROOT_AGENT_ID
    }
}
