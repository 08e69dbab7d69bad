//! Task brief, spec.md §3.7.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};

/// A preset collaborator named in a task brief, seeding the spawned
/// agent's contact registry (spec.md §3.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaborator {
    pub id: String,
    pub role: String,
}

/// Structured prologue passed to `spawn_agent`/`spawn_agent_with_task`
/// and rendered into the system prompt (spec.md §4.5).
///
/// The first five fields are required; [`TaskBrief::validate`] enforces
/// this at spawn time (spec.md §3.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBrief {
    pub objective: String,
    pub constraints: Vec<String>,
    pub inputs: serde_json::Value,
    pub outputs: serde_json::Value,
    pub completion_criteria: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collaborators: Vec<Collaborator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl TaskBrief {
    /// Validate the required fields (`objective`, `inputs`/`outputs`
    /// presence, `completion_criteria`). `constraints` may legitimately be
    /// empty, but the field itself must be present — serde already
    /// enforces that at deserialization; this re-checks string fields are
    /// non-blank for briefs constructed directly in Rust (e.g. tests, the
    /// `root` agent's bootstrap brief).
    pub fn validate(&self) -> CoreResult<()> {
        if self.objective.trim().is_empty() {
            return Err(CoreError::InvalidTaskBrief("objective must not be empty".into()));
        }
        if self.completion_criteria.trim().is_empty() {
            return Err(CoreError::InvalidTaskBrief(
                "completion_criteria must not be empty".into(),
            ));
        }
        if self.inputs.is_null() {
            return Err(CoreError::InvalidTaskBrief("inputs must be provided".into()));
        }
        if self.outputs.is_null() {
            return Err(CoreError::InvalidTaskBrief("outputs must be provided".into()));
        }
        Ok(())
    }

    /// Render the brief the way ContextBuilder embeds it into the system
    /// prompt (spec.md §4.5).
    pub fn render(&self) -> String {
        let mut out = format!("Objective: {}\n", self.objective);
        if !self.constraints.is_empty() {
            out.push_str("Constraints:\n");
            for c in &self.constraints {
                out.push_str(&format!("- {c}\n"));
            }
        }
        out.push_str(&format!("Inputs: {}\n", self.inputs));
        out.push_str(&format!("Outputs: {}\n", self.outputs));
        out.push_str(&format!("Completion criteria: {}\n", self.completion_criteria));
        if let Some(priority) = &self.priority {
            out.push_str(&format!("Priority: {priority}\n"));
        }
        if !self.references.is_empty() {
            out.push_str(&format!("References: {}\n", self.references.join(", ")));
        }
        out
    }
}
