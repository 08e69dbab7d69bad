//! Per-agent contact registry, spec.md §3.3.

use serde::{Deserialize, Serialize};

/// How a [`Contact`] entry came to exist in an agent's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    /// Seeded from the spawning parent (or `user`/`root` for the two
    /// distinguished agents).
    Parent,
    /// Seeded from the task brief's `collaborators` field.
    Preset,
    /// Added by the runtime itself (reserved for future system-level
    /// bookkeeping; unused by core spawn/send paths today).
    System,
    /// Added automatically the first time a new correspondent appears in
    /// an inbound message (spec.md §3.3 "Additional entries").
    Introduction,
}

/// One entry in an agent's contact registry. Informational only — it is
/// rendered into the system prompt (spec.md §4.5) but never gates sending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub role: String,
    pub source: ContactSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub introduced_by: Option<String>,
    pub added_at: chrono::DateTime<chrono::Utc>,
}

impl Contact {
    pub fn new(id: impl Into<String>, role: impl Into<String>, source: ContactSource) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            source,
            introduced_by: None,
            added_at: chrono::Utc::now(),
        }
    }

    pub fn introduced_by(mut self, introducer: impl Into<String>) -> Self {
        self.introduced_by = Some(introducer.into());
        self
    }

    /// Render this entry the way ContextBuilder does (spec.md §4.5):
    /// `"- {role}（{id}）"`.
    pub fn render(&self) -> String {
        format!("- {}（{}）", self.role, self.id)
    }
}

/// An agent's ordered, deduplicated-by-id contact list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactRegistry {
    entries: Vec<Contact>,
}

impl ContactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `contact` unless its `id` is already registered. Returns
    /// `true` if the entry was newly added.
    pub fn add(&mut self, contact: Contact) -> bool {
        if self.entries.iter().any(|c| c.id == contact.id) {
            return false;
        }
        self.entries.push(contact);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contact> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the full list the way ContextBuilder embeds it into the
    /// system prompt: one `"- {role}（{id}）"` line per contact.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(Contact::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_on_id() {
        let mut reg = ContactRegistry::new();
        assert!(reg.add(Contact::new("a1", "planner", ContactSource::Parent)));
        assert!(!reg.add(Contact::new("a1", "planner", ContactSource::Introduction)));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn render_matches_context_builder_format() {
        let mut reg = ContactRegistry::new();
        reg.add(Contact::new("a1", "planner", ContactSource::Parent));
        assert_eq!(reg.render(), "- planner（a1）");
    }
}
