//! Message envelope, spec.md §3.4.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable, at-most-once-delivered message routed by the [`crate`]
/// bus implementation in `orgruntime`.
///
/// `payload` is intentionally free-form (`serde_json::Value`) — the core
/// does not interpret it beyond routing; agents and tools agree on its
/// shape (usually `{ text, message_type?, ... }`) out of band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub to: String,
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub payload: serde_json::Value,
    /// Unix-epoch milliseconds at which this envelope becomes visible to
    /// `receiveNext`. `None` means "deliver immediately".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deliver_at: Option<u64>,
}

impl Envelope {
    /// Construct a new envelope for immediate delivery.
    pub fn new(to: impl Into<String>, from: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            to: to.into(),
            from: from.into(),
            task_id: None,
            payload,
            deliver_at: None,
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_deliver_at(mut self, deliver_at_ms: u64) -> Self {
        self.deliver_at = Some(deliver_at_ms);
        self
    }

    /// Best-effort extraction of the conventional `{ text: "..." }` shape
    /// used throughout the ambient prompt-rendering code in §4.5.
    pub fn text(&self) -> Option<&str> {
        self.payload.get("text").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_envelope_has_no_deliver_at() {
        let env = Envelope::new("root", "user", serde_json::json!({"text": "hi"}));
        assert!(env.deliver_at.is_none());
        assert_eq!(env.text(), Some("hi"));
    }

    #[test]
    fn builder_methods_set_fields() {
        let env = Envelope::new("a", "b", serde_json::json!({}))
            .with_task_id("task-1")
            .with_deliver_at(1000);
        assert_eq!(env.task_id.as_deref(), Some("task-1"));
        assert_eq!(env.deliver_at, Some(1000));
    }
}
