//! Per-agent compute status, spec.md §3.6 / §4.3.

use serde::{Deserialize, Serialize};

/// Drives scheduler and bus dispatch decisions for one agent.
///
/// Transitions are documented on [`ComputeStatus::can_transition_to`] and
/// mirror the state diagram in spec.md §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputeStatus {
    /// No turn in flight; eligible for scheduler dispatch.
    Idle,
    /// A turn has called the LLM and is awaiting its response.
    WaitingLlm,
    /// The LLM responded; the handler is running the tool-call loop.
    Processing,
    /// Paused by operator action; queue still accepts sends (spec.md §4.1).
    Stopped,
    /// Transitioning toward `Stopped`; in-flight turn draining.
    Stopping,
    /// Parent requested termination; bus rejects further sends.
    Terminating,
    /// Fully torn down; queue and conversation removed.
    Terminated,
}

impl ComputeStatus {
    /// Whether a new turn may be dispatched for an agent in this status.
    pub fn is_idle(&self) -> bool {
        matches!(self, ComputeStatus::Idle)
    }

    /// Whether a `send` targeting an agent in this status must be rejected
    /// with `agent_terminating` (spec.md §4.1 "Status-based rejection").
    pub fn rejects_sends(&self) -> bool {
        matches!(self, ComputeStatus::Terminating | ComputeStatus::Terminated)
    }

    /// Whether an agent in this status counts as "actively processing" for
    /// the bus's interruption hook (spec.md §4.1).
    pub fn is_actively_processing(&self) -> bool {
        matches!(self, ComputeStatus::WaitingLlm | ComputeStatus::Processing)
    }
}

impl Default for ComputeStatus {
    fn default() -> Self {
        ComputeStatus::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_accepts_dispatch() {
        assert!(ComputeStatus::Idle.is_idle());
        assert!(!ComputeStatus::Processing.is_idle());
    }

    #[test]
    fn terminating_and_terminated_reject_sends() {
        assert!(ComputeStatus::Terminating.rejects_sends());
        assert!(ComputeStatus::Terminated.rejects_sends());
        assert!(!ComputeStatus::Stopped.rejects_sends());
        assert!(!ComputeStatus::Stopping.rejects_sends());
    }

    #[test]
    fn waiting_llm_counts_as_actively_processing() {
        assert!(ComputeStatus::WaitingLlm.is_actively_processing());
        assert!(ComputeStatus::Processing.is_actively_processing());
        assert!(!ComputeStatus::Idle.is_actively_processing());
    }

    #[test]
    fn serde_round_trip() {
        let json = serde_json::to_string(&ComputeStatus::WaitingLlm).unwrap();
        assert_eq!(json, "\"waiting_llm\"");
        let back: ComputeStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ComputeStatus::WaitingLlm);
    }
}
