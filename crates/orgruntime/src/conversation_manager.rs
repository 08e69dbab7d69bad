//! Per-agent conversation storage, compression and debounced persistence,
//! spec.md §4.6.
//!
//! Generalized from the teacher's
//! `mofa-foundation::agent::components::context_compressor::SlidingWindowCompressor`
//! (keep-last-N-plus-summary shape) combined with the persistence-trait
//! debounce pattern in `mofa-foundation::persistence`.

use crate::persistence::{ConversationRecord, PersistenceLayout};
use orgkernel::{
    ComputeStatus, ContextLimitConfig, ContextStatus, ConversationEntry, CoreError, CoreResult,
    TokenUsage,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of [`ConversationManager::compress`], spec.md §4.4 `compress_context`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressOutcome {
    pub ok: bool,
    pub compressed: bool,
    pub original_count: usize,
    pub new_count: usize,
}

/// Outcome of [`ConversationManager::verify_history_consistency`], spec.md §4.6.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConsistencyReport {
    pub consistent: bool,
    pub orphaned_responses: Vec<String>,
}

/// `{ usedTokens, maxTokens, usagePercent, status }`, spec.md §4.4 `get_context_status`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextReport {
    pub used_tokens: u32,
    pub max_tokens: u32,
    pub usage_percent: f32,
    pub status: ContextStatus,
}

struct AgentConversation {
    entries: Vec<ConversationEntry>,
    token_usage: TokenUsage,
    dirty: bool,
}

/// Owns every agent's conversation and token counters (spec.md §3.8
/// "Ownership"). Referenced, not owned, by the Scheduler and LlmHandler.
pub struct ConversationManager {
    layout: PersistenceLayout,
    limits: ContextLimitConfig,
    debounce: Duration,
    conversations: Mutex<HashMap<String, AgentConversation>>,
}

impl ConversationManager {
    pub fn new(layout: PersistenceLayout, limits: ContextLimitConfig, debounce: Duration) -> Self {
        Self {
            layout,
            limits,
            debounce,
            conversations: Mutex::new(HashMap::new()),
        }
    }

    /// Load every conversation file found on disk for the given agent IDs,
    /// sweeping inconsistent history (spec.md §4.6 "Consistency enforcement
    /// on load"). Agents with no file on disk are left absent; `ensure`
    /// creates them lazily on first use.
    pub fn load(&self, agent_ids: &[String]) -> CoreResult<()> {
        let mut conversations = self.conversations.lock();
        for agent_id in agent_ids {
            if let Some(record) = self.layout.load_conversation(agent_id)? {
                let mut entries = record.messages;
                sweep_orphans(&mut entries);
                conversations.insert(
                    agent_id.clone(),
                    AgentConversation { entries, token_usage: record.token_usage, dirty: false },
                );
            }
        }
        Ok(())
    }

    /// `ensure(agentId, systemPrompt)`, spec.md §4.6: creates
    /// `[{system, systemPrompt}]` if absent, otherwise rewrites index 0 in
    /// place (invariant I1; the system entry is rebuilt every turn per
    /// spec.md §4.5).
    pub fn ensure(&self, agent_id: &str, system_prompt: &str) {
        let mut conversations = self.conversations.lock();
        let convo = conversations.entry(agent_id.to_string()).or_insert_with(|| AgentConversation {
            entries: Vec::new(),
            token_usage: TokenUsage::default(),
            dirty: false,
        });
        if convo.entries.is_empty() {
            convo.entries.push(ConversationEntry::system(system_prompt));
        } else {
            convo.entries[0] = ConversationEntry::system(system_prompt);
        }
        convo.dirty = true;
    }

    pub fn append(&self, agent_id: &str, entry: ConversationEntry) {
        let mut conversations = self.conversations.lock();
        if let Some(convo) = conversations.get_mut(agent_id) {
            convo.entries.push(entry);
            convo.dirty = true;
        }
    }

    pub fn entries(&self, agent_id: &str) -> Vec<ConversationEntry> {
        self.conversations.lock().get(agent_id).map(|c| c.entries.clone()).unwrap_or_default()
    }

    /// Remove the last entry if it is an unresolved `assistant.tool_calls`
    /// (and any partial `tool` responses), spec.md §4.3 step 2
    /// "Interruption merge" (invariant I3).
    pub fn strip_unresolved_tail(&self, agent_id: &str) {
        let mut conversations = self.conversations.lock();
        if let Some(convo) = conversations.get_mut(agent_id) {
            if strip_unresolved_tail_entries(&mut convo.entries) {
                convo.dirty = true;
            }
        }
    }

    pub fn update_token_usage(&self, agent_id: &str, usage: TokenUsage) {
        let mut conversations = self.conversations.lock();
        if let Some(convo) = conversations.get_mut(agent_id) {
            convo.token_usage = usage;
            convo.dirty = true;
        } else {
            tracing::warn!(agent_id, "update_token_usage for unknown agent, no-op");
        }
    }

    /// `getContextStatus`, spec.md §4.6. Tracked against `promptTokens`,
    /// the size of what gets sent back to the model on the next turn
    /// (spec.md §4.3 scenario 6), not the prior turn's `totalTokens`
    /// (which also counts its own completion). Callers with no usage yet
    /// see `normal`.
    pub fn get_context_status(&self, agent_id: &str) -> ContextReport {
        let conversations = self.conversations.lock();
        let used = conversations.get(agent_id).map(|c| c.token_usage.prompt_tokens).unwrap_or(0);
        let max = self.limits.max_tokens;
        let percent = if max == 0 { 0.0 } else { used as f32 / max as f32 };
        ContextReport {
            used_tokens: used,
            max_tokens: max,
            usage_percent: percent,
            status: self.limits.status_for(used),
        }
    }

    /// `compress(agentId, summary, keepRecentCount)`, spec.md §4.4/§4.6,
    /// Property 13. No-op when `length <= keepRecentCount + 1` (nothing
    /// useful to drop between the system entry and the kept tail).
    pub fn compress(&self, agent_id: &str, summary: &str, keep_recent_count: usize) -> CompressOutcome {
        let mut conversations = self.conversations.lock();
        let Some(convo) = conversations.get_mut(agent_id) else {
            return CompressOutcome { ok: false, compressed: false, original_count: 0, new_count: 0 };
        };
        let original_count = convo.entries.len();
        if original_count <= keep_recent_count + 1 {
            return CompressOutcome { ok: true, compressed: false, original_count, new_count: original_count };
        }

        let system_entry = convo.entries[0].clone();
        let kept_tail: Vec<ConversationEntry> =
            convo.entries[original_count - keep_recent_count..].to_vec();
        let summary_entry = ConversationEntry::system(format!("[history summary] {summary}"));

        let mut rebuilt = Vec::with_capacity(2 + kept_tail.len());
        rebuilt.push(system_entry);
        rebuilt.push(summary_entry);
        rebuilt.extend(kept_tail);
        sweep_orphans(&mut rebuilt);

        let new_count = rebuilt.len();
        convo.entries = rebuilt;
        convo.dirty = true;
        CompressOutcome { ok: true, compressed: true, original_count, new_count }
    }

    /// `verifyHistoryConsistency`, spec.md §4.6, invariants I1-I3.
    pub fn verify_history_consistency(&self, agent_id: &str) -> ConsistencyReport {
        let conversations = self.conversations.lock();
        let Some(convo) = conversations.get(agent_id) else {
            return ConsistencyReport { consistent: true, orphaned_responses: Vec::new() };
        };
        let orphaned = find_orphaned_responses(&convo.entries);
        ConsistencyReport { consistent: orphaned.is_empty(), orphaned_responses: orphaned }
    }

    /// Removes a pending `assistant.tool_calls[*]` entry matching
    /// `tool_call_id` along with any `tool` entry responding to it
    /// (spec.md §4.6 cancellation support). If the parent assistant entry
    /// has no other tool_calls and no text content after removal, the
    /// entry itself is removed.
    pub fn remove_tool_call_entry(&self, agent_id: &str, tool_call_id: &str) {
        let mut conversations = self.conversations.lock();
        if let Some(convo) = conversations.get_mut(agent_id) {
            remove_tool_call(&mut convo.entries, tool_call_id);
            convo.dirty = true;
        }
    }

    pub fn remove_tool_response_entry(&self, agent_id: &str, tool_call_id: &str) {
        let mut conversations = self.conversations.lock();
        if let Some(convo) = conversations.get_mut(agent_id) {
            convo.entries.retain(|e| match e {
                ConversationEntry::Tool { tool_call_id: id, .. } => id != tool_call_id,
                _ => true,
            });
            convo.dirty = true;
        }
    }

    pub fn drop_agent(&self, agent_id: &str) -> CoreResult<()> {
        self.conversations.lock().remove(agent_id);
        self.layout.delete_conversation(agent_id)
    }

    /// Debounced write: marks the agent dirty and schedules a flush
    /// `debounce` in the future; repeated calls coalesce (spec.md §4.4
    /// "Debounced conversation persistence").
    pub async fn persist(self: &Arc<Self>, agent_id: &str) {
        let this = Arc::clone(self);
        let agent_id = agent_id.to_string();
        let debounce = self.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Err(err) = this.persist_now(&agent_id) {
                tracing::error!(agent_id, %err, "debounced conversation persist failed");
            }
        });
    }

    /// `persistNow`, immediate write, used directly by tests and by
    /// `flushAll` on shutdown.
    pub fn persist_now(&self, agent_id: &str) -> CoreResult<()> {
        let record = {
            let mut conversations = self.conversations.lock();
            let Some(convo) = conversations.get_mut(agent_id) else { return Ok(()) };
            if !convo.dirty {
                return Ok(());
            }
            convo.dirty = false;
            ConversationRecord {
                agent_id: agent_id.to_string(),
                messages: convo.entries.clone(),
                token_usage: convo.token_usage,
                updated_at: chrono::Utc::now(),
            }
        };
        self.layout.save_conversation(&record)
    }

    /// `flushAll`, awaited on shutdown (spec.md §4.4).
    pub fn flush_all(&self) -> Vec<(String, CoreError)> {
        let agent_ids: Vec<String> = self.conversations.lock().keys().cloned().collect();
        let mut failures = Vec::new();
        for agent_id in agent_ids {
            if let Err(err) = self.persist_now(&agent_id) {
                failures.push((agent_id, err));
            }
        }
        failures
    }
}

/// Used by the bus's [`crate::bus::AgentStatusLookup`] adapter tests and by
/// anything that needs to know whether an agent's context is exhausted
/// before gating a turn (spec.md §4.3 step 1).
pub fn blocks_turn(status: ContextStatus) -> bool {
    matches!(status, ContextStatus::Exceeded)
}

pub fn is_idle(status: ComputeStatus) -> bool {
    status.is_idle()
}

/// Discard every `tool` entry whose `tool_call_id` has no preceding
/// `assistant.tool_calls[*].id` (invariant I2/I3). Used after compression
/// and on load (spec.md §4.6 "Consistency enforcement on load").
fn sweep_orphans(entries: &mut Vec<ConversationEntry>) {
    let mut known_calls: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut swept = Vec::with_capacity(entries.len());
    for entry in entries.drain(..) {
        match &entry {
            ConversationEntry::Assistant { .. } => {
                for id in entry.tool_call_ids() {
                    known_calls.insert(id.clone());
                }
                swept.push(entry);
            }
            ConversationEntry::Tool { tool_call_id, .. } => {
                if known_calls.contains(tool_call_id) {
                    swept.push(entry);
                } else {
                    tracing::warn!(tool_call_id, "discarding orphaned tool response");
                }
            }
            _ => swept.push(entry),
        }
    }
    *entries = swept;
}

fn find_orphaned_responses(entries: &[ConversationEntry]) -> Vec<String> {
    let mut known_calls: std::collections::HashSet<String> = std::collections::HashSet::new();
    let mut orphans = Vec::new();
    for entry in entries {
        match entry {
            ConversationEntry::Assistant { .. } => {
                for id in entry.tool_call_ids() {
                    known_calls.insert(id.clone());
                }
            }
            ConversationEntry::Tool { tool_call_id, .. } => {
                if !known_calls.contains(tool_call_id) {
                    orphans.push(tool_call_id.clone());
                }
            }
            _ => {}
        }
    }
    orphans
}

/// Strips a trailing `assistant` entry with unresolved `tool_calls` (no
/// matching `tool` responses yet) and any partial responses that do
/// exist, per invariant I3. Returns whether anything was removed.
fn strip_unresolved_tail_entries(entries: &mut Vec<ConversationEntry>) -> bool {
    let Some(last) = entries.last() else { return false };
    let pending_ids: Vec<String> = match last {
        ConversationEntry::Assistant { tool_calls: Some(calls), .. } if !calls.is_empty() => {
            calls.iter().map(|c| c.id.clone()).collect()
        }
        _ => return false,
    };
    entries.pop();
    entries.retain(|e| match e {
        ConversationEntry::Tool { tool_call_id, .. } => !pending_ids.contains(tool_call_id),
        _ => true,
    });
    true
}

fn remove_tool_call(entries: &mut Vec<ConversationEntry>, tool_call_id: &str) {
    entries.retain(|e| match e {
        ConversationEntry::Tool { tool_call_id: id, .. } => id != tool_call_id,
        _ => true,
    });

    let mut collapse_at = None;
    for (idx, entry) in entries.iter_mut().enumerate() {
        if let ConversationEntry::Assistant { content, tool_calls, .. } = entry {
            if let Some(calls) = tool_calls {
                if calls.iter().any(|c| c.id == tool_call_id) {
                    calls.retain(|c| c.id != tool_call_id);
                    if calls.is_empty() {
                        *tool_calls = None;
                    }
                    if tool_calls.is_none() && content.as_deref().unwrap_or("").is_empty() {
                        collapse_at = Some(idx);
                    }
                }
            }
        }
    }
    if let Some(idx) = collapse_at {
        entries.remove(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orgkernel::{MessageContent, ToolCall, ToolCallFunction};

    fn manager() -> (tempfile::TempDir, ConversationManager) {
        let dir = tempfile::tempdir().unwrap();
        let layout = PersistenceLayout::new(dir.path());
        let mgr = ConversationManager::new(layout, ContextLimitConfig::default(), Duration::from_millis(500));
        (dir, mgr)
    }

    #[test]
    fn ensure_creates_system_entry_at_index_zero() {
        let (_dir, mgr) = manager();
        mgr.ensure("a", "you are an agent");
        let entries = mgr.entries("a");
        assert_eq!(entries.len(), 1);
        assert!(matches!(&entries[0], ConversationEntry::System { content } if content == "you are an agent"));
    }

    #[test]
    fn ensure_rewrites_index_zero_on_repeat_calls() {
        let (_dir, mgr) = manager();
        mgr.ensure("a", "first");
        mgr.append("a", ConversationEntry::user("hi"));
        mgr.ensure("a", "second");
        let entries = mgr.entries("a");
        assert_eq!(entries.len(), 2);
        assert!(matches!(&entries[0], ConversationEntry::System { content } if content == "second"));
    }

    #[test]
    fn compress_is_noop_below_threshold() {
        let (_dir, mgr) = manager();
        mgr.ensure("a", "sys");
        mgr.append("a", ConversationEntry::user("1"));
        let outcome = mgr.compress("a", "summary", 10);
        assert!(!outcome.compressed);
        assert_eq!(outcome.original_count, outcome.new_count);
    }

    #[test]
    fn compress_preserves_index_zero_and_inserts_summary() {
        let (_dir, mgr) = manager();
        mgr.ensure("a", "sys");
        for i in 0..20 {
            mgr.append("a", ConversationEntry::user(format!("msg {i}")));
        }
        let outcome = mgr.compress("a", "did stuff", 5);
        assert!(outcome.compressed);
        let entries = mgr.entries("a");
        assert!(matches!(&entries[0], ConversationEntry::System { content } if content == "sys"));
        assert!(matches!(&entries[1], ConversationEntry::System { content } if content == "[history summary] did stuff"));
        assert_eq!(entries.len(), 2 + 5);
    }

    #[test]
    fn compress_sweeps_dangling_tool_calls_in_trimmed_region() {
        let (_dir, mgr) = manager();
        mgr.ensure("a", "sys");
        mgr.append(
            "a",
            ConversationEntry::assistant_with_tool_calls(
                None,
                vec![ToolCall { id: "call-1".into(), function: ToolCallFunction { name: "x".into(), arguments: "{}".into() } }],
                None,
            ),
        );
        mgr.append("a", ConversationEntry::tool_result("call-1", MessageContent::Text("ok".into())));
        for i in 0..20 {
            mgr.append("a", ConversationEntry::user(format!("msg {i}")));
        }
        let outcome = mgr.compress("a", "summary", 5);
        assert!(outcome.compressed);
        let report = mgr.verify_history_consistency("a");
        assert!(report.consistent);
    }

    #[test]
    fn verify_history_consistency_flags_orphan_tool_response() {
        let (_dir, mgr) = manager();
        mgr.ensure("a", "sys");
        mgr.append("a", ConversationEntry::tool_result("dangling", MessageContent::Text("x".into())));
        let report = mgr.verify_history_consistency("a");
        assert!(!report.consistent);
        assert_eq!(report.orphaned_responses, vec!["dangling".to_string()]);
    }

    #[test]
    fn strip_unresolved_tail_removes_pending_assistant_and_partial_response() {
        let (_dir, mgr) = manager();
        mgr.ensure("a", "sys");
        mgr.append(
            "a",
            ConversationEntry::assistant_with_tool_calls(
                None,
                vec![ToolCall { id: "call-1".into(), function: ToolCallFunction { name: "x".into(), arguments: "{}".into() } }],
                None,
            ),
        );
        mgr.strip_unresolved_tail("a");
        assert_eq!(mgr.entries("a").len(), 1);
    }

    #[test]
    fn remove_tool_call_entry_collapses_empty_assistant_entry() {
        let (_dir, mgr) = manager();
        mgr.ensure("a", "sys");
        mgr.append(
            "a",
            ConversationEntry::assistant_with_tool_calls(
                None,
                vec![ToolCall { id: "call-1".into(), function: ToolCallFunction { name: "x".into(), arguments: "{}".into() } }],
                None,
            ),
        );
        mgr.append("a", ConversationEntry::tool_result("call-1", MessageContent::Text("ok".into())));
        mgr.remove_tool_call_entry("a", "call-1");
        assert_eq!(mgr.entries("a").len(), 1);
    }

    #[test]
    fn persist_now_round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PersistenceLayout::new(dir.path());
        let mgr = ConversationManager::new(layout.clone(), ContextLimitConfig::default(), Duration::from_millis(500));
        mgr.ensure("a", "sys");
        mgr.append("a", ConversationEntry::user("hi"));
        mgr.persist_now("a").unwrap();

        let mgr2 = ConversationManager::new(layout, ContextLimitConfig::default(), Duration::from_millis(500));
        mgr2.load(&["a".to_string()]).unwrap();
        assert_eq!(mgr2.entries("a").len(), 2);
    }

    #[test]
    fn context_status_reflects_thresholds() {
        let (_dir, mgr) = manager();
        mgr.ensure("a", "sys");
        mgr.update_token_usage("a", TokenUsage { prompt_tokens: 100_000, completion_tokens: 0, total_tokens: 100_000 });
        let report = mgr.get_context_status("a");
        assert_eq!(report.status, ContextStatus::Warning);
    }
}
