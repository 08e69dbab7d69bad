//! File-backed persistence, spec.md §4.7, §6 "Persisted state layout".
//!
//! Single `org.json`, per-agent conversation files under `conversations/`,
//! per-agent contact files under `contacts/`, all JSON/UTF-8/indented,
//! written atomically (write-temp-then-rename). Generalized from the
//! teacher's `mofa-foundation::persistence::traits` store-trait shape
//! (`MessageStore`, `SessionStore`, ...) down to the single
//! JSON-file-per-entity backend spec.md §6 fixes — the core explicitly
//! scopes "persistence file format beyond the consistency rules we
//! impose" out (spec.md §1).

use orgkernel::{Contact, ConversationEntry, CoreError, CoreResult, Role, TokenUsage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk shape of `org.json` (spec.md §4.7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgDocument {
    pub roles: Vec<Role>,
    pub agents: Vec<orgkernel::Agent>,
    pub terminations: Vec<TerminationRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminationRecord {
    pub agent_id: String,
    pub reason: Option<String>,
    pub terminated_at: chrono::DateTime<chrono::Utc>,
}

/// On-disk shape of `conversations/{agentId}.json` (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub agent_id: String,
    pub messages: Vec<ConversationEntry>,
    pub token_usage: TokenUsage,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Write `value` to `path` atomically: serialize to a sibling temp file,
/// then rename over the destination (spec.md §6 "Writes are atomic").
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let parent = path.parent().ok_or_else(|| {
        CoreError::PersistenceError(format!("no parent directory for {}", path.display()))
    })?;
    std::fs::create_dir_all(parent)
        .map_err(|e| CoreError::PersistenceError(format!("create_dir_all {}: {e}", parent.display())))?;
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CoreError::PersistenceError(format!("serialize {}: {e}", path.display())))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .map_err(|e| CoreError::PersistenceError(format!("write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| CoreError::PersistenceError(format!("rename {}: {e}", path.display())))?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> CoreResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| CoreError::PersistenceError(format!("read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| CoreError::PersistenceError(format!("parse {}: {e}", path.display())))
}

/// Layout rooted at `runtimeDir` (spec.md §6 "Persisted state layout").
#[derive(Debug, Clone)]
pub struct PersistenceLayout {
    root: PathBuf,
}

impl PersistenceLayout {
    pub fn new(runtime_dir: impl Into<PathBuf>) -> Self {
        Self { root: runtime_dir.into() }
    }

    fn org_path(&self) -> PathBuf {
        self.root.join("org.json")
    }

    fn conversation_path(&self, agent_id: &str) -> PathBuf {
        self.root.join("conversations").join(format!("{agent_id}.json"))
    }

    fn contact_path(&self, agent_id: &str) -> PathBuf {
        self.root.join("contacts").join(format!("{agent_id}.json"))
    }

    pub fn load_org(&self) -> CoreResult<OrgDocument> {
        Ok(read_json(&self.org_path())?.unwrap_or_default())
    }

    pub fn save_org(&self, doc: &OrgDocument) -> CoreResult<()> {
        write_atomic(&self.org_path(), doc)
    }

    pub fn load_conversation(&self, agent_id: &str) -> CoreResult<Option<ConversationRecord>> {
        read_json(&self.conversation_path(agent_id))
    }

    pub fn save_conversation(&self, record: &ConversationRecord) -> CoreResult<()> {
        write_atomic(&self.conversation_path(&record.agent_id), record)
    }

    pub fn delete_conversation(&self, agent_id: &str) -> CoreResult<()> {
        let path = self.conversation_path(agent_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| CoreError::PersistenceError(format!("remove {}: {e}", path.display())))?;
        }
        Ok(())
    }

    pub fn load_contacts(&self, agent_id: &str) -> CoreResult<Vec<Contact>> {
        Ok(read_json(&self.contact_path(agent_id))?.unwrap_or_default())
    }

    pub fn save_contacts(&self, agent_id: &str, contacts: &[Contact]) -> CoreResult<()> {
        write_atomic(&self.contact_path(agent_id), &contacts.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PersistenceLayout::new(dir.path());
        let mut doc = OrgDocument::default();
        doc.roles.push(Role::new("planner", "you plan"));
        layout.save_org(&doc).unwrap();
        let loaded = layout.load_org().unwrap();
        assert_eq!(loaded.roles.len(), 1);
        assert_eq!(loaded.roles[0].name, "planner");
    }

    #[test]
    fn missing_org_loads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PersistenceLayout::new(dir.path());
        let loaded = layout.load_org().unwrap();
        assert!(loaded.roles.is_empty());
    }

    #[test]
    fn conversation_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PersistenceLayout::new(dir.path());
        let record = ConversationRecord {
            agent_id: "a1".into(),
            messages: vec![ConversationEntry::system("sys"), ConversationEntry::user("hi")],
            token_usage: TokenUsage::default(),
            updated_at: chrono::Utc::now(),
        };
        layout.save_conversation(&record).unwrap();
        let loaded = layout.load_conversation("a1").unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
    }

    #[test]
    fn writes_are_atomic_no_stray_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PersistenceLayout::new(dir.path());
        layout.save_org(&OrgDocument::default()).unwrap();
        assert!(!layout.org_path().with_extension("json.tmp").exists());
        assert!(layout.org_path().exists());
    }
}
