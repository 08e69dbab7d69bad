//! File-backed `ArtifactStore`, spec.md §6 "External interfaces".
//!
//! Atomic-write style lifted straight from `orgruntime::persistence`
//! (write-temp-then-rename) — spec.md §1 scopes the artifact store's
//! backing implementation out of the core crate, so `orgcli` owns it,
//! generalized to one JSON sidecar file per artifact rather than the
//! core's fixed three-path layout.

use async_trait::async_trait;
use orgkernel::{Artifact, ArtifactStore, CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredArtifact {
    artifact_type: String,
    content: String,
    is_binary: bool,
    mime_type: Option<String>,
    meta: Option<serde_json::Value>,
}

/// Stores each artifact as `{artifacts_dir}/{uuid}.json`.
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, reference: &str) -> PathBuf {
        let id = reference.strip_prefix("artifact:").unwrap_or(reference);
        self.root.join(format!("{id}.json"))
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn put_artifact(
        &self,
        artifact_type: &str,
        content: &str,
        meta: Option<serde_json::Value>,
    ) -> CoreResult<String> {
        let id = Uuid::new_v4().to_string();
        let reference = format!("artifact:{id}");
        let path = self.path_for(&reference);
        let stored = StoredArtifact {
            artifact_type: artifact_type.to_string(),
            content: content.to_string(),
            is_binary: false,
            mime_type: None,
            meta,
        };
        std::fs::create_dir_all(&self.root)
            .map_err(|e| CoreError::PersistenceError(format!("create_dir_all {}: {e}", self.root.display())))?;
        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| CoreError::PersistenceError(format!("serialize artifact {id}: {e}")))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| CoreError::PersistenceError(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| CoreError::PersistenceError(format!("rename {}: {e}", path.display())))?;
        Ok(reference)
    }

    async fn get_artifact(&self, reference: &str) -> CoreResult<Option<Artifact>> {
        let path = self.path_for(reference);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| CoreError::PersistenceError(format!("read {}: {e}", path.display())))?;
        let stored: StoredArtifact = serde_json::from_str(&content)
            .map_err(|e| CoreError::PersistenceError(format!("parse {}: {e}", path.display())))?;
        let id = reference.strip_prefix("artifact:").unwrap_or(reference).to_string();
        Ok(Some(Artifact {
            id,
            artifact_type: stored.artifact_type,
            content: stored.content,
            is_binary: stored.is_binary,
            mime_type: stored.mime_type,
            meta: stored.meta,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path());
        let reference = store.put_artifact("text", "hello world", None).await.unwrap();
        let artifact = store.get_artifact(&reference).await.unwrap().unwrap();
        assert_eq!(artifact.content, "hello world");
        assert_eq!(artifact.artifact_type, "text");
    }

    #[tokio::test]
    async fn unknown_reference_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path());
        assert!(store.get_artifact("artifact:nonexistent").await.unwrap().is_none());
    }
}
