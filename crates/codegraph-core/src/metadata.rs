use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::ids::project_fingerprint;

/// Per-workspace metadata persisted at `<workspaceRoot>/.codegraph/workspace.json`.
/// Loss of this file is non-fatal: `projectId` is regenerated deterministically
/// from the absolute workspace root (§6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    pub project_id: String,
    pub name: String,
    pub workspace_root: String,
    pub created_at: DateTime<Utc>,
}

impl WorkspaceMetadata {
    fn path(workspace_root: &Path) -> std::path::PathBuf {
        workspace_root.join(".codegraph").join("workspace.json")
    }

    /// Loads existing metadata if present and valid, otherwise derives a
    /// fresh `projectId` from the path and persists it.
    pub fn load_or_create(workspace_root: &Path) -> crate::Result<Self> {
        let path = Self::path(workspace_root);
        if let Ok(bytes) = std::fs::read(&path) {
            if let Ok(existing) = serde_json::from_slice::<Self>(&bytes) {
                return Ok(existing);
            }
        }

        let name = workspace_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "workspace".into());

        let metadata = Self {
            project_id: project_fingerprint(workspace_root),
            name,
            workspace_root: workspace_root.to_string_lossy().to_string(),
            created_at: Utc::now(),
        };

        metadata.persist(workspace_root)?;
        Ok(metadata)
    }

    pub fn persist(&self, workspace_root: &Path) -> crate::Result<()> {
        let path = Self::path(workspace_root);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regenerates_deterministically_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let m1 = WorkspaceMetadata::load_or_create(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join(".codegraph").join("workspace.json")).unwrap();
        let m2 = WorkspaceMetadata::load_or_create(dir.path()).unwrap();
        assert_eq!(m1.project_id, m2.project_id);
    }

    #[test]
    fn persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let m1 = WorkspaceMetadata::load_or_create(dir.path()).unwrap();
        let m2 = WorkspaceMetadata::load_or_create(dir.path()).unwrap();
        assert_eq!(m1.project_id, m2.project_id);
        assert_eq!(m1.created_at, m2.created_at);
    }
}
