use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use codegraph_core::{CodeGraphError, GraphStore, NodeKind, RebuildMode, Result, WorkspaceConfig, WorkspaceMetadata};
use codegraph_graph::{
    classify_changes, discover_source_files, ChangeKind, GraphIndex, IngestionPipeline, RebuildHandle, Rebuilder,
    SurrealGraphStore, SurrealStoreConfig,
};
use codegraph_parser::ParserRegistry;
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::vector_ops::VectorSubsystem;

/// Opaque per-binding token a client echoes on every call after
/// `bind_workspace` (§4.1, §6.1). Distinct from whatever connection-level
/// session the transport itself maintains: one transport connection may
/// rebind across workspaces, and in principle hold more than one binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

const RECOGNIZED_SOURCE_DIRS: &[&str] = &["src", "lib", "app", "packages", "source"];

fn resolve_source_dir(workspace_root: &Path, explicit: Option<&str>) -> PathBuf {
    if let Some(explicit) = explicit {
        return workspace_root.join(explicit);
    }
    for candidate in RECOGNIZED_SOURCE_DIRS {
        let path = workspace_root.join(candidate);
        if path.is_dir() {
            return path;
        }
    }
    workspace_root.join("src")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub project_id: String,
    pub workspace_root: String,
    pub graph_node_counts: HashMap<String, usize>,
    pub embedding_coverage: f64,
    pub pending_file_changes: usize,
    pub last_rebuild_at: Option<DateTime<Utc>>,
    pub pending_rebuild_id: Option<Uuid>,
}

/// Everything a bound session needs to serve one workspace: the resolved
/// paths, the loaded config, and the per-workspace graph/vector/parser
/// stack (§4.1). Sessions never share this state — each `bind_workspace`
/// call builds a fresh one.
pub struct WorkspaceSession {
    pub workspace_root: PathBuf,
    pub source_dir: PathBuf,
    pub project_id: String,
    pub config: WorkspaceConfig,
    pub store: Arc<dyn GraphStore>,
    pub index: Arc<GraphIndex>,
    pub parser_registry: Arc<ParserRegistry>,
    pub rebuilder: Arc<Rebuilder>,
    pub vector: Arc<VectorSubsystem>,
}

impl WorkspaceSession {
    /// Queues a rebuild (§4.3) and, once it completes, feeds its embedding
    /// and purge queues to the vector subsystem (phase 7). The embedding
    /// step lives outside `IngestionPipeline` because it needs the tiered
    /// embedder and store client, both owned by this crate, not C4.
    pub fn request_rebuild(self: &Arc<Self>, mode: RebuildMode) -> Result<RebuildHandle> {
        let pipeline = Arc::new(IngestionPipeline {
            workspace_root: self.workspace_root.clone(),
            source_dir: self.source_dir.clone(),
            project_id: self.project_id.clone(),
            store: self.store.clone(),
            index: self.index.clone(),
            parser_registry: self.parser_registry.clone(),
            config: self.config.clone(),
        });
        let handle = self.rebuilder.request(pipeline, mode)?;
        let rebuild_id = handle.rebuild_id;
        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.rebuilder.wait_idle().await;
            let Some(status) = session.rebuilder.last_status() else { return };
            if status.rebuild_id != rebuild_id {
                return;
            }
            if let Some(outcome) = &status.outcome {
                if let Err(e) = session.vector.refresh(outcome, &session.index, &session.project_id, status.mode).await {
                    tracing::warn!(error = %e, "embedding refresh failed after rebuild");
                }
            }
        });
        Ok(handle)
    }

    fn pending_file_changes(&self) -> usize {
        let discovered_paths = discover_source_files(&self.workspace_root, &self.source_dir);
        let mut discovered = Vec::with_capacity(discovered_paths.len());
        for path in &discovered_paths {
            if let Ok(bytes) = std::fs::read(path) {
                let rel = codegraph_core::canonical_relative_path(&self.workspace_root, path);
                discovered.push((rel, path.clone(), bytes));
            }
        }
        classify_changes(&self.index, &self.project_id, &discovered)
            .iter()
            .filter(|c| c.kind != ChangeKind::Unchanged)
            .count()
    }

    pub fn health(&self) -> HealthReport {
        let mut graph_node_counts = HashMap::new();
        for kind in [
            NodeKind::File,
            NodeKind::Function,
            NodeKind::Class,
            NodeKind::Import,
            NodeKind::TestSuite,
            NodeKind::TestCase,
            NodeKind::Document,
            NodeKind::Section,
            NodeKind::Violation,
            NodeKind::Episode,
            NodeKind::Claim,
            NodeKind::Task,
            NodeKind::Feature,
        ] {
            graph_node_counts.insert(kind.as_str().to_string(), self.index.nodes_by_kind(kind).len());
        }

        let last_status = self.rebuilder.last_status();
        HealthReport {
            project_id: self.project_id.clone(),
            workspace_root: self.workspace_root.to_string_lossy().to_string(),
            graph_node_counts,
            embedding_coverage: self.vector.coverage(&self.index),
            pending_file_changes: self.pending_file_changes(),
            last_rebuild_at: last_status.as_ref().map(|s| s.completed_at),
            pending_rebuild_id: self.rebuilder.pending_rebuild_id(),
        }
    }
}

/// Registry of bound sessions, one per issued token (§4.1 "sessions are
/// independent"). Never shares a `WorkspaceSession` across tokens, even when
/// two tokens happen to bind the same workspace root.
#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<SessionToken, Arc<WorkspaceSession>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bind_workspace(
        &self,
        workspace_root: PathBuf,
        source_dir: Option<String>,
        project_id: Option<String>,
    ) -> Result<(SessionToken, Arc<WorkspaceSession>)> {
        let workspace_root = workspace_root
            .canonicalize()
            .map_err(|e| CodeGraphError::ValidationFailed(format!("workspace root: {e}")))?;
        if !workspace_root.is_dir() {
            return Err(CodeGraphError::ValidationFailed(format!(
                "{} is not a directory",
                workspace_root.display()
            )));
        }

        let metadata = WorkspaceMetadata::load_or_create(&workspace_root)?;
        let project_id = project_id.unwrap_or(metadata.project_id);
        let resolved_source_dir = resolve_source_dir(&workspace_root, source_dir.as_deref());
        let config = WorkspaceConfig::load(&workspace_root)?;

        let store = SurrealGraphStore::connect(SurrealStoreConfig {
            connection: config.graph_store_url.clone(),
            ..Default::default()
        })
        .await?;

        let vector = Arc::new(VectorSubsystem::new(&config)?);

        let session = Arc::new(WorkspaceSession {
            workspace_root,
            source_dir: resolved_source_dir,
            project_id,
            config,
            store: Arc::new(store),
            index: Arc::new(GraphIndex::new()),
            parser_registry: Arc::new(ParserRegistry::with_default_parsers()),
            rebuilder: Arc::new(Rebuilder::new()),
            vector,
        });

        let token = SessionToken(Uuid::new_v4().to_string());
        self.sessions.insert(token.clone(), session.clone());
        Ok((token, session))
    }

    pub fn get(&self, token: &SessionToken) -> Result<Arc<WorkspaceSession>> {
        self.sessions.get(token).map(|entry| entry.clone()).ok_or(CodeGraphError::SessionUnbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_lib_when_src_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("lib")).unwrap();
        let resolved = resolve_source_dir(dir.path(), None);
        assert_eq!(resolved, dir.path().join("lib"));
    }

    #[test]
    fn falls_back_to_src_when_nothing_recognized() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_source_dir(dir.path(), None);
        assert_eq!(resolved, dir.path().join("src"));
    }

    #[tokio::test]
    async fn unbound_token_fails_with_session_unbound() {
        let manager = SessionManager::new();
        let token = SessionToken("nonexistent".into());
        assert!(matches!(manager.get(&token), Err(CodeGraphError::SessionUnbound)));
    }

    #[tokio::test]
    async fn bind_workspace_issues_independent_sessions() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        let manager = SessionManager::new();

        let (token_a, session_a) = manager.bind_workspace(dir_a.path().to_path_buf(), None, None).await.unwrap();
        let (token_b, session_b) = manager.bind_workspace(dir_b.path().to_path_buf(), None, None).await.unwrap();

        assert_ne!(token_a, token_b);
        assert_ne!(session_a.project_id, session_b.project_id);
    }
}
