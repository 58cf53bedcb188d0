use std::sync::Arc;

use chrono::{DateTime, Utc};
use codegraph_core::{CodeGraphError, RebuildMode, Result};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{error, info};
use uuid::Uuid;

use crate::ingest::{IngestOutcome, IngestionPipeline};

#[derive(Debug, Clone)]
pub struct RebuildStatus {
    pub rebuild_id: Uuid,
    pub mode: RebuildMode,
    pub done: bool,
    pub outcome: Option<IngestOutcome>,
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RebuildHandle {
    pub rebuild_id: Uuid,
}

struct PendingRebuild {
    rebuild_id: Uuid,
    mode: RebuildMode,
}

/// Owns the one logical rebuild queue for a session (§5 "parallel worker
/// pool with cooperative I/O... each session owns one logical queue").
/// `rebuild_graph` returns `{status: QUEUED, rebuildId}` immediately; the
/// actual ingestion runs on a spawned task. A full rebuild requested while
/// one is in flight is rejected with `REBUILD_IN_PROGRESS`; an incremental
/// one coalesces (it simply waits for the in-flight rebuild's diff, since
/// the next rebuild reconciles via content hash regardless of timing).
pub struct Rebuilder {
    pending: Mutex<Option<PendingRebuild>>,
    last: Mutex<Option<RebuildStatus>>,
    notify: Notify,
}

impl Default for Rebuilder {
    fn default() -> Self {
        Self {
            pending: Mutex::new(None),
            last: Mutex::new(None),
            notify: Notify::new(),
        }
    }
}

impl Rebuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_rebuild_id(&self) -> Option<Uuid> {
        self.pending.lock().as_ref().map(|p| p.rebuild_id)
    }

    pub fn last_status(&self) -> Option<RebuildStatus> {
        self.last.lock().clone()
    }

    /// Queues a rebuild. Returns `Err(RebuildInProgress)` only for a `Full`
    /// request made while another rebuild is already running.
    pub fn request(self: &Arc<Self>, pipeline: Arc<IngestionPipeline>, mode: RebuildMode) -> Result<RebuildHandle> {
        {
            let mut pending = self.pending.lock();
            if let Some(existing) = pending.as_ref() {
                if mode == RebuildMode::Full {
                    return Err(CodeGraphError::RebuildInProgress);
                }
                // Incremental requests coalesce with the in-flight rebuild.
                return Ok(RebuildHandle { rebuild_id: existing.rebuild_id });
            }
            let rebuild_id = Uuid::new_v4();
            *pending = Some(PendingRebuild { rebuild_id, mode });
        }

        let rebuild_id = self.pending.lock().as_ref().unwrap().rebuild_id;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(pipeline, mode, rebuild_id).await;
        });

        Ok(RebuildHandle { rebuild_id })
    }

    async fn run(self: Arc<Self>, pipeline: Arc<IngestionPipeline>, mode: RebuildMode, rebuild_id: Uuid) {
        info!(%rebuild_id, ?mode, "rebuild started");
        let result = pipeline.run(mode).await;

        let status = match result {
            Ok(outcome) => RebuildStatus {
                rebuild_id,
                mode,
                done: true,
                outcome: Some(outcome),
                error: None,
                completed_at: Utc::now(),
            },
            Err(e) => {
                error!(%rebuild_id, error = %e, "rebuild failed, prior graph left untouched");
                RebuildStatus {
                    rebuild_id,
                    mode,
                    done: true,
                    outcome: None,
                    error: Some(e.to_string()),
                    completed_at: Utc::now(),
                }
            }
        };

        *self.last.lock() = Some(status);
        *self.pending.lock() = None;
        self.notify.notify_waiters();
    }

    /// Blocks until the in-flight rebuild (if any) completes. Used by tests
    /// and by `health()` when a caller explicitly wants to wait.
    pub async fn wait_idle(&self) {
        loop {
            if self.pending.lock().is_none() {
                return;
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::GraphIndex;
    use crate::store::{SurrealGraphStore, SurrealStoreConfig};
    use codegraph_parser::ParserRegistry;
    use codegraph_core::WorkspaceConfig;
    use tempfile::tempdir;

    async fn pipeline(root: &std::path::Path) -> Arc<IngestionPipeline> {
        let store = SurrealGraphStore::connect(SurrealStoreConfig::default()).await.unwrap();
        Arc::new(IngestionPipeline {
            workspace_root: root.to_path_buf(),
            source_dir: root.to_path_buf(),
            project_id: "ab12".to_string(),
            store: Arc::new(store),
            index: Arc::new(GraphIndex::new()),
            parser_registry: Arc::new(ParserRegistry::with_default_parsers()),
            config: WorkspaceConfig::default(),
        })
    }

    #[tokio::test]
    async fn second_full_rebuild_is_rejected_while_first_runs() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export function a() {}\n").unwrap();
        let p = pipeline(dir.path()).await;
        let rebuilder = Arc::new(Rebuilder::new());

        let first = rebuilder.request(p.clone(), RebuildMode::Full).unwrap();
        let second = rebuilder.request(p.clone(), RebuildMode::Full);
        assert!(matches!(second, Err(CodeGraphError::RebuildInProgress)));

        rebuilder.wait_idle().await;
        assert_eq!(rebuilder.pending_rebuild_id(), None);
        let status = rebuilder.last_status().unwrap();
        assert_eq!(status.rebuild_id, first.rebuild_id);
        assert!(status.done);
    }
}
