use codegraph_core::{CodeGraphError, RebuildMode};
use codegraph_mcp::coordination;
use codegraph_mcp::session::SessionManager;

fn write_file(root: &std::path::Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, contents).unwrap();
}

/// A freshly bound workspace with no source files reports zero node counts
/// and a fully-caught-up rebuild once one incremental pass has run.
#[tokio::test]
async fn bind_then_incremental_rebuild_on_empty_workspace_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();

    let manager = SessionManager::new();
    let (_token, session) = manager.bind_workspace(dir.path().to_path_buf(), None, None).await.unwrap();

    let handle = session.clone().request_rebuild(RebuildMode::Incremental).unwrap();
    session.rebuilder.wait_idle().await;
    let status = session.rebuilder.last_status().unwrap();
    assert_eq!(status.rebuild_id, handle.rebuild_id);

    let health = session.health();
    assert_eq!(health.graph_node_counts.get("file").copied().unwrap_or_default(), 0);
    assert_eq!(health.pending_file_changes, 0);
}

/// A second incremental rebuild after one source file is added picks up
/// exactly that file; nothing already-seen is reprocessed.
#[tokio::test]
async fn incremental_rebuild_picks_up_only_new_files() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "src/a.ts", "export function a() { return 1; }");

    let manager = SessionManager::new();
    let (_token, session) = manager.bind_workspace(dir.path().to_path_buf(), None, None).await.unwrap();

    session.clone().request_rebuild(RebuildMode::Incremental).unwrap();
    session.rebuilder.wait_idle().await;
    let first_count = session.index.nodes_by_kind(codegraph_core::NodeKind::File).len();
    assert_eq!(first_count, 1);

    write_file(dir.path(), "src/b.ts", "export function b() { return 2; }");
    session.clone().request_rebuild(RebuildMode::Incremental).unwrap();
    session.rebuilder.wait_idle().await;
    let second_count = session.index.nodes_by_kind(codegraph_core::NodeKind::File).len();
    assert_eq!(second_count, 2);
}

/// Two independent bindings of the same workspace root never see each
/// other's claims or tasks — state lives on the session, not the path.
#[tokio::test]
async fn claim_made_in_one_session_is_invisible_to_a_second_binding() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();

    let manager = SessionManager::new();
    let (_token_a, session_a) = manager.bind_workspace(dir.path().to_path_buf(), None, None).await.unwrap();
    let (_token_b, session_b) = manager.bind_workspace(dir.path().to_path_buf(), None, None).await.unwrap();

    coordination::claim(&session_a, "src/a.ts", "file", "edit", "agent-1").await.unwrap();

    assert!(coordination::coordination_overview(&session_a).len() == 1);
    assert!(coordination::coordination_overview(&session_b).is_empty());
}

/// `decision` episodes without a rationale are rejected at the coordination
/// layer before anything reaches the store.
#[tokio::test]
async fn episode_add_enforces_decision_rationale_through_a_real_session() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src")).unwrap();

    let manager = SessionManager::new();
    let (_token, session) = manager.bind_workspace(dir.path().to_path_buf(), None, None).await.unwrap();

    let rejected = coordination::episode_add(&session, "decision", "drop RocksDB", None, "agent-1", None).await;
    assert!(matches!(rejected, Err(CodeGraphError::ValidationFailed(_))));

    let accepted =
        coordination::episode_add(&session, "decision", "drop RocksDB", Some("SurrealDB covers our Cypher needs"), "agent-1", None)
            .await
            .unwrap();
    assert_eq!(accepted.episode_type, "DECISION");
}

/// An unbound token is rejected with `SESSION_UNBOUND`, never a panic.
#[tokio::test]
async fn unbound_session_token_surfaces_as_session_unbound() {
    let manager = SessionManager::new();
    let result = manager.get(&codegraph_mcp::SessionToken("not-a-real-token".to_string()));
    assert!(matches!(result, Err(CodeGraphError::SessionUnbound)));
}
