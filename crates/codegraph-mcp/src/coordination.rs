use std::collections::HashMap;

use chrono::{DateTime, Utc};
use codegraph_core::{
    CodeGraphError, Edge, EdgeKind, GraphStatement, Node, NodeKind, Result, ScopedId,
};
use codegraph_vector::Bm25Index;
use serde::Serialize;
use serde_json::{json, Value};

use crate::session::WorkspaceSession;

fn new_id(project_id: &str, kind: &str) -> ScopedId {
    ScopedId::opaque(project_id, kind)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimSummary {
    pub claim_id: String,
    pub target_id: String,
    pub claim_type: String,
    pub intent: String,
    pub actor: String,
    pub acquired_at: DateTime<Utc>,
    pub age_seconds: i64,
}

fn claim_summary(node: &Node) -> ClaimSummary {
    let acquired_at = node
        .attr_str("acquiredAt")
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(node.valid_from);
    ClaimSummary {
        claim_id: node.id.local_key().to_string(),
        target_id: node.attr_str("targetId").unwrap_or_default().to_string(),
        claim_type: node.attr_str("claimType").unwrap_or_default().to_string(),
        intent: node.attr_str("intent").unwrap_or_default().to_string(),
        actor: node.attr_str("actor").unwrap_or_default().to_string(),
        acquired_at,
        age_seconds: (Utc::now() - acquired_at).num_seconds(),
    }
}

fn active_claim_for_target(session: &WorkspaceSession, target_id: &str) -> Option<Node> {
    session
        .index
        .nodes_by_kind(NodeKind::Claim)
        .into_iter()
        .find(|n| n.attr_str("targetId") == Some(target_id) && n.attr_str("state") == Some("active"))
}

/// Creates a new claim unless one is already active for the same target
/// (invariant 6, §4.7). The `CLAIMS` edge records the claim→target
/// relationship in the graph proper; the claim node itself carries the full
/// lock state so `release` needs no edge traversal.
pub async fn claim(
    session: &WorkspaceSession,
    target_id: &str,
    claim_type: &str,
    intent: &str,
    actor: &str,
) -> Result<ClaimSummary> {
    if let Some(existing) = active_claim_for_target(session, target_id) {
        return Err(CodeGraphError::AlreadyClaimed(format!(
            "{target_id} is already claimed by {} (claimId={})",
            existing.attr_str("actor").unwrap_or("unknown"),
            existing.id.local_key()
        )));
    }

    let target = ScopedId::from(target_id.to_string());
    let claim_node_id = new_id(&session.project_id, "CLAIM");
    let now = Utc::now();
    let node = Node::new(
        claim_node_id.clone(),
        NodeKind::Claim,
        session.project_id.clone(),
        json!({
            "targetId": target_id,
            "claimType": claim_type,
            "intent": intent,
            "actor": actor,
            "state": "active",
            "acquiredAt": now.to_rfc3339(),
            "releasedAt": Value::Null,
        }),
    );
    let edge = Edge::new(EdgeKind::Claims, claim_node_id.clone(), target, session.project_id.clone());

    let statements = vec![GraphStatement::UpsertNode(node.clone()), GraphStatement::UpsertEdge(edge)];
    session.store.write_batch(statements.clone()).await?;
    session.index.apply(&statements);

    Ok(claim_summary(&node))
}

/// Releases a claim. Idempotent on an already-released claim (§4.7).
pub async fn release(session: &WorkspaceSession, claim_id: &str) -> Result<()> {
    let id = ScopedId::new(&session.project_id, "CLAIM", claim_id);
    let Some(existing) = session.index.current_node(&id) else {
        return Err(CodeGraphError::ValidationFailed(format!("no such claim: {claim_id}")));
    };
    if existing.attr_str("state") == Some("released") {
        return Ok(());
    }

    let mut attributes = existing.attributes.clone();
    attributes["state"] = json!("released");
    attributes["releasedAt"] = json!(Utc::now().to_rfc3339());

    let supersede = GraphStatement::SupersedeNode { id: id.clone(), at: Utc::now() };
    let replacement = Node::new(id, NodeKind::Claim, session.project_id.clone(), attributes);
    let statements = vec![supersede, GraphStatement::UpsertNode(replacement)];
    session.store.write_batch(statements.clone()).await?;
    session.index.apply(&statements);
    Ok(())
}

pub fn coordination_overview(session: &WorkspaceSession) -> Vec<ClaimSummary> {
    let mut claims: Vec<ClaimSummary> = session
        .index
        .nodes_by_kind(NodeKind::Claim)
        .iter()
        .filter(|n| n.attr_str("state") == Some("active"))
        .map(claim_summary)
        .collect();
    claims.sort_by(|a, b| b.age_seconds.cmp(&a.age_seconds));
    claims
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeSummary {
    pub episode_id: String,
    pub episode_type: String,
    pub content: String,
    pub rationale: Option<String>,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

fn episode_summary(node: &Node) -> EpisodeSummary {
    EpisodeSummary {
        episode_id: node.id.local_key().to_string(),
        episode_type: node.attr_str("type").unwrap_or_default().to_string(),
        content: node.attr_str("content").unwrap_or_default().to_string(),
        rationale: node.attr_str("rationale").map(str::to_string),
        actor: node.attr_str("actor").unwrap_or_default().to_string(),
        created_at: node.valid_from,
    }
}

/// Appends an episode (§4.7). `DECISION` episodes are rejected without a
/// non-empty `rationale` (invariant 7).
pub async fn episode_add(
    session: &WorkspaceSession,
    episode_type: &str,
    content: &str,
    rationale: Option<&str>,
    actor: &str,
    metadata: Option<Value>,
) -> Result<EpisodeSummary> {
    if episode_type.eq_ignore_ascii_case("decision") && rationale.map(str::trim).unwrap_or("").is_empty() {
        return Err(CodeGraphError::ValidationFailed(
            "DECISION episodes require a non-empty rationale".into(),
        ));
    }

    let id = new_id(&session.project_id, "EPISODE");
    let mut attributes = json!({
        "type": episode_type.to_uppercase(),
        "content": content,
        "rationale": rationale,
        "actor": actor,
        "createdAt": Utc::now().to_rfc3339(),
    });
    if let Some(metadata) = metadata {
        attributes["metadata"] = metadata;
    }
    let node = Node::new(id, NodeKind::Episode, session.project_id.clone(), attributes);

    let statements = vec![GraphStatement::UpsertNode(node.clone())];
    session.store.write_batch(statements.clone()).await?;
    session.index.apply(&statements);

    Ok(episode_summary(&node))
}

fn search_episodes(session: &WorkspaceSession, query: &str, type_filter: Option<&str>, limit: usize) -> Vec<EpisodeSummary> {
    let episodes: Vec<Node> = session
        .index
        .nodes_by_kind(NodeKind::Episode)
        .into_iter()
        .filter(|n| type_filter.map_or(true, |t| n.attr_str("type") == Some(t)))
        .collect();

    let corpus: Vec<(ScopedId, String)> = episodes
        .iter()
        .map(|node| {
            let text = format!(
                "{} {}",
                node.attr_str("content").unwrap_or_default(),
                node.attr_str("rationale").unwrap_or_default()
            );
            (node.id.clone(), text)
        })
        .collect();
    let bm25 = Bm25Index::build(&corpus);

    bm25.search(query, limit)
        .into_iter()
        .filter_map(|(id, _score)| episodes.iter().find(|n| n.id == id))
        .map(episode_summary)
        .collect()
}

pub fn episode_recall(session: &WorkspaceSession, query: &str, limit: usize) -> Vec<EpisodeSummary> {
    search_episodes(session, query, None, limit)
}

pub fn decision_query(session: &WorkspaceSession, topic: &str, limit: usize) -> Vec<EpisodeSummary> {
    search_episodes(session, topic, Some("DECISION"), limit)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: String,
    pub status: String,
    pub notes: Option<String>,
    pub blocked_by: Vec<String>,
}

fn task_summary(node: &Node) -> TaskSummary {
    TaskSummary {
        task_id: node.id.local_key().to_string(),
        status: node.attr_str("status").unwrap_or_default().to_string(),
        notes: node.attr_str("notes").map(str::to_string),
        blocked_by: node
            .attr("blockedBy")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
    }
}

fn status_from_str(raw: &str) -> Option<codegraph_core::TaskStatus> {
    use codegraph_core::TaskStatus::*;
    match raw {
        "pending" => Some(Pending),
        "in-progress" => Some(InProgress),
        "blocked" => Some(Blocked),
        "completed" => Some(Completed),
        _ => None,
    }
}

fn status_str(status: codegraph_core::TaskStatus) -> &'static str {
    use codegraph_core::TaskStatus::*;
    match status {
        Pending => "pending",
        InProgress => "in-progress",
        Blocked => "blocked",
        Completed => "completed",
    }
}

/// Applies a state-machine transition on a `TASK` node (§4.7). Rejects any
/// transition not named in `TaskStatus::can_transition_to`.
pub async fn task_update(
    session: &WorkspaceSession,
    task_id: &str,
    status: &str,
    notes: Option<&str>,
) -> Result<TaskSummary> {
    let id = ScopedId::new(&session.project_id, "TASK", task_id);
    let existing = session
        .index
        .current_node(&id)
        .ok_or_else(|| CodeGraphError::ValidationFailed(format!("no such task: {task_id}")))?;

    let current = existing
        .attr_str("status")
        .and_then(status_from_str)
        .ok_or_else(|| CodeGraphError::Internal(format!("task {task_id} has unrecognized status")))?;
    let next = status_from_str(status).ok_or_else(|| CodeGraphError::ValidationFailed(format!("unknown status: {status}")))?;

    if !current.can_transition_to(next) {
        return Err(CodeGraphError::ValidationFailed(format!(
            "cannot transition task {task_id} from {} to {status}",
            status_str(current)
        )));
    }

    let mut attributes = existing.attributes.clone();
    attributes["status"] = json!(status_str(next));
    if let Some(notes) = notes {
        attributes["notes"] = json!(notes);
    }

    let supersede = GraphStatement::SupersedeNode { id: id.clone(), at: Utc::now() };
    let replacement = Node::new(id, NodeKind::Task, session.project_id.clone(), attributes);
    let statements = vec![supersede, GraphStatement::UpsertNode(replacement.clone())];
    session.store.write_batch(statements.clone()).await?;
    session.index.apply(&statements);

    Ok(task_summary(&replacement))
}

pub fn progress_query(session: &WorkspaceSession, status: &str) -> Vec<TaskSummary> {
    session
        .index
        .nodes_by_kind(NodeKind::Task)
        .into_iter()
        .filter(|n| status == "all" || n.attr_str("status") == Some(status))
        .map(|n| task_summary(&n))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStatusReport {
    pub feature_id: String,
    pub status: String,
    pub tasks: Vec<TaskSummary>,
}

pub fn feature_status(session: &WorkspaceSession, feature_id: &str) -> Result<FeatureStatusReport> {
    let id = ScopedId::new(&session.project_id, "FEATURE", feature_id);
    let feature = session
        .index
        .current_node(&id)
        .ok_or_else(|| CodeGraphError::ValidationFailed(format!("no such feature: {feature_id}")))?;

    let tasks = session
        .index
        .nodes_by_kind(NodeKind::Task)
        .into_iter()
        .filter(|n| n.attr_str("featureId") == Some(feature_id))
        .map(|n| task_summary(&n))
        .collect();

    Ok(FeatureStatusReport {
        feature_id: feature_id.to_string(),
        status: feature.attr_str("status").unwrap_or_default().to_string(),
        tasks,
    })
}

/// Returns `TASK`/`FEATURE` nodes with `status==blocked`, grouped by scope
/// (§4.7). Scope is the owning feature id where known, or `"unscoped"`;
/// `scope` narrows the grouping to a single key when provided.
pub fn blocking_issues(session: &WorkspaceSession, scope: Option<&str>) -> HashMap<String, Vec<TaskSummary>> {
    let mut grouped: HashMap<String, Vec<TaskSummary>> = HashMap::new();

    let mut blocked: Vec<Node> = session
        .index
        .nodes_by_kind(NodeKind::Task)
        .into_iter()
        .filter(|n| n.attr_str("status") == Some("blocked"))
        .collect();
    blocked.extend(
        session
            .index
            .nodes_by_kind(NodeKind::Feature)
            .into_iter()
            .filter(|n| n.attr_str("status") == Some("blocked")),
    );

    for node in blocked {
        let group = node.attr_str("featureId").unwrap_or("unscoped").to_string();
        if let Some(scope) = scope {
            if group != scope {
                continue;
            }
        }
        grouped.entry(group).or_default().push(task_summary(&node));
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::WorkspaceConfig;
    use codegraph_graph::{GraphIndex, Rebuilder, SurrealGraphStore, SurrealStoreConfig};
    use codegraph_parser::ParserRegistry;
    use std::sync::Arc;

    async fn test_session() -> Arc<WorkspaceSession> {
        let dir = tempfile::tempdir().unwrap();
        let store = SurrealGraphStore::connect(SurrealStoreConfig::default()).await.unwrap();
        Arc::new(WorkspaceSession {
            workspace_root: dir.path().to_path_buf(),
            source_dir: dir.path().to_path_buf(),
            project_id: "ab12".to_string(),
            config: WorkspaceConfig::default(),
            store: Arc::new(store),
            index: Arc::new(GraphIndex::new()),
            parser_registry: Arc::new(ParserRegistry::with_default_parsers()),
            rebuilder: Arc::new(Rebuilder::new()),
            vector: Arc::new(crate::vector_ops::VectorSubsystem::new(&WorkspaceConfig::default()).unwrap()),
        })
    }

    #[tokio::test]
    async fn second_claim_on_same_target_is_rejected() {
        let session = test_session().await;
        let first = claim(&session, "src/x.ts", "file", "edit", "agent-1").await.unwrap();
        let second = claim(&session, "src/x.ts", "file", "edit", "agent-2").await;
        assert!(matches!(second, Err(CodeGraphError::AlreadyClaimed(_))));

        release(&session, &first.claim_id).await.unwrap();
        let retry = claim(&session, "src/x.ts", "file", "edit", "agent-2").await;
        assert!(retry.is_ok());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let session = test_session().await;
        let claimed = claim(&session, "src/y.ts", "file", "edit", "agent-1").await.unwrap();
        release(&session, &claimed.claim_id).await.unwrap();
        release(&session, &claimed.claim_id).await.unwrap();
    }

    #[tokio::test]
    async fn decision_without_rationale_is_rejected() {
        let session = test_session().await;
        let rejected = episode_add(&session, "DECISION", "use store X", None, "agent-1", None).await;
        assert!(matches!(rejected, Err(CodeGraphError::ValidationFailed(_))));

        let accepted = episode_add(&session, "DECISION", "use store X", Some("supports cypher"), "agent-1", None)
            .await
            .unwrap();
        let found = decision_query(&session, "store", 10);
        assert!(found.iter().any(|e| e.episode_id == accepted.episode_id));
    }

    #[tokio::test]
    async fn task_transitions_follow_the_state_machine() {
        let session = test_session().await;
        let id = ScopedId::new(&session.project_id, "TASK", "t1");
        let node = Node::new(id, NodeKind::Task, session.project_id.clone(), json!({"status": "pending"}));
        let statements = vec![GraphStatement::UpsertNode(node)];
        session.store.write_batch(statements.clone()).await.unwrap();
        session.index.apply(&statements);

        let updated = task_update(&session, "t1", "in-progress", None).await.unwrap();
        assert_eq!(updated.status, "in-progress");

        let to_blocked = task_update(&session, "t1", "blocked", Some("waiting on review")).await.unwrap();
        assert_eq!(to_blocked.status, "blocked");

        let rejected = task_update(&session, "t1", "completed", None).await;
        assert!(rejected.is_err());
    }
}
