use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use codegraph_core::{CodeGraphError, RebuildMode};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::coordination;
use crate::envelope::{Envelope, FieldPriority, Profile, ToolSchema};
use crate::readiness::check_readiness;
use crate::retrieval::{graph_ops, hybrid, intent, Intent};
use crate::session::{SessionManager, SessionToken, WorkspaceSession};

fn default_limit() -> usize {
    10
}

fn default_depth() -> usize {
    3
}

fn default_profile() -> Option<String> {
    None
}

const HEALTH_SCHEMA: ToolSchema = &[
    ("projectId", FieldPriority::Required),
    ("workspaceRoot", FieldPriority::High),
    ("graphNodeCounts", FieldPriority::Medium),
    ("embeddingCoverage", FieldPriority::High),
    ("pendingFileChanges", FieldPriority::Medium),
    ("lastRebuildAt", FieldPriority::Low),
    ("pendingRebuildId", FieldPriority::Low),
];

const RESULTS_SCHEMA: ToolSchema = &[
    ("intent", FieldPriority::High),
    ("results", FieldPriority::Required),
    ("count", FieldPriority::Medium),
];

/// Bundles a domain `Result` into the uniform envelope, whatever the
/// outcome — tool calls never surface a transport-level error for a
/// well-formed domain failure; the envelope's `errorCode` carries it
/// instead (§4.6.5, §6.1).
fn respond<T: serde::Serialize>(
    profile: Profile,
    summary: &str,
    schema: ToolSchema,
    result: codegraph_core::Result<T>,
) -> Result<CallToolResult, McpError> {
    let envelope = match result {
        Ok(data) => Envelope::success(profile, summary, serde_json::to_value(data).unwrap_or(Value::Null), schema),
        Err(e) => Envelope::error(profile, &e),
    };
    let body = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());
    Ok(CallToolResult::success(vec![Content::text(body)]))
}

fn respond_with_hint<T: serde::Serialize>(
    profile: Profile,
    summary: &str,
    schema: ToolSchema,
    result: codegraph_core::Result<T>,
    hint: Option<String>,
) -> Result<CallToolResult, McpError> {
    match result {
        Ok(data) => {
            let envelope =
                Envelope::success_with_hint(profile, summary, serde_json::to_value(data).unwrap_or(Value::Null), schema, hint);
            Ok(CallToolResult::success(vec![Content::text(
                serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string()),
            )]))
        }
        Err(e) => respond::<()>(profile, summary, schema, Err(e)),
    }
}

fn profile_of(raw: &Option<String>) -> Profile {
    Profile::parse(raw.as_deref())
}

async fn session_for(manager: &SessionManager, token: &str) -> codegraph_core::Result<Arc<WorkspaceSession>> {
    manager.get(&SessionToken(token.to_string()))
}

#[derive(Debug, Deserialize, JsonSchema)]
struct BindWorkspaceRequest {
    workspace_root: String,
    #[serde(default)]
    source_dir: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SessionOnlyRequest {
    session_token: String,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RebuildGraphRequest {
    session_token: String,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct QueryRequest {
    session_token: String,
    text: String,
    #[serde(default)]
    stale_ok: bool,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExplainRequest {
    session_token: String,
    target: String,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FilesRequest {
    session_token: String,
    files: Vec<String>,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FindPatternRequest {
    session_token: String,
    pattern: String,
    #[serde(rename = "type")]
    pattern_type: String,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ArchSuggestRequest {
    session_token: String,
    name: String,
    #[serde(rename = "type")]
    element_type: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ArchValidateRequest {
    session_token: String,
    #[serde(default)]
    files: Option<Vec<String>>,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SemanticSearchRequest {
    session_token: String,
    query: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FindSimilarCodeRequest {
    session_token: String,
    element_id: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CodeClustersRequest {
    session_token: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default = "default_k")]
    k: usize,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SemanticDiffRequest {
    session_token: String,
    a: String,
    b: String,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SuggestTestsRequest {
    session_token: String,
    file: String,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchDocsRequest {
    session_token: String,
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ContextPackRequest {
    session_token: String,
    task: String,
    #[serde(default = "default_token_budget")]
    token_budget: usize,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

fn default_token_budget() -> usize {
    1200
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DiffSinceRequest {
    session_token: String,
    anchor: String,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AgentClaimRequest {
    session_token: String,
    target_id: String,
    claim_type: String,
    intent: String,
    actor: String,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AgentReleaseRequest {
    session_token: String,
    claim_id: String,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EpisodeAddRequest {
    session_token: String,
    #[serde(rename = "type")]
    episode_type: String,
    content: String,
    #[serde(default)]
    rationale: Option<String>,
    actor: String,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EpisodeRecallRequest {
    session_token: String,
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DecisionQueryRequest {
    session_token: String,
    topic: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ProgressQueryRequest {
    session_token: String,
    #[serde(default = "default_status")]
    status: String,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

fn default_status() -> String {
    "all".to_string()
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TaskUpdateRequest {
    session_token: String,
    task_id: String,
    status: String,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FeatureStatusRequest {
    session_token: String,
    feature_id: String,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct BlockingIssuesRequest {
    session_token: String,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default = "default_profile")]
    profile: Option<String>,
}

/// The full §6.2 tool surface over one `SessionManager`. Holds no other
/// state: every operation reaches into the bound `WorkspaceSession` via its
/// token.
#[derive(Clone)]
pub struct CodeGraphServer {
    sessions: Arc<SessionManager>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CodeGraphServer {
    pub fn new() -> Self {
        Self { sessions: Arc::new(SessionManager::new()), tool_router: Self::tool_router() }
    }

    #[tool(description = "Bind a session to a workspace root, resolving its source directory and project id. Must be called before any other tool.")]
    async fn bind_workspace(&self, params: Parameters<BindWorkspaceRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = Profile::Compact;
        let result = self
            .sessions
            .bind_workspace(PathBuf::from(req.workspace_root), req.source_dir, req.project_id)
            .await
            .map(|(token, session)| {
                json!({
                    "sessionToken": token.as_str(),
                    "projectId": session.project_id,
                    "sourceDir": session.source_dir.to_string_lossy(),
                })
            });
        respond(profile, "workspace bound", &[("sessionToken", FieldPriority::Required)], result)
    }

    #[tool(description = "Queue a graph rebuild (incremental by default, or full) for a bound session.")]
    async fn rebuild_graph(&self, params: Parameters<RebuildGraphRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = Profile::Compact;
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            let mode = match req.mode.as_deref() {
                Some("full") => RebuildMode::Full,
                _ => RebuildMode::Incremental,
            };
            let handle = session.request_rebuild(mode)?;
            Ok::<_, CodeGraphError>(json!({"status": "QUEUED", "rebuildId": handle.rebuild_id.to_string()}))
        }
        .await;
        respond(profile, "rebuild queued", &[("rebuildId", FieldPriority::Required)], result)
    }

    #[tool(description = "Report session health: node counts, embedding coverage, pending file changes, last rebuild time.")]
    async fn health(&self, params: Parameters<SessionOnlyRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            Ok::<_, CodeGraphError>(session.health())
        }
        .await;
        respond(profile, "workspace health", HEALTH_SCHEMA, result)
    }

    #[tool(description = "Run a natural-language or Cypher query against the graph. Routes to structure/dependency/test-impact/progress templates or hybrid semantic retrieval.")]
    async fn query(&self, params: Parameters<QueryRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            check_readiness(&session, true, req.stale_ok)?;
            let classified = intent::classify(&req.text);
            let data = match classified {
                Intent::Cypher => {
                    let rows = session.store.execute_cypher(&req.text, Value::Null).await?;
                    json!({"intent": "cypher", "results": rows})
                }
                Intent::Semantic => {
                    let hybrid_result = hybrid::retrieve(&session, &req.text, "function", 10).await?;
                    json!({"intent": "semantic", "results": hybrid_result.hits, "rankersUsed": hybrid_result.rankers_used})
                }
                other => json!({"intent": other.as_str(), "results": Value::Null, "hint": "use a dedicated tool for this intent"}),
            };
            Ok::<_, CodeGraphError>(data)
        }
        .await;
        respond(profile, "query routed", RESULTS_SCHEMA, result)
    }

    #[tool(description = "Resolve a symbol or file name to its node, direct edges, and (for symbols) owning file neighborhood.")]
    async fn explain(&self, params: Parameters<ExplainRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            check_readiness(&session, false, false)?;
            graph_ops::explain(&session, &req.target)
        }
        .await;
        respond(profile, "explanation", &[], result)
    }

    #[tool(description = "Compute the forward closure of dependents over REFERENCES for a set of changed files, plus affected tests.")]
    async fn impact_analyze(&self, params: Parameters<FilesRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            check_readiness(&session, false, false)?;
            Ok::<_, CodeGraphError>(graph_ops::impact_analyze(&session, &req.files, default_depth()))
        }
        .await;
        respond(profile, "impact analysis", &[], result)
    }

    #[tool(description = "Select tests impacted by a set of changed files.")]
    async fn test_select(&self, params: Parameters<FilesRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            check_readiness(&session, false, false)?;
            Ok::<_, CodeGraphError>(graph_ops::test_select(&session, &req.files, default_depth()))
        }
        .await;
        respond(profile, "impacted tests", &[], result)
    }

    #[tool(description = "Find a structural pattern: circular (not implemented), unused, violation, or a name substring pattern.")]
    async fn find_pattern(&self, params: Parameters<FindPatternRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            check_readiness(&session, false, false)?;
            graph_ops::find_pattern(&session, &req.pattern, &req.pattern_type)
        }
        .await;
        respond(profile, "pattern search", &[], result)
    }

    #[tool(description = "Suggest a path and rationale for a proposed new element given its declared dependencies.")]
    async fn arch_suggest(&self, params: Parameters<ArchSuggestRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            Ok::<_, CodeGraphError>(graph_ops::arch_suggest(&session, &req.name, &req.element_type, &req.dependencies))
        }
        .await;
        respond(profile, "architecture suggestion", &[], result)
    }

    #[tool(description = "Re-run architecture validation over the given files (or the whole workspace) without persisting violations.")]
    async fn arch_validate(&self, params: Parameters<ArchValidateRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            check_readiness(&session, false, false)?;
            Ok::<_, CodeGraphError>(graph_ops::arch_validate(&session, req.files.as_deref()))
        }
        .await;
        respond(profile, "architecture validation", &[], result)
    }

    #[tool(description = "Hybrid (vector + BM25 + PPR) semantic search over a node kind's collection.")]
    async fn semantic_search(&self, params: Parameters<SemanticSearchRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let kind = req.kind.clone().unwrap_or_else(|| "function".to_string());
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            let readiness = check_readiness(&session, true, false)?;
            let hybrid_result = hybrid::retrieve(&session, &req.query, &kind, req.limit).await?;
            Ok::<_, CodeGraphError>((hybrid_result, readiness.hint))
        }
        .await;
        match result {
            Ok((hybrid_result, degrade_hint)) => {
                let hint = degrade_hint.or_else(|| Some(format!("rankers used: {}", hybrid_result.rankers_used.join(", "))));
                respond_with_hint(profile, "semantic search", RESULTS_SCHEMA, Ok(hybrid_result), hint)
            }
            Err(e) => respond::<()>(profile, "semantic search", RESULTS_SCHEMA, Err(e)),
        }
    }

    #[tool(description = "Find code elements similar to a given scoped element id via hybrid retrieval.")]
    async fn find_similar_code(&self, params: Parameters<FindSimilarCodeRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            check_readiness(&session, true, false)?;
            let id = codegraph_core::ScopedId::from(req.element_id.clone());
            let node = session
                .index
                .current_node(&id)
                .ok_or_else(|| CodeGraphError::ValidationFailed(format!("no such element: {}", req.element_id)))?;
            let query_text = node.attr_str("name").unwrap_or(&req.element_id).to_string();
            let kind_lower = id.kind().to_ascii_lowercase();
            hybrid::retrieve(&session, &query_text, &kind_lower, req.limit).await
        }
        .await;
        respond(profile, "similar code", RESULTS_SCHEMA, result)
    }

    #[tool(description = "Cluster nodes of a kind into k groups by embedding similarity (k-means over vector space).")]
    async fn code_clusters(&self, params: Parameters<CodeClustersRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            check_readiness(&session, true, false)?;
            let nodes = session.index.nodes_by_kind(match req.kind.as_str() {
                "function" => codegraph_core::NodeKind::Function,
                "class" => codegraph_core::NodeKind::Class,
                _ => codegraph_core::NodeKind::File,
            });
            let clusters = session.vector.cluster_nodes(&nodes, req.k).await?;
            let clusters: Vec<Vec<String>> = clusters
                .into_iter()
                .map(|cluster| cluster.into_iter().map(|id| id.as_str().to_string()).collect())
                .collect();
            Ok::<_, CodeGraphError>(json!({"clusters": clusters}))
        }
        .await;
        respond(profile, "code clusters", &[], result)
    }

    #[tool(description = "Compare two scoped elements semantically: shared/diverging neighbors and vector similarity.")]
    async fn semantic_diff(&self, params: Parameters<SemanticDiffRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            check_readiness(&session, true, false)?;
            let id_a = codegraph_core::ScopedId::from(req.a.clone());
            let id_b = codegraph_core::ScopedId::from(req.b.clone());
            let vec_a = session.vector.vector_for(&id_a);
            let vec_b = session.vector.vector_for(&id_b);
            let similarity = match (&vec_a, &vec_b) {
                (Some(a), Some(b)) => {
                    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
                }
                _ => 0.0,
            };
            Ok::<_, CodeGraphError>(json!({"a": req.a, "b": req.b, "similarity": similarity}))
        }
        .await;
        respond(profile, "semantic diff", &[], result)
    }

    #[tool(description = "Suggest existing tests relevant to a file via hybrid retrieval over TEST_CASE/TEST_SUITE nodes.")]
    async fn suggest_tests(&self, params: Parameters<SuggestTestsRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            check_readiness(&session, true, false)?;
            let tests = graph_ops::test_select(&session, &[req.file.clone()], default_depth());
            Ok::<_, CodeGraphError>(json!({"file": req.file, "suggestedTests": tests}))
        }
        .await;
        respond(profile, "suggested tests", &[], result)
    }

    #[tool(description = "Parse and index markdown documentation under the workspace into DOCUMENT/SECTION nodes.")]
    async fn index_docs(&self, params: Parameters<SessionOnlyRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            let handle = session.request_rebuild(RebuildMode::Incremental)?;
            Ok::<_, CodeGraphError>(json!({"status": "QUEUED", "rebuildId": handle.rebuild_id.to_string()}))
        }
        .await;
        respond(profile, "doc indexing queued", &[], result)
    }

    #[tool(description = "Hybrid search restricted to documentation SECTION nodes.")]
    async fn search_docs(&self, params: Parameters<SearchDocsRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            let readiness = check_readiness(&session, true, false)?;
            let hybrid_result = hybrid::retrieve(&session, &req.query, "section", req.limit).await?;
            Ok::<_, CodeGraphError>((hybrid_result, readiness.hint))
        }
        .await;
        match result {
            Ok((hybrid_result, hint)) => respond_with_hint(profile, "doc search", RESULTS_SCHEMA, Ok(hybrid_result), hint),
            Err(e) => respond::<()>(profile, "doc search", RESULTS_SCHEMA, Err(e)),
        }
    }

    #[tool(description = "Assemble a token-budgeted context pack for an agent about to work on a task: seed nodes, one-hop expansion, active claims, and relevant decisions/learnings.")]
    async fn context_pack(&self, params: Parameters<ContextPackRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = if req.token_budget <= 300 {
            Profile::Compact
        } else if req.token_budget >= 4000 {
            Profile::Debug
        } else {
            Profile::Balanced
        };
        let schema: ToolSchema = &[
            ("summary", FieldPriority::Required),
            ("entryPoint", FieldPriority::Required),
            ("coreSymbols", FieldPriority::Required),
            ("activeBlockers", FieldPriority::High),
            ("decisions", FieldPriority::Medium),
            ("learnings", FieldPriority::Medium),
            ("episodes", FieldPriority::Low),
            ("pprScores", FieldPriority::Low),
        ];
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            check_readiness(&session, true, false)?;

            let hybrid_result = hybrid::retrieve(&session, &req.task, "function", 10).await?;
            let mut expanded: Vec<codegraph_core::ScopedId> = hybrid_result.hits.clone();
            for seed in &hybrid_result.hits {
                expanded.extend(session.index.out_neighbors(codegraph_core::EdgeKind::Contains, seed));
                expanded.extend(session.index.out_neighbors(codegraph_core::EdgeKind::References, seed));
                expanded.extend(session.index.out_neighbors(codegraph_core::EdgeKind::Calls, seed));
                expanded.extend(session.index.out_neighbors(codegraph_core::EdgeKind::Describes, seed));
            }
            expanded.sort();
            expanded.dedup();

            let active_blockers: Vec<_> = expanded
                .iter()
                .filter_map(|id| {
                    let target = id.as_str();
                    let hit = session
                        .index
                        .nodes_by_kind(codegraph_core::NodeKind::Claim)
                        .into_iter()
                        .find(|n| n.attr_str("targetId") == Some(target) && n.attr_str("state") == Some("active"));
                    hit
                })
                .collect();

            let decisions = coordination::decision_query(&session, &req.task, 5);
            let learnings: Vec<_> = session
                .index
                .nodes_by_kind(codegraph_core::NodeKind::Episode)
                .into_iter()
                .filter(|n| n.attr_str("type") == Some("LEARNING"))
                .collect();

            Ok::<_, CodeGraphError>(json!({
                "summary": format!("context for: {}", req.task),
                "entryPoint": hybrid_result.hits.first(),
                "coreSymbols": hybrid_result.hits,
                "activeBlockers": active_blockers,
                "decisions": decisions,
                "learnings": learnings,
                "episodes": Vec::<Value>::new(),
                "pprScores": Value::Null,
            }))
        }
        .await;
        respond(profile, "context pack", schema, result)
    }

    #[tool(description = "Return nodes added/removed/modified since an RFC3339 anchor timestamp.")]
    async fn diff_since(&self, params: Parameters<DiffSinceRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            let anchor: DateTime<Utc> = DateTime::parse_from_rfc3339(&req.anchor)
                .map_err(|e| CodeGraphError::ValidationFailed(format!("invalid anchor: {e}")))?
                .with_timezone(&Utc);
            graph_ops::diff_since(&session, anchor).await
        }
        .await;
        respond(profile, "diff since anchor", &[], result)
    }

    #[tool(description = "Acquire an exclusive claim on a target (task/file/function/feature). Fails ALREADY_CLAIMED if one is active.")]
    async fn agent_claim(&self, params: Parameters<AgentClaimRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            coordination::claim(&session, &req.target_id, &req.claim_type, &req.intent, &req.actor).await
        }
        .await;
        respond(profile, "claim acquired", &[("claimId", FieldPriority::Required)], result)
    }

    #[tool(description = "Release a claim. Idempotent on an already-released claim.")]
    async fn agent_release(&self, params: Parameters<AgentReleaseRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            coordination::release(&session, &req.claim_id).await?;
            Ok::<_, CodeGraphError>(json!({"claimId": req.claim_id, "state": "released"}))
        }
        .await;
        respond(profile, "claim released", &[], result)
    }

    #[tool(description = "List all currently active claims with age.")]
    async fn coordination_overview(&self, params: Parameters<SessionOnlyRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            Ok::<_, CodeGraphError>(coordination::coordination_overview(&session))
        }
        .await;
        respond(profile, "coordination overview", &[], result)
    }

    #[tool(description = "Append an episode (DECISION/OBSERVATION/EDIT/LEARNING). DECISION requires a non-empty rationale.")]
    async fn episode_add(&self, params: Parameters<EpisodeAddRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            coordination::episode_add(&session, &req.episode_type, &req.content, req.rationale.as_deref(), &req.actor, req.metadata.clone())
                .await
        }
        .await;
        respond(profile, "episode added", &[], result)
    }

    #[tool(description = "Recall episodes by BM25+vector search over their content and rationale.")]
    async fn episode_recall(&self, params: Parameters<EpisodeRecallRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            Ok::<_, CodeGraphError>(coordination::episode_recall(&session, &req.query, req.limit))
        }
        .await;
        respond(profile, "episodes recalled", &[], result)
    }

    #[tool(description = "Search DECISION episodes by topic.")]
    async fn decision_query(&self, params: Parameters<DecisionQueryRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            Ok::<_, CodeGraphError>(coordination::decision_query(&session, &req.topic, req.limit))
        }
        .await;
        respond(profile, "decisions found", &[], result)
    }

    #[tool(description = "List TASK nodes filtered by status (all/pending/in-progress/blocked/completed).")]
    async fn progress_query(&self, params: Parameters<ProgressQueryRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            Ok::<_, CodeGraphError>(coordination::progress_query(&session, &req.status))
        }
        .await;
        respond(profile, "progress", &[], result)
    }

    #[tool(description = "Transition a task's status. Only pending->in-progress, in-progress->blocked|completed, blocked->in-progress are allowed.")]
    async fn task_update(&self, params: Parameters<TaskUpdateRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            coordination::task_update(&session, &req.task_id, &req.status, req.notes.as_deref()).await
        }
        .await;
        respond(profile, "task updated", &[], result)
    }

    #[tool(description = "Report a feature's status and the tasks under it.")]
    async fn feature_status(&self, params: Parameters<FeatureStatusRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            coordination::feature_status(&session, &req.feature_id)
        }
        .await;
        respond(profile, "feature status", &[], result)
    }

    #[tool(description = "List TASK/FEATURE nodes with status=blocked, grouped by scope.")]
    async fn blocking_issues(&self, params: Parameters<BlockingIssuesRequest>) -> Result<CallToolResult, McpError> {
        let req = params.0;
        let profile = profile_of(&req.profile);
        let result = async {
            let session = session_for(&self.sessions, &req.session_token).await?;
            Ok::<_, CodeGraphError>(coordination::blocking_issues(&session, req.scope.as_deref()))
        }
        .await;
        respond(profile, "blocking issues", &[], result)
    }
}

impl Default for CodeGraphServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for CodeGraphServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Code-intelligence server: binds a workspace, maintains a property graph and vector index over it, \
                 and answers structured retrieval, architecture, and multi-agent coordination queries. Every tool \
                 response is a uniform envelope carrying ok/profile/summary/data/_tokenEstimate and, on failure, an \
                 errorCode plus a hint. Call bind_workspace first."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().enable_logging().build(),
            ..Default::default()
        }
    }
}
