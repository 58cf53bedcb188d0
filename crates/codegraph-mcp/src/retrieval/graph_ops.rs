use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use codegraph_core::{ArchitectureConfig, CodeGraphError, EdgeKind, Node, NodeKind, Result, ScopedId};
use codegraph_graph::ArchitectureValidator;
use serde::Serialize;
use serde_json::Value;

use crate::session::WorkspaceSession;

fn edges_by_kind(session: &WorkspaceSession, id: &ScopedId, kinds: &[EdgeKind], outgoing: bool) -> Vec<(EdgeKind, ScopedId)> {
    kinds
        .iter()
        .flat_map(|kind| {
            let neighbors = if outgoing {
                session.index.out_neighbors(*kind, id)
            } else {
                session.index.in_neighbors(*kind, id)
            };
            neighbors.into_iter().map(move |n| (*kind, n))
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainResult {
    pub node: Node,
    pub incoming: Vec<(String, ScopedId)>,
    pub outgoing: Vec<(String, ScopedId)>,
    pub owning_file: Option<Node>,
    pub same_file_neighbors: Vec<Node>,
}

fn resolve_best_match(session: &WorkspaceSession, query: &str) -> Option<Node> {
    let candidates: Vec<Node> = [NodeKind::Function, NodeKind::Class, NodeKind::File]
        .into_iter()
        .flat_map(|kind| session.index.nodes_by_kind(kind))
        .collect();

    if let Some(exact) = candidates.iter().find(|n| n.attr_str("name") == Some(query) || n.attr_str("path") == Some(query)) {
        return Some(exact.clone());
    }
    let lower = query.to_lowercase();
    if let Some(ci) = candidates.iter().find(|n| {
        n.attr_str("name").map(str::to_lowercase).as_deref() == Some(lower.as_str())
            || n.attr_str("path").map(str::to_lowercase).as_deref() == Some(lower.as_str())
    }) {
        return Some(ci.clone());
    }
    let basename = query.rsplit('/').next().unwrap_or(query);
    candidates
        .into_iter()
        .find(|n| {
            let candidate_basename = n
                .attr_str("path")
                .map(|p| p.rsplit('/').next().unwrap_or(p))
                .or_else(|| n.attr_str("name"));
            candidate_basename == Some(basename)
        })
}

/// Resolves `symbol_or_file` to its best-matching current node and returns
/// its neighborhood (§4.6.2 `explain`).
pub fn explain(session: &WorkspaceSession, symbol_or_file: &str) -> Result<ExplainResult> {
    let node = resolve_best_match(session, symbol_or_file)
        .ok_or_else(|| CodeGraphError::ValidationFailed(format!("no node matches {symbol_or_file}")))?;

    let kinds = [
        EdgeKind::Contains,
        EdgeKind::References,
        EdgeKind::Calls,
        EdgeKind::Extends,
        EdgeKind::Implements,
        EdgeKind::Tests,
        EdgeKind::Describes,
    ];
    let incoming = edges_by_kind(session, &node.id, &kinds, false)
        .into_iter()
        .map(|(k, id)| (k.as_str().to_string(), id))
        .collect();
    let outgoing = edges_by_kind(session, &node.id, &kinds, true)
        .into_iter()
        .map(|(k, id)| (k.as_str().to_string(), id))
        .collect();

    let (owning_file, same_file_neighbors) = if matches!(node.kind, NodeKind::Function | NodeKind::Class) {
        let owner = session
            .index
            .in_neighbors(EdgeKind::Contains, &node.id)
            .into_iter()
            .find_map(|id| session.index.current_node(&id).filter(|n| n.kind == NodeKind::File));
        let neighbors = owner
            .as_ref()
            .map(|file| {
                session
                    .index
                    .out_neighbors(EdgeKind::Contains, &file.id)
                    .into_iter()
                    .filter(|id| id != &node.id)
                    .filter_map(|id| session.index.current_node(&id))
                    .collect()
            })
            .unwrap_or_default();
        (owner, neighbors)
    } else {
        (None, Vec::new())
    };

    Ok(ExplainResult { node, incoming, outgoing, owning_file, same_file_neighbors })
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactResult {
    pub direct_dependents: Vec<ScopedId>,
    pub transitive_dependents: Vec<ScopedId>,
    pub affected_tests: Vec<ScopedId>,
}

fn file_id_for_path(session: &WorkspaceSession, path: &str) -> Option<ScopedId> {
    session
        .index
        .nodes_by_kind(NodeKind::File)
        .into_iter()
        .find(|n| n.attr_str("path") == Some(path))
        .map(|n| n.id)
}

/// Forward closure of dependents over `REFERENCES`, up to `max_depth`
/// (default 3), plus the tests that exercise anything in the affected set
/// (§4.6.2 `impactAnalyze`).
pub fn impact_analyze(session: &WorkspaceSession, files_changed: &[String], max_depth: usize) -> ImpactResult {
    let seeds: Vec<ScopedId> = files_changed.iter().filter_map(|p| file_id_for_path(session, p)).collect();
    if seeds.is_empty() {
        return ImpactResult::default();
    }

    let mut visited: HashSet<ScopedId> = seeds.iter().cloned().collect();
    let mut direct: Vec<ScopedId> = Vec::new();
    let mut transitive: Vec<ScopedId> = Vec::new();
    let mut frontier: VecDeque<(ScopedId, usize)> = seeds.iter().map(|s| (s.clone(), 0)).collect();

    while let Some((id, depth)) = frontier.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for dependent in session.index.in_neighbors(EdgeKind::References, &id) {
            if visited.insert(dependent.clone()) {
                if depth == 0 {
                    direct.push(dependent.clone());
                } else {
                    transitive.push(dependent.clone());
                }
                frontier.push_back((dependent, depth + 1));
            }
        }
    }

    let mut affected_set = seeds.clone();
    affected_set.extend(direct.iter().cloned());
    affected_set.extend(transitive.iter().cloned());
    let mut affected_tests: Vec<ScopedId> = Vec::new();
    let mut seen_tests = HashSet::new();
    for target in &affected_set {
        for test in session.index.in_neighbors(EdgeKind::Tests, target) {
            if seen_tests.insert(test.clone()) {
                affected_tests.push(test);
            }
        }
    }

    ImpactResult { direct_dependents: direct, transitive_dependents: transitive, affected_tests }
}

/// `impactAnalyze` intersected with `TEST_*` nodes (§4.6.2 `testSelect`):
/// the same affected-tests computation, returned on its own.
pub fn test_select(session: &WorkspaceSession, files_changed: &[String], max_depth: usize) -> Vec<ScopedId> {
    impact_analyze(session, files_changed, max_depth).affected_tests
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum PatternResult {
    Unused { nodes: Vec<ScopedId> },
    Violation { nodes: Vec<Node> },
    NameMatch { nodes: Vec<ScopedId> },
}

/// `findPattern(pattern, type)` (§4.6.2). `circular` is explicitly out of
/// scope for this pass; it returns `NOT_IMPLEMENTED` rather than a
/// half-correct cycle detector.
pub fn find_pattern(session: &WorkspaceSession, pattern: &str, pattern_type: &str) -> Result<PatternResult> {
    match pattern_type {
        "circular" => Err(CodeGraphError::NotImplemented("circular dependency detection".into())),
        "unused" => {
            let candidates: Vec<Node> = [NodeKind::Function, NodeKind::Class, NodeKind::File]
                .into_iter()
                .flat_map(|kind| session.index.nodes_by_kind(kind))
                .collect();
            let unused = candidates
                .into_iter()
                .filter(|n| {
                    session.index.in_neighbors(EdgeKind::References, &n.id).is_empty()
                        && session.index.in_neighbors(EdgeKind::Calls, &n.id).is_empty()
                        && session.index.in_neighbors(EdgeKind::Tests, &n.id).is_empty()
                })
                .map(|n| n.id)
                .collect();
            Ok(PatternResult::Unused { nodes: unused })
        }
        "violation" => Ok(PatternResult::Violation { nodes: session.index.nodes_by_kind(NodeKind::Violation) }),
        "pattern" => {
            let needle = pattern.to_lowercase();
            let matches = [NodeKind::Function, NodeKind::Class, NodeKind::File]
                .into_iter()
                .flat_map(|kind| session.index.nodes_by_kind(kind))
                .filter(|n| {
                    n.attr_str("name").map(str::to_lowercase).unwrap_or_default().contains(&needle)
                        || n.attr_str("path").map(str::to_lowercase).unwrap_or_default().contains(&needle)
                })
                .map(|n| n.id)
                .collect();
            Ok(PatternResult::NameMatch { nodes: matches })
        }
        other => Err(CodeGraphError::ValidationFailed(format!("unknown pattern type: {other}"))),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchSuggestion {
    pub path: String,
    pub rationale: String,
}

/// Matches a proposed element's declared dependencies against the
/// workspace's layer rules and suggests a path plus rationale (§4.6.2
/// `archSuggest`). Historical similar names are surfaced via a plain
/// substring match over existing nodes of the same declared type.
pub fn arch_suggest(session: &WorkspaceSession, name: &str, element_type: &str, dependencies: &[String]) -> Vec<ArchSuggestion> {
    let config = &session.config.architecture;
    let mut suggestions = Vec::new();

    for layer in &config.layers {
        let violates = config.rules.iter().any(|rule| {
            rule.from == layer.name
                && dependencies.iter().any(|dep| {
                    config
                        .layers
                        .iter()
                        .any(|other| other.name == rule.to && other.sources.iter().any(|s| dep.starts_with(s.trim_end_matches("/**").trim_end_matches("/*"))))
                })
        });
        if violates {
            continue;
        }
        if let Some(source) = layer.sources.first() {
            let suggested_dir = source.trim_end_matches("/**").trim_end_matches("/*");
            suggestions.push(ArchSuggestion {
                path: format!("{suggested_dir}/{name}"),
                rationale: format!("layer '{}' permits the declared dependencies", layer.name),
            });
        }
    }

    let similar: Vec<Node> = [NodeKind::Function, NodeKind::Class]
        .into_iter()
        .flat_map(|kind| session.index.nodes_by_kind(kind))
        .filter(|n| n.attr_str("name").map(str::to_lowercase).unwrap_or_default().contains(&name.to_lowercase()))
        .collect();
    for node in similar.into_iter().take(3) {
        if let Some(path) = node.attr_str("filePath").or_else(|| node.attr_str("path")) {
            suggestions.push(ArchSuggestion {
                path: path.to_string(),
                rationale: format!("similarly named existing {element_type} lives here"),
            });
        }
    }

    suggestions
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchValidationResult {
    pub violations: Vec<Node>,
}

/// Re-runs architecture validation in `scope` without persisting (§4.6.2
/// `archValidate`) — the ingestion pipeline's own rebuild phase is the one
/// place these violations are actually written.
pub fn arch_validate(session: &WorkspaceSession, scope: Option<&[String]>) -> ArchValidationResult {
    let config: &ArchitectureConfig = &session.config.architecture;
    let statements = ArchitectureValidator::evaluate(&session.index, &session.project_id, config, scope);
    let violations = statements
        .into_iter()
        .filter_map(|s| match s {
            codegraph_core::GraphStatement::UpsertNode(n) if n.kind == NodeKind::Violation => Some(n),
            _ => None,
        })
        .collect();
    ArchValidationResult { violations }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub added: Vec<ScopedId>,
    pub removed: Vec<ScopedId>,
    pub modified: Vec<ScopedId>,
}

/// Returns `{added, removed, modified}` since `anchor` (§4.6.2
/// `diffSince`). The in-memory index only mirrors the latest version per
/// ID, so this reaches through to the store's bi-temporal history directly.
pub async fn diff_since(session: &WorkspaceSession, anchor: DateTime<Utc>) -> Result<DiffResult> {
    let rows = session
        .store
        .execute_cypher(
            "SELECT scoped_id AS id, kind, valid_from, valid_to FROM nodes WHERE project_id = $project_id AND (valid_from > $anchor OR (valid_to IS NOT NONE AND valid_to > $anchor))",
            serde_json::json!({"project_id": session.project_id, "anchor": anchor.to_rfc3339()}),
        )
        .await?;

    let mut currently_changed: HashSet<ScopedId> = HashSet::new();
    let mut superseded: HashSet<ScopedId> = HashSet::new();

    for row in &rows {
        let Some(id) = row.get("id").and_then(Value::as_str).map(ScopedId::from) else { continue };
        let is_current = row.get("valid_to").map(Value::is_null).unwrap_or(true);
        let valid_from_after_anchor = row
            .get("valid_from")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc) > anchor)
            .unwrap_or(false);

        if is_current && valid_from_after_anchor {
            currently_changed.insert(id);
        } else if !is_current {
            superseded.insert(id);
        }
    }

    let mut added = Vec::new();
    let mut modified = Vec::new();
    for id in &currently_changed {
        if superseded.contains(id) {
            modified.push(id.clone());
        } else {
            added.push(id.clone());
        }
    }
    let removed: Vec<ScopedId> = superseded.into_iter().filter(|id| !currently_changed.contains(id)).collect();

    Ok(DiffResult { added, removed, modified })
}
