use std::collections::HashMap;

use codegraph_core::{EdgeKind, NodeKind, Result, ScopedId};
use codegraph_vector::{personalized_pagerank, reciprocal_rank_fusion, Bm25Index};
use serde::Serialize;

use crate::session::WorkspaceSession;

const PPR_DAMPING: f64 = 0.85;
const PPR_ITERATIONS: usize = 20;

fn node_kinds_for(kind: &str) -> &'static [NodeKind] {
    match kind {
        "function" => &[NodeKind::Function],
        "class" => &[NodeKind::Class],
        "section" => &[NodeKind::Section],
        "file" => &[NodeKind::File],
        _ => &[NodeKind::Function, NodeKind::Class, NodeKind::File, NodeKind::Section],
    }
}

fn node_text(node: &codegraph_core::Node) -> String {
    let name = node.attr_str("name").unwrap_or_default();
    let path = node.attr_str("path").or_else(|| node.attr_str("filePath")).unwrap_or_default();
    let heading = node.attr_str("heading").unwrap_or_default();
    format!("{name} {path} {heading}")
}

fn build_corpus(session: &WorkspaceSession, kind: &str) -> Vec<(ScopedId, String)> {
    node_kinds_for(kind)
        .iter()
        .flat_map(|k| session.index.nodes_by_kind(*k))
        .map(|n| (n.id.clone(), node_text(&n)))
        .collect()
}

/// Nodes whose name appears verbatim (case-insensitive) in the query text —
/// the PPR seed set when the query names concrete symbols (§4.6.3).
fn resolve_query_mentions(session: &WorkspaceSession, query: &str) -> Vec<ScopedId> {
    let lower = query.to_lowercase();
    [NodeKind::Function, NodeKind::Class, NodeKind::File]
        .into_iter()
        .flat_map(|k| session.index.nodes_by_kind(k))
        .filter(|n| {
            n.attr_str("name")
                .map(|name| !name.is_empty() && lower.contains(&name.to_lowercase()))
                .unwrap_or(false)
        })
        .map(|n| n.id)
        .take(5)
        .collect()
}

const PPR_EDGE_KINDS: &[EdgeKind] = &[EdgeKind::Contains, EdgeKind::References, EdgeKind::Calls, EdgeKind::Describes];

fn build_adjacency(session: &WorkspaceSession, universe: &[ScopedId]) -> HashMap<ScopedId, Vec<ScopedId>> {
    let mut adjacency = HashMap::new();
    for id in universe {
        let mut outs = Vec::new();
        for kind in PPR_EDGE_KINDS {
            outs.extend(session.index.out_neighbors(*kind, id));
        }
        if !outs.is_empty() {
            adjacency.insert(id.clone(), outs);
        }
    }
    adjacency
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridResult {
    pub hits: Vec<ScopedId>,
    pub rankers_used: Vec<String>,
}

/// Fuses vector similarity, BM25, and personalized PageRank via Reciprocal
/// Rank Fusion (§4.6.3). Any unavailable sub-ranker is skipped rather than
/// failing the call; `rankers_used` records what actually contributed so
/// callers can surface it in the response `hint`.
pub async fn retrieve(session: &WorkspaceSession, query: &str, kind: &str, limit: usize) -> Result<HybridResult> {
    let mut rankings: Vec<Vec<ScopedId>> = Vec::new();
    let mut rankers_used = Vec::new();

    let fan_out = limit.max(1) * 3;

    let vector_ids = match session.vector.find_similar(query, kind, fan_out, &session.project_id, &session.index).await {
        Ok((hits, _fallback_used)) if !hits.is_empty() => {
            let ids: Vec<ScopedId> = hits.into_iter().map(|h| h.id).collect();
            rankers_used.push("vector".to_string());
            ids
        }
        _ => Vec::new(),
    };
    if !vector_ids.is_empty() {
        rankings.push(vector_ids.clone());
    }

    let corpus = build_corpus(session, kind);
    let bm25 = Bm25Index::build(&corpus);
    let bm25_ids: Vec<ScopedId> = bm25.search(query, fan_out).into_iter().map(|(id, _)| id).collect();
    if !bm25_ids.is_empty() {
        rankers_used.push("bm25".to_string());
        rankings.push(bm25_ids);
    }

    let mut seeds = resolve_query_mentions(session, query);
    if seeds.is_empty() {
        seeds = vector_ids.iter().take(3).cloned().collect();
    }
    if !seeds.is_empty() {
        let universe: Vec<ScopedId> = corpus.iter().map(|(id, _)| id.clone()).chain(seeds.iter().cloned()).collect();
        let adjacency = build_adjacency(session, &universe);
        let scores = personalized_pagerank(&seeds, &adjacency, PPR_DAMPING, PPR_ITERATIONS);
        let mut ppr_ids: Vec<(ScopedId, f64)> = scores.into_iter().collect();
        ppr_ids.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let ppr_ids: Vec<ScopedId> = ppr_ids.into_iter().map(|(id, _)| id).take(fan_out).collect();
        if !ppr_ids.is_empty() {
            rankers_used.push("ppr".to_string());
            rankings.push(ppr_ids);
        }
    }

    let fused = reciprocal_rank_fusion(&rankings, limit);
    Ok(HybridResult { hits: fused.into_iter().map(|(id, _)| id).collect(), rankers_used })
}
