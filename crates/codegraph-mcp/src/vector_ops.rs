use std::collections::{HashMap, HashSet};

use codegraph_core::{Node, RebuildMode, Result, ScopedId, WorkspaceConfig};
use codegraph_graph::{GraphIndex, IngestOutcome};
use codegraph_vector::{filter_ghost_points, TieredEmbedder, VectorPoint, VectorStoreClient};
use dashmap::DashMap;
use serde_json::json;
use tracing::warn;

fn collection_for(kind: &str) -> &'static str {
    match kind.to_ascii_lowercase().as_str() {
        "function" => "functions",
        "class" => "classes",
        "section" => "sections",
        _ => "files",
    }
}

/// Every collection a workspace may populate (§4.5: `functions`, `classes`,
/// `files`, plus `sections` when documentation indexing is enabled).
const ALL_COLLECTIONS: &[&str] = &["functions", "classes", "files", "sections"];

fn embedding_text(node: &Node) -> String {
    let name = node.attr_str("name").unwrap_or_default();
    let path = node
        .attr_str("path")
        .or_else(|| node.attr_str("filePath"))
        .unwrap_or_default();
    let heading = node.attr_str("heading").unwrap_or_default();
    format!("{} {} {} {}", node.kind.as_str(), name, heading, path)
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Greedy k-means over cosine similarity: seeds `k` centroids from evenly
/// spaced vectors (deterministic, no RNG), assigns every vector to its
/// nearest centroid, recomputes centroids as the mean of their members, and
/// repeats until assignments stop changing or a small iteration cap is hit.
/// Returns one cluster index per input vector.
fn kmeans_assign(vectors: &[Vec<f32>], k: usize) -> Vec<usize> {
    let n = vectors.len();
    if k == 0 || n == 0 {
        return vec![0; n];
    }
    let dim = vectors[0].len();
    let mut centroids: Vec<Vec<f32>> = (0..k).map(|i| vectors[i * n / k].clone()).collect();
    let mut assignments = vec![0usize; n];

    for _ in 0..10 {
        let mut changed = false;
        for (i, v) in vectors.iter().enumerate() {
            let mut best = 0usize;
            let mut best_score = f32::MIN;
            for (ci, centroid) in centroids.iter().enumerate() {
                let score = cosine(v, centroid);
                if score > best_score {
                    best_score = score;
                    best = ci;
                }
            }
            if assignments[i] != best {
                changed = true;
            }
            assignments[i] = best;
        }
        if !changed {
            break;
        }

        let mut sums = vec![vec![0f32; dim]; k];
        let mut counts = vec![0usize; k];
        for (i, v) in vectors.iter().enumerate() {
            let cluster = assignments[i];
            counts[cluster] += 1;
            for (sum, x) in sums[cluster].iter_mut().zip(v) {
                *sum += x;
            }
        }
        for (cluster, count) in counts.into_iter().enumerate() {
            if count > 0 {
                for sum in sums[cluster].iter_mut() {
                    *sum /= count as f32;
                }
                centroids[cluster] = std::mem::take(&mut sums[cluster]);
            }
        }
    }

    assignments
}

#[derive(Debug, Clone)]
pub struct SimilarityHit {
    pub id: ScopedId,
    pub score: f32,
}

/// Embedding generation, storage, and search orchestration (§4.5). The math
/// (cosine fallback aside) and the Qdrant-REST client live in
/// `codegraph-vector`; this type is the part of C5 that needs `GraphIndex`
/// to resolve ghost points and compute eligible-node coverage, which is why
/// it lives alongside the query layer instead of in the lower crate.
pub struct VectorSubsystem {
    embedder: TieredEmbedder,
    store: VectorStoreClient,
    dimension: usize,
    vectors: DashMap<ScopedId, Vec<f32>>,
}

impl VectorSubsystem {
    pub fn new(config: &WorkspaceConfig) -> Result<Self> {
        let embedder = match &config.embeddings.summarizer_url {
            Some(url) => TieredEmbedder::with_remote(config.vector_dim, url)?,
            None => TieredEmbedder::local_only(config.vector_dim),
        };
        let store = VectorStoreClient::new(&config.vector_store_url)?;
        Ok(Self { embedder, store, dimension: config.vector_dim, vectors: DashMap::new() })
    }

    /// Fraction of current, embeddable nodes (`function`/`class`/`file`/`section`)
    /// that have an in-memory vector. Zero coverage is the readiness gate's
    /// signal to degrade to lexical-only retrieval (§4.9).
    pub fn coverage(&self, index: &GraphIndex) -> f64 {
        let eligible = index.nodes_by_kind(codegraph_core::NodeKind::Function).len()
            + index.nodes_by_kind(codegraph_core::NodeKind::Class).len()
            + index.nodes_by_kind(codegraph_core::NodeKind::File).len()
            + index.nodes_by_kind(codegraph_core::NodeKind::Section).len();
        if eligible == 0 {
            return 0.0;
        }
        (self.vectors.len() as f64 / eligible as f64).min(1.0)
    }

    /// Consumes a rebuild's embedding/purge queues (§4.3 phase 7). A `Full`
    /// rebuild purges every point this project owns, in every collection,
    /// before anything is upserted (§4.5 "before upsert of a project's
    /// fresh batch, the pipeline deletes all points with `payload.projectId
    /// == current`") — this is what sweeps ghost points left behind by a
    /// prior run's different point-ID hash, a `source_dir` change, or a file
    /// deleted outside the diff window. An `Incremental` rebuild purges only
    /// `outcome.purge_queue` (the ids actually removed/superseded this
    /// rebuild). Either way, stale points are purged before the embed/upsert
    /// loop runs. Per-point store failures are logged and skipped rather
    /// than failing the refresh, the same failure policy the ingestion
    /// pipeline applies to per-file errors.
    pub async fn refresh(&self, outcome: &IngestOutcome, index: &GraphIndex, project_id: &str, mode: RebuildMode) -> Result<()> {
        if mode == RebuildMode::Full {
            for collection in ALL_COLLECTIONS {
                if let Err(e) = self.store.purge_project(collection, project_id).await {
                    warn!(error = %e, collection, "failed to purge project before full rebuild upsert");
                }
            }
            self.vectors.retain(|id, _| id.project_id() != project_id);
        }

        if !outcome.purge_queue.is_empty() {
            let mut by_collection: HashMap<&'static str, Vec<ScopedId>> = HashMap::new();
            for id in &outcome.purge_queue {
                by_collection.entry(collection_for(id.kind())).or_default().push(id.clone());
            }
            for (collection, ids) in by_collection {
                for id in &ids {
                    self.vectors.remove(id);
                }
                if let Err(e) = self.store.delete_points(collection, &ids).await {
                    warn!(error = %e, collection, "failed to purge vector points");
                }
            }
        }

        let mut ensured: HashSet<&'static str> = HashSet::new();
        for id in &outcome.embedding_queue {
            let Some(node) = index.current_node(id) else { continue };
            let text = embedding_text(&node);
            let vector = self.embedder.embed(&text).await?;
            let collection = collection_for(id.kind());
            if ensured.insert(collection) {
                self.store.ensure_collection(collection, self.dimension).await?;
            }
            let payload = json!({"projectId": project_id, "kind": id.kind()});
            if let Err(e) = self
                .store
                .upsert_points(collection, vec![VectorPoint { id: id.clone(), vector: vector.clone(), payload }])
                .await
            {
                warn!(error = %e, %id, "failed to upsert vector point");
            }
            self.vectors.insert(id.clone(), vector);
        }
        Ok(())
    }

    /// Embeds `query_text` and searches `kind`'s collection, filtered to
    /// `project_id`, with ghost-point filtering and in-process cosine
    /// fallback (§4.5 search contract). Returns the hits plus whether the
    /// fallback path was used, so callers can record it in the response hint.
    pub async fn find_similar(
        &self,
        query_text: &str,
        kind: &str,
        limit: usize,
        project_id: &str,
        index: &GraphIndex,
    ) -> Result<(Vec<SimilarityHit>, bool)> {
        let query_vector = self.embedder.embed(query_text).await?;
        let collection = collection_for(kind);
        let filter = json!({"must": [{"key": "projectId", "match": {"value": project_id}}]});

        match self.store.search(collection, &query_vector, limit * 3, Some(filter)).await {
            Ok(points) => {
                let filtered = filter_ghost_points(points, |id| index.contains_current(id));
                if !filtered.is_empty() {
                    let hits = filtered
                        .into_iter()
                        .filter_map(|p| p.original_id().map(|id| SimilarityHit { id, score: p.score }))
                        .take(limit)
                        .collect();
                    return Ok((hits, false));
                }
                Ok((self.in_process_search(&query_vector, kind, project_id, limit, index), true))
            }
            Err(_) => Ok((self.in_process_search(&query_vector, kind, project_id, limit, index), true)),
        }
    }

    /// Embeds arbitrary text through the tiered embedder without touching
    /// the store; used by hybrid retrieval to get a query vector for PPR
    /// seeding and by `semantic_diff`.
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text).await
    }

    pub fn vector_for(&self, id: &ScopedId) -> Option<Vec<f32>> {
        self.vectors.get(id).map(|v| v.clone())
    }

    /// A node's cached vector, or a freshly embedded one if the rebuild that
    /// would have queued it hasn't caught up yet. Never writes the result
    /// back to the store or the cache — callers that need it persisted go
    /// through `refresh`.
    async fn embed_node(&self, node: &Node) -> Result<Vec<f32>> {
        if let Some(existing) = self.vectors.get(&node.id) {
            return Ok(existing.clone());
        }
        self.embedder.embed(&embedding_text(node)).await
    }

    /// Groups `nodes` into up to `k` clusters by cosine similarity over
    /// their embeddings (§4.6.3 `codeClusters`) — the same vector space
    /// hybrid retrieval searches, bucketed with greedy k-means instead of
    /// ranked against a query. Always returns exactly `k` groups (possibly
    /// empty ones, if `k` exceeds `nodes.len()`).
    pub async fn cluster_nodes(&self, nodes: &[Node], k: usize) -> Result<Vec<Vec<ScopedId>>> {
        let requested = k.max(1);
        if nodes.is_empty() {
            return Ok(vec![Vec::new(); requested]);
        }
        let mut vectors = Vec::with_capacity(nodes.len());
        for node in nodes {
            vectors.push(self.embed_node(node).await?);
        }
        let effective_k = requested.min(nodes.len());
        let assignments = kmeans_assign(&vectors, effective_k);
        let mut clusters: Vec<Vec<ScopedId>> = vec![Vec::new(); requested];
        for (node, cluster) in nodes.iter().zip(assignments) {
            clusters[cluster].push(node.id.clone());
        }
        Ok(clusters)
    }

    fn in_process_search(
        &self,
        query_vector: &[f32],
        kind: &str,
        project_id: &str,
        limit: usize,
        index: &GraphIndex,
    ) -> Vec<SimilarityHit> {
        let mut scored: Vec<SimilarityHit> = self
            .vectors
            .iter()
            .filter(|entry| {
                entry.key().kind().eq_ignore_ascii_case(kind)
                    && entry.key().project_id() == project_id
                    && index.contains_current(entry.key())
            })
            .map(|entry| SimilarityHit { id: entry.key().clone(), score: cosine(query_vector, entry.value()) })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kmeans_groups_near_vectors_together() {
        let vectors = vec![
            vec![1.0, 0.0],
            vec![0.9, 0.1],
            vec![0.0, 1.0],
            vec![0.1, 0.9],
        ];
        let assignments = kmeans_assign(&vectors, 2);
        assert_eq!(assignments[0], assignments[1], "near-identical vectors must land in the same cluster");
        assert_eq!(assignments[2], assignments[3], "near-identical vectors must land in the same cluster");
        assert_ne!(assignments[0], assignments[2], "orthogonal vectors must land in different clusters");
    }

    #[test]
    fn kmeans_assign_is_a_noop_for_k_ge_n() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let assignments = kmeans_assign(&vectors, 5);
        assert_eq!(assignments.len(), 2);
    }
}
