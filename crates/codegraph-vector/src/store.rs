use codegraph_core::{content_hash, CodeGraphError, Result, ScopedId};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Maps a scoped ID to the unsigned-int point ID the external vector store
/// requires, while keeping the original scoped ID recoverable via the
/// `originalId` payload field (§6.4) — the store's IDs are opaque u64s, not
/// round-trippable on their own.
pub fn point_id_for(scoped_id: &ScopedId) -> u64 {
    let digest = content_hash(scoped_id.as_str().as_bytes());
    u64::from_str_radix(&digest[0..16], 16).unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: ScopedId,
    pub vector: Vec<f32>,
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
    #[serde(default)]
    pub payload: Value,
}

impl ScoredPoint {
    /// Recovers the scoped ID this point represents, via the `originalId`
    /// payload field written at upsert time.
    pub fn original_id(&self) -> Option<ScopedId> {
        self.payload.get("originalId")?.as_str().map(ScopedId::from)
    }
}

#[derive(Debug, Serialize)]
struct UpsertBody {
    points: Vec<UpsertPoint>,
}

#[derive(Debug, Serialize)]
struct UpsertPoint {
    id: u64,
    vector: Vec<f32>,
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

/// Thin HTTP client over a Qdrant-compatible REST vector store (§4.5, §6.4):
/// collections, unsigned-int point IDs with a JSON payload, filtered search,
/// and payload-filter deletion. Built on `reqwest` rather than a gRPC
/// client crate since the only operations this system needs are the plain
/// REST ones already covered by the HTTP stack used elsewhere.
pub struct VectorStoreClient {
    client: Client,
    base_url: String,
}

impl VectorStoreClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| CodeGraphError::Configuration(e.to_string()))?;
        Ok(Self { client, base_url: base_url.into() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Creates the collection if absent; a pre-existing collection with the
    /// same name is not an error (idempotent, as every rebuild phase must be).
    pub async fn ensure_collection(&self, collection: &str, dimension: usize) -> Result<()> {
        let response = self
            .client
            .put(self.url(&format!("/collections/{collection}")))
            .json(&json!({"vectors": {"size": dimension, "distance": "Cosine"}}))
            .send()
            .await
            .map_err(store_unavailable)?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED | StatusCode::CONFLICT | StatusCode::BAD_REQUEST => Ok(()),
            status => Err(CodeGraphError::StoreUnavailable(format!("create collection: {status}"))),
        }
    }

    pub async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.client
            .delete(self.url(&format!("/collections/{collection}")))
            .send()
            .await
            .map_err(store_unavailable)?;
        Ok(())
    }

    pub async fn upsert_points(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let body = UpsertBody {
            points: points
                .into_iter()
                .map(|p| {
                    let mut payload = p.payload;
                    if let Value::Object(map) = &mut payload {
                        map.insert("originalId".to_string(), json!(p.id.as_str()));
                    }
                    UpsertPoint { id: point_id_for(&p.id), vector: p.vector, payload }
                })
                .collect(),
        };
        let response = self
            .client
            .put(self.url(&format!("/collections/{collection}/points?wait=true")))
            .json(&body)
            .send()
            .await
            .map_err(store_unavailable)?;

        response
            .error_for_status()
            .map_err(|e| CodeGraphError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    pub async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        limit: usize,
        filter: Option<Value>,
    ) -> Result<Vec<ScoredPoint>> {
        let mut body = json!({
            "vector": query_vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(filter) = filter {
            body["filter"] = filter;
        }

        let response = self
            .client
            .post(self.url(&format!("/collections/{collection}/points/search")))
            .json(&body)
            .send()
            .await
            .map_err(store_unavailable)?;

        let parsed: SearchResponse = response
            .error_for_status()
            .map_err(|e| CodeGraphError::StoreUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| CodeGraphError::Internal(format!("search response: {e}")))?;
        debug!(collection, hits = parsed.result.len(), "vector search completed");
        Ok(parsed.result)
    }

    /// Deletes every point whose payload matches `filter` — used both for
    /// the full-rebuild pre-upsert purge and scoped incremental purges
    /// (§9 open question 2).
    pub async fn delete_by_filter(&self, collection: &str, filter: Value) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/collections/{collection}/points/delete")))
            .json(&json!({"filter": filter}))
            .send()
            .await
            .map_err(store_unavailable)?;
        response
            .error_for_status()
            .map_err(|e| CodeGraphError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    pub async fn purge_project(&self, collection: &str, project_id: &str) -> Result<()> {
        self.delete_by_filter(
            collection,
            json!({"must": [{"key": "projectId", "match": {"value": project_id}}]}),
        )
        .await
    }

    pub async fn delete_points(&self, collection: &str, ids: &[ScopedId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let original_ids: Vec<&str> = ids.iter().map(ScopedId::as_str).collect();
        self.delete_by_filter(
            collection,
            json!({"must": [{"key": "originalId", "match": {"any": original_ids}}]}),
        )
        .await
    }
}

fn store_unavailable(e: reqwest::Error) -> CodeGraphError {
    CodeGraphError::StoreUnavailable(e.to_string())
}

/// Filters out points whose scoped ID no longer resolves to a current graph
/// node — stale vector entries that haven't been purged yet (§4.5 "ghost
/// point filtering").
pub fn filter_ghost_points(points: Vec<ScoredPoint>, is_current: impl Fn(&ScopedId) -> bool) -> Vec<ScoredPoint> {
    points
        .into_iter()
        .filter(|p| p.original_id().map(|id| is_current(&id)).unwrap_or(false))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_is_deterministic() {
        let id = ScopedId::new("ab12", "FUNCTION", "a.ts:foo:1");
        assert_eq!(point_id_for(&id), point_id_for(&id));
    }

    #[test]
    fn distinct_scoped_ids_rarely_collide() {
        let a = ScopedId::new("ab12", "FUNCTION", "a.ts:foo:1");
        let b = ScopedId::new("ab12", "FUNCTION", "a.ts:bar:2");
        assert_ne!(point_id_for(&a), point_id_for(&b));
    }

    #[test]
    fn ghost_points_are_filtered_out() {
        let present = ScopedId::new("ab12", "FUNCTION", "a.ts:foo:1");
        let removed = ScopedId::new("ab12", "FUNCTION", "a.ts:gone:2");
        let points = vec![
            ScoredPoint { id: 1, score: 0.9, payload: json!({"originalId": present.as_str()}) },
            ScoredPoint { id: 2, score: 0.8, payload: json!({"originalId": removed.as_str()}) },
        ];
        let filtered = filter_ghost_points(points, |id| id == &present);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, 1);
    }
}
