use crate::ids::ScopedId;
use crate::node::{Edge, Node};
use crate::Result;
use async_trait::async_trait;

/// A single write against the graph store: an upsert or a supersede. Batches
/// of these are committed together by `GraphStore::write_batch` (§4.4).
#[derive(Debug, Clone)]
pub enum GraphStatement {
    UpsertNode(Node),
    SupersedeNode { id: ScopedId, at: chrono::DateTime<chrono::Utc> },
    UpsertEdge(Edge),
}

/// Adapter to the embedded, Cypher-capable graph store (out of scope to
/// implement internally; this trait is the seam). §4.4, §6.4.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Ordered, all-or-nothing. A failed statement aborts the whole batch.
    async fn write_batch(&self, statements: Vec<GraphStatement>) -> Result<()>;

    /// Read-through query against the store's native query language.
    async fn execute_cypher(&self, query: &str, params: serde_json::Value) -> Result<Vec<serde_json::Value>>;
}
