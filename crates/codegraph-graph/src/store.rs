use async_trait::async_trait;
use codegraph_core::{CodeGraphError, Edge, GraphStatement, GraphStore, Node, Result};
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::{debug, info, warn};

/// Exponential backoff schedule for transient store errors (§4.4): base
/// 200ms, factor 2, capped at 5s.
pub fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 200u64;
    let capped = base_ms.saturating_mul(1u64 << attempt.min(10));
    Duration::from_millis(capped.min(5_000))
}

const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct SurrealStoreConfig {
    pub connection: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for SurrealStoreConfig {
    fn default() -> Self {
        Self {
            connection: "mem://".to_string(),
            namespace: "codegraph".to_string(),
            database: "graph".to_string(),
            username: None,
            password: None,
        }
    }
}

/// SurrealDB-backed implementation of [`GraphStore`]. Owns an embedded or
/// remote `Surreal<Any>` handle; schema is intentionally loose (`FLEXIBLE`
/// objects for node/edge attributes) since the graph's attribute shape
/// varies by node kind (§3).
#[derive(Clone)]
pub struct SurrealGraphStore {
    db: Surreal<Any>,
}

enum ErrorClass {
    Transient,
    Constraint,
    Fatal,
}

fn classify(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    if lower.contains("unique") || lower.contains("already exists") || lower.contains("index") {
        ErrorClass::Constraint
    } else if lower.contains("connection")
        || lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("unavailable")
    {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}

impl SurrealGraphStore {
    pub async fn connect(config: SurrealStoreConfig) -> Result<Self> {
        info!(connection = %config.connection, "connecting to graph store");
        let db = Surreal::new::<Any>(&config.connection)
            .await
            .map_err(|e| CodeGraphError::StoreUnavailable(e.to_string()))?;

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            db.signin(Root { username, password })
                .await
                .map_err(|e| CodeGraphError::StoreUnavailable(e.to_string()))?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| CodeGraphError::StoreUnavailable(e.to_string()))?;

        let store = Self { db };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        let schema = r#"
            DEFINE TABLE IF NOT EXISTS nodes SCHEMALESS;
            DEFINE FIELD IF NOT EXISTS scoped_id ON TABLE nodes TYPE string;
            DEFINE FIELD IF NOT EXISTS kind ON TABLE nodes TYPE string;
            DEFINE FIELD IF NOT EXISTS project_id ON TABLE nodes TYPE string;
            DEFINE FIELD IF NOT EXISTS attributes ON TABLE nodes FLEXIBLE TYPE object;
            DEFINE FIELD IF NOT EXISTS valid_from ON TABLE nodes TYPE datetime;
            DEFINE FIELD IF NOT EXISTS valid_to ON TABLE nodes TYPE option<datetime>;
            DEFINE INDEX IF NOT EXISTS idx_nodes_scoped_id ON TABLE nodes COLUMNS scoped_id;
            DEFINE INDEX IF NOT EXISTS idx_nodes_kind ON TABLE nodes COLUMNS kind;
            DEFINE INDEX IF NOT EXISTS idx_nodes_project ON TABLE nodes COLUMNS project_id;

            DEFINE TABLE IF NOT EXISTS edges SCHEMALESS;
            DEFINE FIELD IF NOT EXISTS kind ON TABLE edges TYPE string;
            DEFINE FIELD IF NOT EXISTS from_id ON TABLE edges TYPE string;
            DEFINE FIELD IF NOT EXISTS to_id ON TABLE edges TYPE string;
            DEFINE FIELD IF NOT EXISTS project_id ON TABLE edges TYPE string;
            DEFINE FIELD IF NOT EXISTS attributes ON TABLE edges FLEXIBLE TYPE object;
            DEFINE INDEX IF NOT EXISTS idx_edges_from ON TABLE edges COLUMNS from_id;
            DEFINE INDEX IF NOT EXISTS idx_edges_to ON TABLE edges COLUMNS to_id;
            DEFINE INDEX IF NOT EXISTS idx_edges_kind ON TABLE edges COLUMNS kind;
        "#;
        self.db
            .query(schema)
            .await
            .map_err(|e| CodeGraphError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    fn edge_record_id(edge: &Edge) -> String {
        let seed = format!("{}:{}:{}", edge.kind.as_str(), edge.from, edge.to);
        codegraph_core::content_hash(seed.as_bytes())[..16].to_string()
    }

    /// A scoped ID identifies a logical node across its whole bi-temporal
    /// history, not one row — `valid_from` is folded into the record id so
    /// that superseding the current version and inserting its replacement
    /// addresses two distinct rows instead of one `UPSERT` clobbering the
    /// other (§3.4, §3.5). The scoped ID itself is carried as the `scoped_id`
    /// field for lookups and for `SupersedeNode` to find the live row.
    fn node_record_id(node: &Node) -> String {
        let seed = format!("{}@{}", node.id.as_str(), node.valid_from.to_rfc3339());
        codegraph_core::content_hash(seed.as_bytes())[..16].to_string()
    }

    fn node_content(node: &Node) -> JsonValue {
        json!({
            "scoped_id": node.id.as_str(),
            "kind": node.kind.as_str(),
            "project_id": node.project_id,
            "attributes": node.attributes,
            "valid_from": node.valid_from,
            "valid_to": node.valid_to,
        })
    }

    fn edge_content(edge: &Edge) -> JsonValue {
        json!({
            "kind": edge.kind.as_str(),
            "from_id": edge.from,
            "to_id": edge.to,
            "project_id": edge.project_id,
            "attributes": edge.attributes,
        })
    }

    async fn apply_batch(&self, statements: &[GraphStatement]) -> Result<()> {
        for (idx, statement) in statements.iter().enumerate() {
            match statement {
                GraphStatement::UpsertNode(node) => {
                    let content = Self::node_content(node);
                    let record = ("nodes", Self::node_record_id(node));
                    self.db
                        .upsert::<Option<JsonValue>>(record)
                        .content(content)
                        .await
                        .map_err(|e| store_error(idx, e.to_string()))?;
                }
                GraphStatement::SupersedeNode { id, at } => {
                    let query = "UPDATE nodes SET valid_to = $at WHERE scoped_id = $id AND valid_to IS NONE";
                    self.db
                        .query(query)
                        .bind(("id", id.as_str().to_string()))
                        .bind(("at", *at))
                        .await
                        .map_err(|e| store_error(idx, e.to_string()))?;
                }
                GraphStatement::UpsertEdge(edge) => {
                    let content = Self::edge_content(edge);
                    let record = ("edges", Self::edge_record_id(edge));
                    self.db
                        .upsert::<Option<JsonValue>>(record)
                        .content(content)
                        .await
                        .map_err(|e| store_error(idx, e.to_string()))?;
                }
            }
        }
        Ok(())
    }
}

fn store_error(idx: usize, message: String) -> CodeGraphError {
    match classify(&message) {
        ErrorClass::Constraint => CodeGraphError::ConstraintViolation(format!(
            "statement {idx}: {message}"
        )),
        ErrorClass::Transient => CodeGraphError::StoreUnavailable(format!(
            "statement {idx}: {message}"
        )),
        ErrorClass::Fatal => CodeGraphError::Internal(format!("statement {idx}: {message}")),
    }
}

#[async_trait]
impl GraphStore for SurrealGraphStore {
    /// Ordered, all-or-nothing: a failed statement aborts the remaining
    /// batch. `STORE_UNAVAILABLE` (transient) is retried with exponential
    /// backoff; `CONSTRAINT_VIOLATION` and internal errors are not retried.
    async fn write_batch(&self, statements: Vec<GraphStatement>) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            match self.apply_batch(&statements).await {
                Ok(()) => return Ok(()),
                Err(CodeGraphError::StoreUnavailable(msg)) if attempt + 1 < MAX_ATTEMPTS => {
                    warn!(attempt = attempt + 1, %msg, "transient graph store error, retrying");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn execute_cypher(&self, query: &str, params: JsonValue) -> Result<Vec<JsonValue>> {
        debug!(query, "executing graph query");
        let mut response = self.db.query(query);
        if let JsonValue::Object(map) = params {
            for (key, value) in map {
                response = response.bind((key, value));
            }
        }
        let mut response = response
            .await
            .map_err(|e| CodeGraphError::Internal(e.to_string()))?;
        let rows: Vec<JsonValue> = response
            .take(0)
            .map_err(|e| CodeGraphError::Internal(e.to_string()))?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::{NodeKind, ScopedId};
    use serde_json::json;

    async fn memory_store() -> SurrealGraphStore {
        SurrealGraphStore::connect(SurrealStoreConfig::default())
            .await
            .expect("in-memory store connects")
    }

    #[tokio::test]
    async fn upserts_and_supersedes_a_node() {
        let store = memory_store().await;
        let id = ScopedId::new("ab12", "FILE", "src/main.ts");
        let node = Node::new(id.clone(), NodeKind::File, "ab12", json!({"path": "src/main.ts"}));
        store
            .write_batch(vec![GraphStatement::UpsertNode(node)])
            .await
            .unwrap();

        let rows = store
            .execute_cypher("SELECT * FROM nodes WHERE kind = $kind", json!({"kind": "file"}))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        store
            .write_batch(vec![GraphStatement::SupersedeNode {
                id,
                at: chrono::Utc::now(),
            }])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn modified_file_keeps_both_versions_as_distinct_rows() {
        let store = memory_store().await;
        let id = ScopedId::new("ab12", "FILE", "src/main.ts");
        let v1 = Node::new(id.clone(), NodeKind::File, "ab12", json!({"contentHash": "h1"}));
        store.write_batch(vec![GraphStatement::UpsertNode(v1)]).await.unwrap();

        // Same single-batch sequence the ingestion pipeline emits for a
        // `Modified` file: supersede the current row, then upsert the
        // replacement, committed together.
        let v2 = Node::new(id.clone(), NodeKind::File, "ab12", json!({"contentHash": "h2"}));
        store
            .write_batch(vec![
                GraphStatement::SupersedeNode { id: id.clone(), at: chrono::Utc::now() },
                GraphStatement::UpsertNode(v2),
            ])
            .await
            .unwrap();

        let rows = store
            .execute_cypher(
                "SELECT scoped_id, valid_to, attributes FROM nodes WHERE scoped_id = $id",
                json!({"id": id.as_str()}),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 2, "both the superseded and replacement row must survive");
        let current_count = rows.iter().filter(|r| r.get("valid_to").map(JsonValue::is_null).unwrap_or(false)).count();
        assert_eq!(current_count, 1, "exactly one row must still be current");
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(200));
        assert_eq!(backoff_delay(1), Duration::from_millis(400));
        assert_eq!(backoff_delay(4), Duration::from_millis(3_200));
        assert_eq!(backoff_delay(20), Duration::from_millis(5_000));
    }
}
