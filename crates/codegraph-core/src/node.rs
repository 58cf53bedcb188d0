use crate::ids::ScopedId;
use crate::types::NodeKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A node in the property graph. `attributes` holds the kind-specific fields
/// from spec §3.2 (`path`, `name`, `startLine`, ...) as a JSON object so the
/// store adapter can write heterogeneous kinds through one code path; typed
/// accessors live on the per-kind builder modules in `codegraph-graph`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: ScopedId,
    pub kind: NodeKind,
    pub project_id: String,
    pub attributes: Value,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
}

impl Node {
    pub fn new(id: ScopedId, kind: NodeKind, project_id: impl Into<String>, attributes: Value) -> Self {
        Self {
            id,
            kind,
            project_id: project_id.into(),
            attributes,
            valid_from: Utc::now(),
            valid_to: None,
        }
    }

    pub fn is_current(&self) -> bool {
        self.valid_to.is_none()
    }

    /// Mark this version as superseded. Used by the ingestion pipeline
    /// before inserting a replacement version of the same scoped ID.
    pub fn supersede(&mut self, at: DateTime<Utc>) {
        self.valid_to = Some(at);
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(Value::as_str)
    }
}

/// A directed edge. `projectId` is carried per invariant so a single store
/// can host multiple workspaces without cross-contamination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub kind: crate::types::EdgeKind,
    pub from: ScopedId,
    pub to: ScopedId,
    pub project_id: String,
    pub attributes: Value,
}

impl Edge {
    pub fn new(
        kind: crate::types::EdgeKind,
        from: ScopedId,
        to: ScopedId,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            from,
            to,
            project_id: project_id.into(),
            attributes: Value::Object(Default::default()),
        }
    }

    pub fn with_attributes(mut self, attributes: Value) -> Self {
        self.attributes = attributes;
        self
    }
}
