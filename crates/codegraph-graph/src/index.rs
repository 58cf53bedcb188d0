use codegraph_core::{Edge, EdgeKind, GraphStatement, Node, ScopedId};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct IndexInner {
    /// Every version of every node, oldest first. Bi-temporal history
    /// (§3.4, §3.5) is retained here, not just the current version: a
    /// `SupersedeNode` mutates the last entry in place (it was current when
    /// superseded) and the following `UpsertNode` for the same ID appends a
    /// new entry rather than overwriting it.
    nodes: HashMap<ScopedId, Vec<Node>>,
    /// `(edgeKind, from) -> [to]`, current edges only.
    out_edges: HashMap<(EdgeKind, ScopedId), Vec<ScopedId>>,
    /// `(edgeKind, to) -> [from]`, current edges only.
    in_edges: HashMap<(EdgeKind, ScopedId), Vec<ScopedId>>,
}

/// Authoritative in-memory mirror of the graph (§4.4 design note "In-memory
/// index"). Exclusive writer is the rebuild worker; readers take a shared
/// lock so a query never observes a torn update — writes replace the whole
/// snapshot's affected maps under one exclusive guard per flush.
#[derive(Default)]
pub struct GraphIndex {
    inner: RwLock<IndexInner>,
}

impl GraphIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrors a committed batch of statements. Called after `write_batch`
    /// succeeds against the durable store, never before (§4.4: "flushed to
    /// the store at phase boundaries").
    pub fn apply(&self, statements: &[GraphStatement]) {
        let mut inner = self.inner.write();
        for statement in statements {
            match statement {
                GraphStatement::UpsertNode(node) => {
                    inner.nodes.entry(node.id.clone()).or_default().push(node.clone());
                }
                GraphStatement::SupersedeNode { id, at } => {
                    if let Some(versions) = inner.nodes.get_mut(id) {
                        if let Some(current) = versions.iter_mut().rev().find(|n| n.is_current()) {
                            current.supersede(*at);
                        }
                    }
                }
                GraphStatement::UpsertEdge(edge) => {
                    insert_edge(&mut inner, edge);
                }
            }
        }
    }

    /// The current version of `id`, if any. Pre-supersede bug: `UpsertNode`
    /// now appends rather than overwrites, so this always returns the last
    /// (and only current) version, never a row a prior `SupersedeNode` just
    /// closed out.
    pub fn node(&self, id: &ScopedId) -> Option<Node> {
        self.current_node(id)
    }

    pub fn current_node(&self, id: &ScopedId) -> Option<Node> {
        self.inner
            .read()
            .nodes
            .get(id)
            .and_then(|versions| versions.iter().rev().find(|n| n.is_current()))
            .cloned()
    }

    pub fn nodes_by_kind(&self, kind: codegraph_core::NodeKind) -> Vec<Node> {
        self.inner
            .read()
            .nodes
            .values()
            .filter_map(|versions| versions.iter().rev().find(|n| n.is_current()))
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }

    pub fn out_neighbors(&self, kind: EdgeKind, from: &ScopedId) -> Vec<ScopedId> {
        self.inner
            .read()
            .out_edges
            .get(&(kind, from.clone()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn in_neighbors(&self, kind: EdgeKind, to: &ScopedId) -> Vec<ScopedId> {
        self.inner
            .read()
            .in_edges
            .get(&(kind, to.clone()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.inner
            .read()
            .nodes
            .values()
            .filter(|versions| versions.iter().rev().any(|n| n.is_current()))
            .count()
    }

    /// Every version of every node, current or superseded. Used by
    /// `diffSince` (§4.6.2), which needs to see superseded versions to
    /// report what changed since an anchor timestamp.
    pub fn all_nodes(&self) -> Vec<Node> {
        self.inner.read().nodes.values().flatten().cloned().collect()
    }

    pub fn contains_current(&self, id: &ScopedId) -> bool {
        self.current_node(id).is_some()
    }
}

fn insert_edge(inner: &mut IndexInner, edge: &Edge) {
    let out_key = (edge.kind, edge.from.clone());
    let out_list = inner.out_edges.entry(out_key).or_default();
    if !out_list.contains(&edge.to) {
        out_list.push(edge.to.clone());
    }
    let in_key = (edge.kind, edge.to.clone());
    let in_list = inner.in_edges.entry(in_key).or_default();
    if !in_list.contains(&edge.from) {
        in_list.push(edge.from.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::NodeKind;
    use serde_json::json;

    #[test]
    fn applies_nodes_and_edges_and_tracks_adjacency() {
        let index = GraphIndex::new();
        let file = Node::new(ScopedId::new("ab12", "FILE", "a.ts"), NodeKind::File, "ab12", json!({}));
        let func = Node::new(ScopedId::new("ab12", "FUNCTION", "a.ts:foo:1"), NodeKind::Function, "ab12", json!({}));
        let edge = Edge::new(EdgeKind::Contains, file.id.clone(), func.id.clone(), "ab12");

        index.apply(&[
            GraphStatement::UpsertNode(file.clone()),
            GraphStatement::UpsertNode(func.clone()),
            GraphStatement::UpsertEdge(edge),
        ]);

        assert_eq!(index.node_count(), 2);
        let children = index.out_neighbors(EdgeKind::Contains, &file.id);
        assert_eq!(children, vec![func.id.clone()]);
        let parents = index.in_neighbors(EdgeKind::Contains, &func.id);
        assert_eq!(parents, vec![file.id]);
    }

    #[test]
    fn supersede_marks_node_not_current() {
        let index = GraphIndex::new();
        let node = Node::new(ScopedId::new("ab12", "FILE", "a.ts"), NodeKind::File, "ab12", json!({}));
        index.apply(&[GraphStatement::UpsertNode(node.clone())]);
        index.apply(&[GraphStatement::SupersedeNode {
            id: node.id.clone(),
            at: chrono::Utc::now(),
        }]);
        assert!(!index.contains_current(&node.id));
    }

    #[test]
    fn modified_file_retains_superseded_version_in_history() {
        let index = GraphIndex::new();
        let id = ScopedId::new("ab12", "FILE", "a.ts");
        let v1 = Node::new(id.clone(), NodeKind::File, "ab12", json!({"contentHash": "h1"}));

        index.apply(&[GraphStatement::UpsertNode(v1.clone())]);

        // Same sequence `ingest.rs` emits for a `Modified` file: supersede
        // the current version, then upsert the replacement, in one batch.
        let at = chrono::Utc::now();
        let v2 = Node::new(id.clone(), NodeKind::File, "ab12", json!({"contentHash": "h2"}));
        index.apply(&[
            GraphStatement::SupersedeNode { id: id.clone(), at },
            GraphStatement::UpsertNode(v2.clone()),
        ]);

        // Exactly one current version, and it's the replacement.
        let current = index.current_node(&id).expect("current version present");
        assert_eq!(current.attr_str("contentHash"), Some("h2"));

        // The superseded version must still be retrievable, not overwritten.
        let all: Vec<Node> = index.all_nodes().into_iter().filter(|n| n.id == id).collect();
        assert_eq!(all.len(), 2, "both versions of the id must be retained");
        let superseded = all.iter().find(|n| !n.is_current()).expect("superseded version retained");
        assert_eq!(superseded.attr_str("contentHash"), Some("h1"));
        assert!(superseded.valid_to.is_some());

        // Still counted once as current, not twice.
        assert_eq!(index.node_count(), 1);
    }
}
