use codegraph_core::{content_hash, NodeKind};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::index::GraphIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct FileChange {
    pub relative_path: String,
    pub absolute_path: Option<PathBuf>,
    pub kind: ChangeKind,
    pub content_hash: Option<String>,
}

/// Phase 2: classify every discovered file plus every `FILE` node already in
/// the index against the new content hash (§4.3). Unchanged files do no
/// further work downstream.
pub fn classify_changes(
    index: &GraphIndex,
    project_id: &str,
    discovered: &[(String, PathBuf, Vec<u8>)],
) -> Vec<FileChange> {
    let mut existing: HashMap<String, String> = HashMap::new();
    for node in index.nodes_by_kind(NodeKind::File) {
        if node.project_id != project_id {
            continue;
        }
        if let Some(path) = node.attr_str("path") {
            if let Some(hash) = node.attr_str("contentHash") {
                existing.insert(path.to_string(), hash.to_string());
            }
        }
    }

    let mut changes = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (relative_path, absolute_path, bytes) in discovered {
        seen.insert(relative_path.clone());
        let hash = content_hash(bytes);
        let kind = match existing.get(relative_path) {
            None => ChangeKind::Added,
            Some(prior) if prior != &hash => ChangeKind::Modified,
            Some(_) => ChangeKind::Unchanged,
        };
        changes.push(FileChange {
            relative_path: relative_path.clone(),
            absolute_path: Some(absolute_path.clone()),
            kind,
            content_hash: Some(hash),
        });
    }

    for (relative_path, _) in existing.iter() {
        if !seen.contains(relative_path) {
            changes.push(FileChange {
                relative_path: relative_path.clone(),
                absolute_path: None,
                kind: ChangeKind::Removed,
                content_hash: None,
            });
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::{GraphStatement, Node, ScopedId};
    use serde_json::json;

    fn file_node(project: &str, path: &str, hash: &str) -> Node {
        Node::new(
            ScopedId::new(project, "FILE", path),
            NodeKind::File,
            project,
            json!({"path": path, "contentHash": hash}),
        )
    }

    #[test]
    fn classifies_added_modified_unchanged_and_removed() {
        let index = GraphIndex::new();
        let h_a = content_hash(b"a-old");
        index.apply(&[GraphStatement::UpsertNode(file_node("ab12", "a.ts", &h_a))]);
        index.apply(&[GraphStatement::UpsertNode(file_node("ab12", "c.ts", "deadbeef"))]);

        let discovered = vec![
            ("a.ts".to_string(), PathBuf::from("/ws/a.ts"), b"a-new".to_vec()),
            ("b.ts".to_string(), PathBuf::from("/ws/b.ts"), b"b-content".to_vec()),
        ];
        let changes = classify_changes(&index, "ab12", &discovered);

        let a = changes.iter().find(|c| c.relative_path == "a.ts").unwrap();
        assert_eq!(a.kind, ChangeKind::Modified);
        let b = changes.iter().find(|c| c.relative_path == "b.ts").unwrap();
        assert_eq!(b.kind, ChangeKind::Added);
        let c = changes.iter().find(|c| c.relative_path == "c.ts").unwrap();
        assert_eq!(c.kind, ChangeKind::Removed);
    }
}
