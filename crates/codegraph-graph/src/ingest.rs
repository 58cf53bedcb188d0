use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use codegraph_core::{
    Edge, EdgeKind, GraphStatement, GraphStore, Node, NodeKind, RebuildMode, Result, ScopedId,
    WorkspaceConfig,
};
use codegraph_parser::{parse_markdown, ParserRegistry};
use serde_json::json;

use crate::architecture::ArchitectureValidator;
use crate::diff::{classify_changes, ChangeKind};
use crate::discovery::discover_source_files;
use crate::index::GraphIndex;

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct IngestOutcome {
    pub files_processed: usize,
    pub files_changed: usize,
    pub nodes_created: usize,
    pub relationships_created: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Scoped IDs whose embeddings must be (re)computed, consumed by the
    /// vector subsystem's refresh job (§4.3 phase 7).
    pub embedding_queue: Vec<ScopedId>,
    /// Scoped IDs removed from the graph this rebuild; their vector points
    /// must be purged (§9 open question 2).
    pub purge_queue: Vec<ScopedId>,
}

/// Drives the seven strictly-sequential phases of a rebuild (§4.3) for one
/// workspace. Holds no rebuild-lifecycle state itself — that is
/// [`crate::rebuild::Rebuilder`]'s job; this type is re-entrant and stateless
/// across calls to `run`.
pub struct IngestionPipeline {
    pub workspace_root: PathBuf,
    pub source_dir: PathBuf,
    pub project_id: String,
    pub store: Arc<dyn GraphStore>,
    pub index: Arc<GraphIndex>,
    pub parser_registry: Arc<ParserRegistry>,
    pub config: WorkspaceConfig,
}

impl IngestionPipeline {
    pub async fn run(&self, mode: RebuildMode) -> Result<IngestOutcome> {
        let mut outcome = IngestOutcome::default();

        // Phase 1: discovery.
        let discovered_paths = discover_source_files(&self.workspace_root, &self.source_dir);
        let mut discovered = Vec::with_capacity(discovered_paths.len());
        for path in &discovered_paths {
            match std::fs::read(path) {
                Ok(bytes) => {
                    let rel = codegraph_core::canonical_relative_path(&self.workspace_root, path);
                    discovered.push((rel, path.clone(), bytes));
                }
                Err(e) => {
                    outcome.errors.push(format!("{}: {e}", path.display()));
                }
            }
        }

        // Phase 2: diff.
        let changes = classify_changes(&self.index, &self.project_id, &discovered);
        outcome.files_processed = changes.len();
        outcome.files_changed = changes
            .iter()
            .filter(|c| c.kind != ChangeKind::Unchanged)
            .count();

        if mode == RebuildMode::Incremental && outcome.files_changed == 0 {
            return Ok(outcome);
        }

        let mut statements = Vec::new();
        let now = Utc::now();

        // Phase 3 + 4: parse changed files, write FILE + child nodes.
        for change in &changes {
            match change.kind {
                ChangeKind::Unchanged => continue,
                ChangeKind::Removed => {
                    self.supersede_removed(&change.relative_path, now, &mut statements, &mut outcome);
                    continue;
                }
                ChangeKind::Added | ChangeKind::Modified => {
                    let Some(path) = &change.absolute_path else { continue };
                    let bytes = match std::fs::read(path) {
                        Ok(b) => b,
                        Err(e) => {
                            outcome.errors.push(format!("{}: {e}", path.display()));
                            continue;
                        }
                    };
                    let content = String::from_utf8_lossy(&bytes).to_string();

                    if change.kind == ChangeKind::Modified {
                        self.supersede_current_file(&change.relative_path, now, &mut statements);
                    }

                    let file_id = ScopedId::new(&self.project_id, "FILE", &change.relative_path);
                    let file_node = Node::new(
                        file_id.clone(),
                        NodeKind::File,
                        self.project_id.clone(),
                        json!({
                            "path": change.relative_path,
                            "contentHash": change.content_hash,
                        }),
                    );
                    statements.push(GraphStatement::UpsertNode(file_node));
                    outcome.nodes_created += 1;
                    outcome.embedding_queue.push(file_id.clone());

                    if change.relative_path.to_lowercase().ends_with(".md") {
                        self.ingest_markdown(&change.relative_path, &content, file_id, &mut statements, &mut outcome);
                    } else if self.parser_registry.supports(&change.relative_path) {
                        match self.parser_registry.parse(&change.relative_path, &content) {
                            Ok(Some(parse_result)) => {
                                self.ingest_code_symbols(path, &change.relative_path, file_id, parse_result, &mut statements, &mut outcome);
                            }
                            Ok(None) => {}
                            Err(e) => {
                                outcome.errors.push(format!("{}: parse error: {e}", change.relative_path));
                            }
                        }
                    }
                }
            }
        }

        outcome.relationships_created = statements
            .iter()
            .filter(|s| matches!(s, GraphStatement::UpsertEdge(_)))
            .count();

        // Phase 4/5 commit: write the batch, then mirror it into the in-memory index.
        self.store.write_batch(statements.clone()).await?;
        self.index.apply(&statements);

        // Phase 6: architecture validation.
        if self.config.architecture.run_on_rebuild {
            let violation_statements = ArchitectureValidator::evaluate(
                &self.index,
                &self.project_id,
                &self.config.architecture,
                None,
            );
            if !violation_statements.is_empty() {
                self.store.write_batch(violation_statements.clone()).await?;
                self.index.apply(&violation_statements);
                outcome.nodes_created += violation_statements
                    .iter()
                    .filter(|s| matches!(s, GraphStatement::UpsertNode(_)))
                    .count();
            }
        }

        Ok(outcome)
    }

    fn supersede_current_file(&self, relative_path: &str, at: chrono::DateTime<Utc>, statements: &mut Vec<GraphStatement>) {
        let file_id = ScopedId::new(&self.project_id, "FILE", relative_path);
        if self.index.contains_current(&file_id) {
            statements.push(GraphStatement::SupersedeNode { id: file_id.clone(), at });
        }
        for child in self.index.out_neighbors(EdgeKind::Contains, &file_id) {
            statements.push(GraphStatement::SupersedeNode { id: child, at });
        }
    }

    fn supersede_removed(
        &self,
        relative_path: &str,
        at: chrono::DateTime<Utc>,
        statements: &mut Vec<GraphStatement>,
        outcome: &mut IngestOutcome,
    ) {
        let file_id = ScopedId::new(&self.project_id, "FILE", relative_path);
        if self.index.contains_current(&file_id) {
            statements.push(GraphStatement::SupersedeNode { id: file_id.clone(), at });
            outcome.purge_queue.push(file_id.clone());
        }
        for child in self.index.out_neighbors(EdgeKind::Contains, &file_id) {
            statements.push(GraphStatement::SupersedeNode { id: child.clone(), at });
            outcome.purge_queue.push(child);
        }
    }

    fn ingest_markdown(
        &self,
        relative_path: &str,
        content: &str,
        file_id: ScopedId,
        statements: &mut Vec<GraphStatement>,
        outcome: &mut IngestOutcome,
    ) {
        let document = parse_markdown(relative_path, content);
        for (idx, section) in document.sections.iter().enumerate() {
            let section_key = format!("{relative_path}:{idx}");
            let section_id = ScopedId::new(&self.project_id, "SECTION", &section_key);
            let section_node = Node::new(
                section_id.clone(),
                NodeKind::Section,
                self.project_id.clone(),
                json!({
                    "heading": section.heading,
                    "level": section.level,
                    "wordCount": section.word_count,
                    "backtickRefs": section.backtick_refs,
                }),
            );
            statements.push(GraphStatement::UpsertNode(section_node));
            statements.push(GraphStatement::UpsertEdge(Edge::new(
                EdgeKind::Contains,
                file_id.clone(),
                section_id.clone(),
                self.project_id.clone(),
            )));
            outcome.nodes_created += 1;
            outcome.embedding_queue.push(section_id.clone());

            for reference in &section.backtick_refs {
                if let Some(target) = self.find_symbol_by_name(reference) {
                    statements.push(GraphStatement::UpsertEdge(Edge::new(
                        EdgeKind::Describes,
                        section_id.clone(),
                        target,
                        self.project_id.clone(),
                    )));
                }
            }
        }
    }

    fn find_symbol_by_name(&self, name: &str) -> Option<ScopedId> {
        self.index
            .nodes_by_kind(NodeKind::Function)
            .into_iter()
            .chain(self.index.nodes_by_kind(NodeKind::Class))
            .find(|n| n.attr_str("name") == Some(name))
            .map(|n| n.id)
    }

    fn ingest_code_symbols(
        &self,
        absolute_path: &Path,
        relative_path: &str,
        file_id: ScopedId,
        parse_result: codegraph_parser::ParseResult,
        statements: &mut Vec<GraphStatement>,
        outcome: &mut IngestOutcome,
    ) {
        use codegraph_parser::SymbolType;

        let importer_dir = absolute_path.parent().unwrap_or(&self.workspace_root);

        for symbol in &parse_result.symbols {
            match symbol.symbol_type {
                SymbolType::Import => {
                    let import_key = format!("{relative_path}:{}:{}", symbol.name, symbol.start_line);
                    let import_id = ScopedId::new(&self.project_id, "IMPORT", &import_key);
                    let import_node = Node::new(
                        import_id.clone(),
                        NodeKind::Import,
                        self.project_id.clone(),
                        json!({"specifier": symbol.name, "sourceFile": relative_path}),
                    );
                    statements.push(GraphStatement::UpsertNode(import_node));
                    statements.push(GraphStatement::UpsertEdge(Edge::new(
                        EdgeKind::Contains,
                        file_id.clone(),
                        import_id.clone(),
                        self.project_id.clone(),
                    )));
                    outcome.nodes_created += 1;

                    if let Some(target_rel) =
                        crate::resolve::resolve_import(&self.workspace_root, importer_dir, &symbol.name)
                    {
                        let target_file_id = ScopedId::new(&self.project_id, "FILE", &target_rel);
                        if self.index.contains_current(&target_file_id) || target_rel == relative_path {
                            statements.push(GraphStatement::UpsertEdge(Edge::new(
                                EdgeKind::References,
                                file_id.clone(),
                                target_file_id,
                                self.project_id.clone(),
                            )));
                        }
                    }
                }
                SymbolType::Function | SymbolType::Method => {
                    let local_key = format!("{relative_path}:{}:{}", symbol.name, symbol.start_line);
                    let symbol_id = ScopedId::new(&self.project_id, "FUNCTION", &local_key);
                    let node = Node::new(
                        symbol_id.clone(),
                        NodeKind::Function,
                        self.project_id.clone(),
                        json!({
                            "name": symbol.name,
                            "startLine": symbol.start_line,
                            "endLine": symbol.end_line,
                            "kind": symbol.kind,
                            "scopePath": symbol.scope_path,
                        }),
                    );
                    statements.push(GraphStatement::UpsertNode(node));
                    statements.push(GraphStatement::UpsertEdge(Edge::new(
                        EdgeKind::Contains,
                        file_id.clone(),
                        symbol_id.clone(),
                        self.project_id.clone(),
                    )));
                    outcome.nodes_created += 1;
                    outcome.embedding_queue.push(symbol_id.clone());

                    for callee in &symbol.calls {
                        if let Some(target) = self.find_symbol_by_name(callee) {
                            statements.push(GraphStatement::UpsertEdge(Edge::new(
                                EdgeKind::Calls,
                                symbol_id.clone(),
                                target,
                                self.project_id.clone(),
                            )));
                        }
                    }
                }
                SymbolType::Class | SymbolType::Interface => {
                    let local_key = format!("{relative_path}:{}:{}", symbol.name, symbol.start_line);
                    let symbol_id = ScopedId::new(&self.project_id, "CLASS", &local_key);
                    let node = Node::new(
                        symbol_id.clone(),
                        NodeKind::Class,
                        self.project_id.clone(),
                        json!({
                            "name": symbol.name,
                            "startLine": symbol.start_line,
                            "endLine": symbol.end_line,
                            "kind": symbol.kind,
                        }),
                    );
                    statements.push(GraphStatement::UpsertNode(node));
                    statements.push(GraphStatement::UpsertEdge(Edge::new(
                        EdgeKind::Contains,
                        file_id.clone(),
                        symbol_id.clone(),
                        self.project_id.clone(),
                    )));
                    outcome.nodes_created += 1;
                    outcome.embedding_queue.push(symbol_id);
                }
                SymbolType::Variable => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{SurrealGraphStore, SurrealStoreConfig};
    use codegraph_parser::ParserRegistry as Registry;
    use std::fs;
    use tempfile::tempdir;

    async fn pipeline(root: &Path) -> IngestionPipeline {
        let store = SurrealGraphStore::connect(SurrealStoreConfig::default()).await.unwrap();
        IngestionPipeline {
            workspace_root: root.to_path_buf(),
            source_dir: root.to_path_buf(),
            project_id: "ab12".to_string(),
            store: Arc::new(store),
            index: Arc::new(GraphIndex::new()),
            parser_registry: Arc::new(Registry::with_default_parsers()),
            config: WorkspaceConfig::default(),
        }
    }

    #[tokio::test]
    async fn full_rebuild_ingests_files_and_resolves_imports() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.ts"), "import { b } from \"./b.js\";\nexport function useA() {\n  return b();\n}\n").unwrap();
        fs::write(dir.path().join("b.ts"), "export function b() {\n  return 1;\n}\n").unwrap();

        let p = pipeline(dir.path()).await;
        let outcome = p.run(RebuildMode::Full).await.unwrap();

        assert_eq!(outcome.files_processed, 2);
        assert_eq!(outcome.files_changed, 2);
        assert!(outcome.errors.is_empty());

        let a_id = ScopedId::new("ab12", "FILE", "a.ts");
        let b_id = ScopedId::new("ab12", "FILE", "b.ts");
        let refs = p.index.out_neighbors(EdgeKind::References, &a_id);
        assert_eq!(refs, vec![b_id]);
    }

    #[tokio::test]
    async fn incremental_rebuild_is_a_noop_when_nothing_changed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.ts"), "export function a() { return 1; }\n").unwrap();

        let p = pipeline(dir.path()).await;
        p.run(RebuildMode::Full).await.unwrap();
        let second = p.run(RebuildMode::Incremental).await.unwrap();

        assert_eq!(second.files_changed, 0);
        assert_eq!(second.nodes_created, 0);
        assert_eq!(second.relationships_created, 0);
    }
}
