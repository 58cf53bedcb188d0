use codegraph_core::{ArchitectureConfig, Edge, EdgeKind, GraphStatement, Node, NodeKind, RuleSeverity, ScopedId, Severity};
use serde_json::json;

use crate::index::GraphIndex;

/// Matches a workspace-relative path against a layer's glob-ish `sources`
/// list. Sources are plain prefixes or `*`/`**` globs (§4.7); a minimal glob
/// matcher keeps this dependency-free since the shapes in practice are path
/// prefixes ending in `/**` or `/*`.
fn matches_source(path: &str, pattern: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix("/**") {
        return path.starts_with(prefix);
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return path.starts_with(prefix) && !path[prefix.len()..].trim_start_matches('/').contains('/');
    }
    path == pattern || path.starts_with(pattern)
}

fn layer_for<'a>(config: &'a ArchitectureConfig, path: &str) -> Option<&'a str> {
    config
        .layers
        .iter()
        .find(|layer| layer.sources.iter().any(|src| matches_source(path, src)))
        .map(|layer| layer.name.as_str())
}

fn rule_denies(config: &ArchitectureConfig, from_layer: &str, to_layer: &str) -> Option<Severity> {
    config.rules.iter().find_map(|rule| {
        if rule.from == from_layer && rule.to == to_layer {
            Some(match rule.severity {
                RuleSeverity::Error => Severity::Error,
                RuleSeverity::Warn => Severity::Warn,
            })
        } else {
            None
        }
    })
}

/// Evaluates the configured layer rules over current `REFERENCES` edges and
/// produces `VIOLATION` nodes + `VIOLATES` edges (§4.8). `O(E)` over current
/// edges: it walks every `FILE` node's `REFERENCES` out-edges once.
pub struct ArchitectureValidator;

impl ArchitectureValidator {
    /// `scope` restricts validation to a subset of files (used by
    /// `arch_validate(files?)`, which does not persist); `None` validates
    /// every current file.
    pub fn evaluate(
        index: &GraphIndex,
        project_id: &str,
        config: &ArchitectureConfig,
        scope: Option<&[String]>,
    ) -> Vec<GraphStatement> {
        if config.layers.is_empty() || config.rules.is_empty() {
            return Vec::new();
        }

        let mut statements = Vec::new();
        for file in index.nodes_by_kind(NodeKind::File) {
            if file.project_id != project_id {
                continue;
            }
            let Some(path) = file.attr_str("path") else {
                continue;
            };
            if let Some(scope) = scope {
                if !scope.iter().any(|s| s == path) {
                    continue;
                }
            }
            let Some(from_layer) = layer_for(config, path) else {
                continue;
            };

            for target_id in index.out_neighbors(EdgeKind::References, &file.id) {
                let Some(target) = index.current_node(&target_id) else {
                    continue;
                };
                let Some(target_path) = target.attr_str("path") else {
                    continue;
                };
                let Some(to_layer) = layer_for(config, target_path) else {
                    continue;
                };
                if let Some(severity) = rule_denies(config, from_layer, to_layer) {
                    let rule_key = format!("{from_layer}->{to_layer}");
                    let violation_id = ScopedId::new(project_id, "VIOLATION", &format!("{rule_key}:{path}"));
                    let violation = Node::new(
                        violation_id.clone(),
                        NodeKind::Violation,
                        project_id,
                        json!({
                            "rule": rule_key,
                            "severity": severity,
                            "message": format!("{path} ({from_layer}) must not reference {target_path} ({to_layer})"),
                            "layer": from_layer,
                        }),
                    );
                    statements.push(GraphStatement::UpsertNode(violation));
                    statements.push(GraphStatement::UpsertEdge(Edge::new(
                        EdgeKind::Violates,
                        file.id.clone(),
                        violation_id,
                        project_id,
                    )));
                }
            }
        }
        statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codegraph_core::{ArchitectureLayer, ArchitectureRule};
    use serde_json::json;

    fn file_node(project: &str, path: &str) -> Node {
        Node::new(ScopedId::new(project, "FILE", path), NodeKind::File, project, json!({"path": path}))
    }

    #[test]
    fn emits_violation_for_denied_layer_reference() {
        let index = GraphIndex::new();
        let ui = file_node("ab12", "ui/widget.ts");
        let db = file_node("ab12", "db/pool.ts");
        index.apply(&[
            GraphStatement::UpsertNode(ui.clone()),
            GraphStatement::UpsertNode(db.clone()),
            GraphStatement::UpsertEdge(Edge::new(EdgeKind::References, ui.id.clone(), db.id.clone(), "ab12")),
        ]);

        let config = ArchitectureConfig {
            layers: vec![
                ArchitectureLayer { name: "ui".into(), sources: vec!["ui/**".into()], allowed_targets: vec![] },
                ArchitectureLayer { name: "db".into(), sources: vec!["db/**".into()], allowed_targets: vec![] },
            ],
            rules: vec![ArchitectureRule { from: "ui".into(), to: "db".into(), severity: RuleSeverity::Error }],
            run_on_rebuild: true,
        };

        let statements = ArchitectureValidator::evaluate(&index, "ab12", &config, None);
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn no_violation_when_layers_unconfigured() {
        let index = GraphIndex::new();
        let statements = ArchitectureValidator::evaluate(&index, "ab12", &ArchitectureConfig::default(), None);
        assert!(statements.is_empty());
    }
}
