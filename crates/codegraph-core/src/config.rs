use config as cfg;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single architectural layer: a named set of source globs, and the set of
/// other layer names it is permitted to reference.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArchitectureLayer {
    pub name: String,
    pub sources: Vec<String>,
    #[serde(default)]
    pub allowed_targets: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleSeverity {
    Error,
    Warn,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArchitectureRule {
    pub from: String,
    pub to: String,
    pub severity: RuleSeverity,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ArchitectureConfig {
    #[serde(default)]
    pub layers: Vec<ArchitectureLayer>,
    #[serde(default)]
    pub rules: Vec<ArchitectureRule>,
    /// When false, phase 6 (architecture validation) is skipped on every
    /// rebuild and only runs on an explicit `arch_validate` call.
    #[serde(default = "ArchitectureConfig::default_run_on_rebuild")]
    pub run_on_rebuild: bool,
}

impl ArchitectureConfig {
    fn default_run_on_rebuild() -> bool {
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TestingConfig {
    #[serde(default = "TestingConfig::default_source_globs")]
    pub source_globs: Vec<String>,
    #[serde(default = "TestingConfig::default_extension")]
    pub default_extension: String,
}

impl TestingConfig {
    fn default_source_globs() -> Vec<String> {
        vec!["**/*.test.*".into(), "**/*.spec.*".into(), "**/__tests__/**".into()]
    }

    fn default_extension() -> String {
        "ts".into()
    }
}

impl Default for TestingConfig {
    fn default() -> Self {
        Self {
            source_globs: Self::default_source_globs(),
            default_extension: Self::default_extension(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct EmbeddingsConfig {
    /// URL of the remote semantic summarizer tier (§4.5). Absent => local
    /// deterministic tier only.
    #[serde(default)]
    pub summarizer_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RebuildConfig {
    #[serde(default)]
    pub max_parallelism: Option<usize>,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self { max_parallelism: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub architecture: ArchitectureConfig,
    #[serde(default)]
    pub testing: TestingConfig,
    #[serde(default = "WorkspaceConfig::default_vector_dim")]
    pub vector_dim: usize,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub rebuild: RebuildConfig,
    /// Base URL of the external HTTP vector store (e.g. `http://localhost:6333`).
    #[serde(default = "WorkspaceConfig::default_vector_store_url")]
    pub vector_store_url: String,
    /// Bolt/Cypher-capable embedded graph store connection string.
    #[serde(default = "WorkspaceConfig::default_graph_store_url")]
    pub graph_store_url: String,
}

impl WorkspaceConfig {
    fn default_vector_dim() -> usize {
        128
    }

    fn default_vector_store_url() -> String {
        "http://127.0.0.1:6333".into()
    }

    fn default_graph_store_url() -> String {
        "mem://codegraph".into()
    }

    /// Layered load: built-in defaults, then an optional `codegraph.toml` at
    /// the workspace root, then `CODEGRAPH_*` environment overrides. Absence
    /// of the file is not an error — the server runs with defaults.
    pub fn load(workspace_root: &std::path::Path) -> crate::Result<Self> {
        let defaults = serde_json::to_value(Self::default())
            .map_err(|e| crate::CodeGraphError::Configuration(e.to_string()))?;

        let mut builder = cfg::Config::builder()
            .add_source(cfg::Config::try_from(&defaults).map_err(|e| {
                crate::CodeGraphError::Configuration(format!("default config: {e}"))
            })?);

        let candidate = workspace_root.join("codegraph.toml");
        if candidate.exists() {
            builder = builder.add_source(cfg::File::from(candidate));
        }

        builder = builder.add_source(
            cfg::Environment::with_prefix("CODEGRAPH")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::CodeGraphError::Configuration(e.to_string()))
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            architecture: ArchitectureConfig::default(),
            testing: TestingConfig::default(),
            vector_dim: Self::default_vector_dim(),
            embeddings: EmbeddingsConfig::default(),
            rebuild: RebuildConfig::default(),
            vector_store_url: Self::default_vector_store_url(),
            graph_store_url: Self::default_graph_store_url(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_file_present() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = WorkspaceConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.vector_dim, 128);
        assert!(cfg.architecture.layers.is_empty());
        assert_eq!(cfg.testing.default_extension, "ts");
    }

    #[test]
    fn loads_overrides_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("codegraph.toml"),
            "vector_dim = 256\n[testing]\ndefault_extension = \"py\"\n",
        )
        .unwrap();
        let cfg = WorkspaceConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.vector_dim, 256);
        assert_eq!(cfg.testing.default_extension, "py");
    }
}
