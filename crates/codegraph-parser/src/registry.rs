use crate::symbol::{ParseResult, ParserTier};
use codegraph_core::Language;
use std::collections::HashMap;
use std::sync::Arc;

/// A language plugin: a variant over `{language, extensions, parse}` (§4.2,
/// design note "Dynamic plugin dispatch"). Parsers are registered explicitly
/// at startup — the registry is a plain `extension -> parser` map, never a
/// reflection-driven discovery.
pub trait LanguageParser: Send + Sync {
    fn language(&self) -> Language;
    fn extensions(&self) -> &[&'static str];
    fn tier(&self) -> ParserTier {
        ParserTier::Syntactic
    }
    fn parse(&self, file_path: &str, content: &str) -> codegraph_core::Result<ParseResult>;
}

/// Process-wide registry. Immutable after `register` calls at startup
/// (design note "Global state"). When two parsers claim the same extension
/// the registry keeps the highest-tier one and degrades silently if it is
/// later unregistered — matching §4.2's "selects the highest available tier
/// at startup".
#[derive(Default)]
pub struct ParserRegistry {
    by_extension: HashMap<String, Arc<dyn LanguageParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, parser: Arc<dyn LanguageParser>) {
        for ext in parser.extensions() {
            let ext = ext.to_lowercase();
            match self.by_extension.get(&ext) {
                Some(existing) if existing.tier() == ParserTier::Ast && parser.tier() == ParserTier::Syntactic => {
                    // Keep the existing AST-tier parser; a syntactic one never displaces it.
                }
                _ => {
                    self.by_extension.insert(ext, parser.clone());
                }
            }
        }
    }

    fn extension_of(file_path: &str) -> Option<String> {
        std::path::Path::new(file_path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }

    /// Returns `None` when no parser matches the file's extension (§4.2).
    pub fn parse(&self, file_path: &str, content: &str) -> codegraph_core::Result<Option<ParseResult>> {
        let Some(ext) = Self::extension_of(file_path) else {
            return Ok(None);
        };
        match self.by_extension.get(&ext) {
            Some(parser) => parser.parse(file_path, content).map(Some),
            None => Ok(None),
        }
    }

    pub fn supports(&self, file_path: &str) -> bool {
        Self::extension_of(file_path)
            .map(|ext| self.by_extension.contains_key(&ext))
            .unwrap_or(false)
    }

    /// Registry preloaded with the syntactic-tier code parsers that ship
    /// with the server: JS/TS family and Python. Markdown documents are
    /// handled by the dedicated `markdown` module instead of this registry
    /// (§4.2) since `DOCUMENT`/`SECTION` nodes don't fit the code-symbol
    /// schema.
    pub fn with_default_parsers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::languages::ecma::EcmaSyntacticParser));
        registry.register(Arc::new(crate::languages::python::PythonSyntacticParser));
        registry
    }
}
