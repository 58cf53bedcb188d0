use codegraph_core::Language;
use serde::{Deserialize, Serialize};

/// Language-neutral symbol schema emitted by every parser tier (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolType {
    Function,
    Class,
    Method,
    Variable,
    Interface,
    Import,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedSymbol {
    #[serde(rename = "type")]
    pub symbol_type: SymbolType,
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Subdivision such as `arrow`, `generator`, `abstract`, `interface`,
    /// `type`, `enum`. §4.2 reserves this for the optional AST tier, but no
    /// AST-tier parser is registered in this build, so the syntactic
    /// extractors derive it too on a best-effort pattern-matched basis
    /// (SPEC_FULL.md open question 4) rather than always leaving it `None`.
    #[serde(default)]
    pub kind: Option<String>,
    /// Enclosing class name. Same best-effort syntactic-tier derivation as
    /// `kind` above applies here, not AST-tier-exclusive in this build.
    #[serde(default)]
    pub scope_path: Option<String>,
    #[serde(default)]
    pub calls: Vec<String>,
    #[serde(default)]
    pub imports: Vec<String>,
}

impl ParsedSymbol {
    pub fn new(symbol_type: SymbolType, name: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            symbol_type,
            name: name.into(),
            start_line,
            end_line,
            kind: None,
            scope_path: None,
            calls: Vec::new(),
            imports: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_calls(mut self, calls: Vec<String>) -> Self {
        self.calls = calls;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ParseResult {
    pub file: String,
    pub language: Language,
    pub symbols: Vec<ParsedSymbol>,
}

/// Which extraction tier produced a `ParseResult` — surfaced so the
/// ingestion pipeline can log degradation (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserTier {
    Syntactic,
    Ast,
}
