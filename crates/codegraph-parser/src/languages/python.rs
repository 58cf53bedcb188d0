use crate::registry::LanguageParser;
use crate::symbol::{ParseResult, ParsedSymbol, SymbolType};
use codegraph_core::Language;
use once_cell::sync::Lazy;
use regex::Regex;

static DEF_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\(").unwrap());
static CLASS_DECL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*)class\s+([A-Za-z_]\w*)").unwrap());
static IMPORT_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:from\s+(\S+)\s+import|import\s+(\S+))").unwrap());
static CALL_SITE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Za-z_]\w*)\s*\(").unwrap());

/// Syntactic-tier pattern extractor for Python (§4.2). Indentation stands in
/// for the brace-matching used by the ECMA extractor: a `def`/`class` body
/// ends at the next line whose indentation is <= its own.
pub struct PythonSyntacticParser;

impl PythonSyntacticParser {
    fn indent_of(line: &str) -> usize {
        line.chars().take_while(|c| *c == ' ').count()
    }

    fn body_end(lines: &[&str], start_idx: usize, def_indent: usize) -> usize {
        for (offset, line) in lines[start_idx + 1..].iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if Self::indent_of(line) <= def_indent {
                return start_idx + offset;
            }
        }
        lines.len().saturating_sub(1)
    }

    fn extract_calls(body: &str) -> Vec<String> {
        let mut calls = Vec::new();
        for cap in CALL_SITE.captures_iter(body) {
            let name = cap[1].to_string();
            if !["if", "for", "while", "elif", "except", "with"].contains(&name.as_str())
                && !calls.contains(&name)
            {
                calls.push(name);
            }
        }
        calls
    }
}

impl LanguageParser for PythonSyntacticParser {
    fn language(&self) -> Language {
        Language::Python
    }

    fn extensions(&self) -> &[&'static str] {
        &["py"]
    }

    fn parse(&self, file_path: &str, content: &str) -> codegraph_core::Result<ParseResult> {
        let lines: Vec<&str> = content.lines().collect();
        let mut symbols = Vec::new();
        let mut class_stack: Vec<(String, usize)> = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            let line_no = (idx + 1) as u32;
            let indent = Self::indent_of(line);

            class_stack.retain(|(_, class_indent)| indent > *class_indent || line.trim().is_empty());

            if let Some(caps) = CLASS_DECL.captures(line) {
                let name = caps[2].to_string();
                let end_idx = Self::body_end(&lines, idx, indent);
                symbols.push(ParsedSymbol::new(SymbolType::Class, name.clone(), line_no, (end_idx + 1) as u32));
                class_stack.push((name, indent));
            } else if let Some(caps) = DEF_DECL.captures(line) {
                let name = caps[2].to_string();
                if name != "__init__" {
                    let end_idx = Self::body_end(&lines, idx, indent);
                    let body = lines[idx..=end_idx].join("\n");
                    let scope = class_stack.last().map(|(n, _)| n.clone());
                    let symbol_type = if scope.is_some() { SymbolType::Method } else { SymbolType::Function };
                    let mut symbol = ParsedSymbol::new(symbol_type, name, line_no, (end_idx + 1) as u32)
                        .with_calls(Self::extract_calls(&body));
                    symbol.scope_path = scope;
                    if line.trim_start().starts_with("async") {
                        symbol.kind = Some("generator".into());
                    }
                    symbols.push(symbol);
                }
            } else if let Some(caps) = IMPORT_DECL.captures(line) {
                let module = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string());
                if let Some(module) = module {
                    symbols.push(ParsedSymbol::new(SymbolType::Import, module, line_no, line_no));
                }
            }
        }

        Ok(ParseResult {
            file: file_path.to_string(),
            language: Language::Python,
            symbols,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_function_and_method() {
        let src = "def top():\n    return 1\n\n\nclass Foo:\n    def bar(self):\n        return top()\n";
        let parser = PythonSyntacticParser;
        let result = parser.parse("a.py", src).unwrap();
        let names: Vec<_> = result.symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"top"));
        assert!(names.contains(&"bar"));
        assert!(names.contains(&"Foo"));
        let bar = result.symbols.iter().find(|s| s.name == "bar").unwrap();
        assert_eq!(bar.scope_path.as_deref(), Some("Foo"));
        assert!(bar.calls.contains(&"top".to_string()));
    }

    #[test]
    fn omits_init_as_function_node() {
        let src = "class Foo:\n    def __init__(self):\n        pass\n";
        let parser = PythonSyntacticParser;
        let result = parser.parse("a.py", src).unwrap();
        assert!(!result.symbols.iter().any(|s| s.name == "__init__"));
    }
}
