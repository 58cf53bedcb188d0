use crate::symbol::{ParseResult, ParsedSymbol, SymbolType};
use codegraph_core::Language;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Keywords that pattern-match the function-declaration shape but are
/// control flow, not a symbol (§4.2).
static CONTROL_FLOW_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "if", "for", "while", "switch", "catch", "else", "do", "with", "try",
    ]
    .into_iter()
    .collect()
});

static FUNCTION_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*\(").unwrap()
});

static ARROW_CONST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s*)?\(").unwrap()
});

static ARROW_TAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"=>").unwrap());

static CLASS_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)").unwrap()
});

static INTERFACE_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:export\s+)?interface\s+([A-Za-z_$][\w$]*)").unwrap());

static METHOD_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:public\s+|private\s+|protected\s+|static\s+|async\s+)*([A-Za-z_$][\w$]*)\s*\(").unwrap()
});

static IMPORT_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*import\s+(?:[\w${},*\s]+\s+from\s+)?["']([^"']+)["']"#).unwrap()
});

static CALL_SITE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z_$][\w$]*)\s*\(").unwrap());

/// Syntactic-tier pattern extractor for the JS/TS family (always available,
/// per §4.2). Produces functions, classes, interfaces, imports, and
/// best-effort `calls` at file-line precision — no scope tracking, no
/// `kind` subdivisions (those are AST-tier only).
pub struct EcmaSyntacticParser;

impl EcmaSyntacticParser {
    fn language_for(file_path: &str) -> Language {
        let ext = std::path::Path::new(file_path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "ts" | "tsx" => Language::TypeScript,
            _ => Language::JavaScript,
        }
    }

    fn extract_calls(body: &str) -> Vec<String> {
        let mut calls = Vec::new();
        for cap in CALL_SITE.captures_iter(body) {
            let name = cap[1].to_string();
            if !CONTROL_FLOW_KEYWORDS.contains(name.as_str()) && !calls.contains(&name) {
                calls.push(name);
            }
        }
        calls
    }

    /// Crude brace-matching to find the body of a symbol starting at `line_idx`.
    fn body_span(lines: &[&str], start_idx: usize) -> usize {
        let mut depth = 0i32;
        let mut seen_open = false;
        for (offset, line) in lines[start_idx..].iter().enumerate() {
            for ch in line.chars() {
                match ch {
                    '{' => {
                        depth += 1;
                        seen_open = true;
                    }
                    '}' => depth -= 1,
                    _ => {}
                }
            }
            if seen_open && depth <= 0 {
                return start_idx + offset;
            }
        }
        lines.len().saturating_sub(1)
    }
}

impl crate::registry::LanguageParser for EcmaSyntacticParser {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn extensions(&self) -> &[&'static str] {
        &["ts", "tsx", "js", "jsx", "mjs", "cjs"]
    }

    fn parse(&self, file_path: &str, content: &str) -> codegraph_core::Result<ParseResult> {
        let language = Self::language_for(file_path);
        let lines: Vec<&str> = content.lines().collect();
        let mut symbols = Vec::new();
        let mut current_class: Option<(String, usize)> = None; // (name, brace_depth_at_entry)
        let mut depth = 0i32;

        for (idx, line) in lines.iter().enumerate() {
            let line_no = (idx + 1) as u32;

            if let Some((name, start_depth)) = &current_class {
                if depth <= *start_depth {
                    let _ = name;
                    current_class = None;
                }
            }

            if let Some(caps) = CLASS_DECL.captures(line) {
                let name = caps[1].to_string();
                let end_idx = Self::body_span(&lines, idx);
                symbols.push(ParsedSymbol::new(SymbolType::Class, name.clone(), line_no, (end_idx + 1) as u32));
                current_class = Some((name, depth));
            } else if let Some(caps) = INTERFACE_DECL.captures(line) {
                let name = caps[1].to_string();
                let end_idx = Self::body_span(&lines, idx);
                symbols.push(
                    ParsedSymbol::new(SymbolType::Interface, name, line_no, (end_idx + 1) as u32)
                        .with_kind("interface"),
                );
            } else if let Some(caps) = FUNCTION_DECL.captures(line) {
                let name = caps[1].to_string();
                if !CONTROL_FLOW_KEYWORDS.contains(name.as_str()) {
                    let end_idx = Self::body_span(&lines, idx);
                    let body = lines[idx..=end_idx].join("\n");
                    symbols.push(
                        ParsedSymbol::new(SymbolType::Function, name, line_no, (end_idx + 1) as u32)
                            .with_calls(Self::extract_calls(&body)),
                    );
                }
            } else if let Some(caps) = ARROW_CONST.captures(line) {
                let name = caps[1].to_string();
                // Only treat as a function if this or a following line contains `=>`.
                let end_idx = Self::body_span(&lines, idx).max(idx);
                let window = lines[idx..=end_idx.min(lines.len() - 1)].join("\n");
                if ARROW_TAIL.is_match(&window) && !CONTROL_FLOW_KEYWORDS.contains(name.as_str()) {
                    symbols.push(
                        ParsedSymbol::new(SymbolType::Function, name, line_no, (end_idx + 1) as u32)
                            .with_kind("arrow")
                            .with_calls(Self::extract_calls(&window)),
                    );
                }
            } else if let Some((class_name, _)) = &current_class {
                if let Some(caps) = METHOD_DECL.captures(line) {
                    let name = caps[1].to_string();
                    // Constructors are omitted as separate function nodes (§4.2).
                    if name != "constructor" && !CONTROL_FLOW_KEYWORDS.contains(name.as_str()) {
                        let end_idx = Self::body_span(&lines, idx);
                        let body = lines[idx..=end_idx].join("\n");
                        symbols.push(
                            ParsedSymbol::new(SymbolType::Method, name, line_no, (end_idx + 1) as u32)
                                .with_kind("method")
                                .with_calls(Self::extract_calls(&body))
                                .tap_scope(class_name.clone()),
                        );
                    }
                }
            }

            if let Some(caps) = IMPORT_DECL.captures(line) {
                symbols.push(
                    ParsedSymbol::new(SymbolType::Import, caps[1].to_string(), line_no, line_no)
                        .with_kind("import"),
                );
            }

            for ch in line.chars() {
                match ch {
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                }
            }
        }

        Ok(ParseResult {
            file: file_path.to_string(),
            language,
            symbols,
        })
    }
}

trait TapScope {
    fn tap_scope(self, scope: String) -> Self;
}

impl TapScope for ParsedSymbol {
    fn tap_scope(mut self, scope: String) -> Self {
        self.scope_path = Some(scope);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LanguageParser;

    #[test]
    fn excludes_control_flow_keywords() {
        let src = "function real(x) {\n  if (x) {\n    for (;;) {}\n  }\n  return x;\n}\n";
        let result = EcmaSyntacticParser.parse("a.ts", src).unwrap();
        let names: Vec<_> = result.symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"real"));
        assert!(!names.contains(&"if"));
        assert!(!names.contains(&"for"));
    }

    #[test]
    fn omits_constructor_as_function_node() {
        let src = "class Foo {\n  constructor() {}\n  bar() {\n    return 1;\n  }\n}\n";
        let result = EcmaSyntacticParser.parse("a.ts", src).unwrap();
        assert!(result.symbols.iter().any(|s| s.name == "Foo"));
        assert!(!result.symbols.iter().any(|s| s.name == "constructor"));
        let bar = result.symbols.iter().find(|s| s.name == "bar").unwrap();
        assert_eq!(bar.scope_path.as_deref(), Some("Foo"));
    }

    #[test]
    fn detects_arrow_functions_and_imports() {
        let src = "import { x } from \"./b.js\";\nconst handler = (req) => {\n  return req;\n};\n";
        let result = EcmaSyntacticParser.parse("a.ts", src).unwrap();
        let import = result.symbols.iter().find(|s| s.symbol_type == SymbolType::Import).unwrap();
        assert_eq!(import.name, "./b.js");
        let arrow = result.symbols.iter().find(|s| s.name == "handler").unwrap();
        assert_eq!(arrow.kind.as_deref(), Some("arrow"));
    }
}
