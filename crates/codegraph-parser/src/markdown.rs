use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PREFIX_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").unwrap());
static UNDERLINE_EQ: Lazy<Regex> = Lazy::new(|| Regex::new(r"^=+\s*$").unwrap());
static UNDERLINE_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-+\s*$").unwrap());
static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(```|~~~)\s*(\S*)").unwrap());
static BACKTICK_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").unwrap());
static MD_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]\(([^)]+)\)").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeFence {
    pub language: Option<String>,
    pub first_line: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    pub level: u8,
    pub start_line: u32,
    pub word_count: usize,
    pub backtick_refs: Vec<String>,
    pub code_fences: Vec<CodeFence>,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Readme,
    Adr,
    Changelog,
    Guide,
    Architecture,
    Other,
}

fn classify(file_path: &str) -> DocumentKind {
    let lower = file_path.to_lowercase();
    if lower.contains("readme") {
        DocumentKind::Readme
    } else if lower.contains("adr") || lower.contains("decision") {
        DocumentKind::Adr
    } else if lower.contains("changelog") {
        DocumentKind::Changelog
    } else if lower.contains("architecture") {
        DocumentKind::Architecture
    } else if lower.contains("guide") || lower.contains("docs/") {
        DocumentKind::Guide
    } else {
        DocumentKind::Other
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkdownDocument {
    pub kind: DocumentKind,
    pub title: String,
    pub hash: String,
    pub word_count: usize,
    pub sections: Vec<Section>,
}

/// Dedicated markdown parser producing `DOCUMENT` + `SECTION` node content
/// (§4.2). Recognizes prefix (`#`…`###`) and underline (`===`/`---`)
/// headings; H4+ folds into the nearest ancestor section as body content;
/// code fences are tracked (with language tag + first line) and heading
/// patterns inside fences are ignored; documents with no headings get an
/// implicit root section (`heading == ""`, `level == 1`).
pub fn parse_markdown(file_path: &str, content: &str) -> MarkdownDocument {
    let lines: Vec<&str> = content.lines().collect();
    let mut sections: Vec<Section> = Vec::new();
    let mut in_fence = false;
    let mut fence_marker = String::new();

    let mut current: Option<Section> = None;
    let mut current_body = String::new();

    let flush = |current: &mut Option<Section>, body: &mut String| {
        if let Some(mut section) = current.take() {
            section.word_count = body.split_whitespace().count();
            sections.push(std::mem::take(&mut section));
        }
        body.clear();
    };

    let mut idx = 0usize;
    while idx < lines.len() {
        let line = lines[idx];
        let line_no = (idx + 1) as u32;

        if let Some(caps) = CODE_FENCE.captures(line) {
            let marker = caps[1].to_string();
            if !in_fence {
                in_fence = true;
                fence_marker = marker;
                let lang = caps.get(2).map(|m| m.as_str().to_string()).filter(|s| !s.is_empty());
                let first_line = lines.get(idx + 1).map(|l| l.to_string());
                if let Some(section) = current.as_mut() {
                    section.code_fences.push(CodeFence { language: lang, first_line });
                }
            } else if marker == fence_marker {
                in_fence = false;
            }
            current_body.push_str(line);
            current_body.push('\n');
            idx += 1;
            continue;
        }

        if in_fence {
            current_body.push_str(line);
            current_body.push('\n');
            idx += 1;
            continue;
        }

        if let Some(caps) = PREFIX_HEADING.captures(line) {
            let level = caps[1].len();
            let heading = caps[2].trim().to_string();
            if level <= 3 {
                flush(&mut current, &mut current_body);
                current = Some(Section {
                    heading,
                    level: level as u8,
                    start_line: line_no,
                    word_count: 0,
                    backtick_refs: Vec::new(),
                    code_fences: Vec::new(),
                    links: Vec::new(),
                });
                idx += 1;
                continue;
            } else {
                // H4+ becomes body content of the nearest ancestor section.
                current_body.push_str(line);
                current_body.push('\n');
                idx += 1;
                continue;
            }
        }

        // Underline-style headings: a non-blank line followed by a line of all `=` or `-`.
        if let Some(next) = lines.get(idx + 1) {
            let is_underline_h1 = UNDERLINE_EQ.is_match(next);
            let is_underline_h2 = !is_underline_h1 && UNDERLINE_DASH.is_match(next) && !line.trim().is_empty();
            if (is_underline_h1 || is_underline_h2) && !line.trim().is_empty() {
                flush(&mut current, &mut current_body);
                current = Some(Section {
                    heading: line.trim().to_string(),
                    level: if is_underline_h1 { 1 } else { 2 },
                    start_line: line_no,
                    word_count: 0,
                    backtick_refs: Vec::new(),
                    code_fences: Vec::new(),
                    links: Vec::new(),
                });
                idx += 2;
                continue;
            }
        }

        for cap in BACKTICK_REF.captures_iter(line) {
            if let Some(section) = current.as_mut() {
                section.backtick_refs.push(cap[1].to_string());
            }
        }
        for cap in MD_LINK.captures_iter(line) {
            if let Some(section) = current.as_mut() {
                section.links.push(cap[1].to_string());
            }
        }

        current_body.push_str(line);
        current_body.push('\n');
        idx += 1;
    }
    flush(&mut current, &mut current_body);

    if sections.is_empty() {
        sections.push(Section {
            heading: String::new(),
            level: 1,
            start_line: 1,
            word_count: content.split_whitespace().count(),
            backtick_refs: Vec::new(),
            code_fences: Vec::new(),
            links: Vec::new(),
        });
    }

    let title = sections
        .iter()
        .find(|s| !s.heading.is_empty())
        .map(|s| s.heading.clone())
        .unwrap_or_else(|| {
            std::path::Path::new(file_path)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        });

    MarkdownDocument {
        kind: classify(file_path),
        title,
        hash: codegraph_core::content_hash(content.as_bytes()),
        word_count: content.split_whitespace().count(),
        sections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_has_one_root_section() {
        let doc = parse_markdown("empty.md", "");
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].heading, "");
        assert_eq!(doc.sections[0].level, 1);
    }

    #[test]
    fn prefix_and_underline_headings_both_recognized() {
        let src = "Title\n=====\n\nBody text.\n\n## Sub\nMore body.\n\nSub2\n----\ntext\n";
        let doc = parse_markdown("doc.md", src);
        let headings: Vec<_> = doc.sections.iter().map(|s| (s.heading.as_str(), s.level)).collect();
        assert!(headings.contains(&("Title", 1)));
        assert!(headings.contains(&("Sub", 2)));
        assert!(headings.contains(&("Sub2", 2)));
    }

    #[test]
    fn headings_inside_fences_are_ignored() {
        let src = "# Real Heading\n\n```text\n# not a heading\n```\nafter\n";
        let doc = parse_markdown("doc.md", src);
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].heading, "Real Heading");
        assert_eq!(doc.sections[0].code_fences.len(), 1);
    }

    #[test]
    fn h4_folds_into_ancestor_section() {
        let src = "## Parent\nintro\n#### Detail\nmore detail\n";
        let doc = parse_markdown("doc.md", src);
        assert_eq!(doc.sections.len(), 1);
        assert_eq!(doc.sections[0].heading, "Parent");
    }
}
