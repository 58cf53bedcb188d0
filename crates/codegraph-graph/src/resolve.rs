use std::path::{Path, PathBuf};

/// Extensions probed, in order, when resolving a relative module specifier
/// to a file on disk (§4.3 phase 5).
const CANDIDATE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Resolves a module specifier written in `importer_dir` to a workspace-
/// relative path, returning `None` when nothing on disk matches (unresolved
/// imports become no edge, never an error — §4.3).
///
/// Trailing `.js`/`.jsx` extensions on the specifier are stripped before
/// probing: a workspace compiled with node16/bundler module resolution
/// writes `import "./b.js"` even though only `b.ts` exists on disk. Skipping
/// this strip silently drops the edge (§8 property 2).
pub fn resolve_import(
    workspace_root: &Path,
    importer_dir: &Path,
    specifier: &str,
) -> Option<String> {
    if !specifier.starts_with('.') {
        // Bare specifiers (package imports) are never resolved to a workspace file.
        return None;
    }

    let stripped = strip_js_extension(specifier);
    let base = importer_dir.join(stripped.as_ref());

    for candidate in candidates(&base) {
        if candidate.is_file() {
            return Some(codegraph_core::canonical_relative_path(workspace_root, &candidate));
        }
    }
    None
}

fn strip_js_extension(specifier: &str) -> std::borrow::Cow<'_, str> {
    if let Some(stem) = specifier.strip_suffix(".js").or_else(|| specifier.strip_suffix(".jsx")) {
        std::borrow::Cow::Borrowed(stem)
    } else {
        std::borrow::Cow::Borrowed(specifier)
    }
}

fn candidates(base: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if base.extension().is_some() {
        out.push(base.to_path_buf());
    }
    for ext in CANDIDATE_EXTENSIONS {
        out.push(base.with_extension(ext));
    }
    for ext in CANDIDATE_EXTENSIONS {
        out.push(base.join(format!("index.{ext}")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn resolves_after_stripping_js_extension() {
        let root = tempdir().unwrap();
        fs::write(root.path().join("b.ts"), "export const b = 1;").unwrap();

        let resolved = resolve_import(root.path(), root.path(), "./b.js");
        assert_eq!(resolved.as_deref(), Some("b.ts"));
    }

    #[test]
    fn unresolved_import_yields_none() {
        let root = tempdir().unwrap();
        let resolved = resolve_import(root.path(), root.path(), "./missing.js");
        assert!(resolved.is_none());
    }

    #[test]
    fn bare_package_specifiers_never_resolve() {
        let root = tempdir().unwrap();
        let resolved = resolve_import(root.path(), root.path(), "react");
        assert!(resolved.is_none());
    }

    #[test]
    fn resolves_directory_index() {
        let root = tempdir().unwrap();
        fs::create_dir_all(root.path().join("utils")).unwrap();
        fs::write(root.path().join("utils").join("index.ts"), "export {}").unwrap();

        let resolved = resolve_import(root.path(), root.path(), "./utils");
        assert_eq!(resolved.as_deref(), Some("utils/index.ts"));
    }
}
