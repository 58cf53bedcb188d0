use std::path::{Path, PathBuf};

/// Directories the walker never descends into, regardless of configuration
/// (§8 testable property: `findMarkdownFiles` / discovery never enters
/// build output or VCS metadata directories).
const EXCLUDED_DIR_NAMES: &[&str] = &[
    "node_modules",
    "dist",
    "build",
    "coverage",
    ".git",
    ".next",
    "target",
    ".codegraph",
];

fn is_excluded_dir(name: &str) -> bool {
    EXCLUDED_DIR_NAMES.contains(&name) || name.starts_with('.')
}

/// Walks `source_dir` (which must be within `workspace_root`) collecting
/// regular files, skipping excluded directories and following symlinks only
/// when their resolved target stays within `workspace_root` (§4.3 phase 1).
pub fn discover_source_files(workspace_root: &Path, source_dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk(workspace_root, source_dir, &mut out);
    out.sort();
    out
}

fn walk(workspace_root: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        let metadata = match entry.file_type() {
            Ok(ft) => ft,
            Err(_) => continue,
        };

        if metadata.is_symlink() {
            let Ok(resolved) = std::fs::canonicalize(&path) else {
                continue;
            };
            if !resolved.starts_with(workspace_root) {
                continue;
            }
            if resolved.is_dir() {
                if !is_excluded_dir(&name) {
                    walk(workspace_root, &resolved, out);
                }
            } else {
                out.push(path);
            }
            continue;
        }

        if metadata.is_dir() {
            if !is_excluded_dir(&name) {
                walk(workspace_root, &path, out);
            }
        } else if metadata.is_file() {
            out.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn excludes_node_modules_and_dotdirs() {
        let root = tempdir().unwrap();
        let src = root.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.ts"), "export const a = 1;").unwrap();

        let nm = root.path().join("node_modules").join("pkg");
        fs::create_dir_all(&nm).unwrap();
        fs::write(nm.join("index.js"), "module.exports = {};").unwrap();

        let dotdir = root.path().join(".cache");
        fs::create_dir_all(&dotdir).unwrap();
        fs::write(dotdir.join("b.ts"), "export const b = 2;").unwrap();

        let files = discover_source_files(root.path(), root.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root.path()).unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().any(|n| n.ends_with("src/a.ts")));
        assert!(!names.iter().any(|n| n.contains("node_modules")));
        assert!(!names.iter().any(|n| n.contains(".cache")));
    }
}
