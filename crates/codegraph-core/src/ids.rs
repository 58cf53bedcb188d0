use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Deterministic 4-character base-36 fingerprint of an absolute workspace
/// root path. Two sessions bound to the same path always derive the same
/// `projectId`; it is persisted (see `WorkspaceMetadata`) so it survives
/// process restarts even without that file (it can always be recomputed).
pub fn project_fingerprint(absolute_root: &Path) -> String {
    let normalized = absolute_root.to_string_lossy().replace('\\', "/");
    let digest = Sha256::digest(normalized.as_bytes());
    // Fold the 32-byte digest into a single u64 and map to base36, 4 chars.
    let mut acc: u64 = 0;
    for chunk in digest.chunks(8) {
        let mut buf = [0u8; 8];
        buf[..chunk.len()].copy_from_slice(chunk);
        acc ^= u64::from_le_bytes(buf);
    }
    let mut out = [0u8; 4];
    for slot in out.iter_mut().rev() {
        *slot = BASE36[(acc % 36) as usize];
        acc /= 36;
    }
    String::from_utf8(out.to_vec()).expect("base36 alphabet is ascii")
}

/// `<projectId>:<kind>:<localKey>` — globally unique within a deployment for
/// as long as the workspace exists. Immutable: renames are delete+insert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ScopedId(String);

impl ScopedId {
    pub fn new(project_id: &str, kind: &str, local_key: &str) -> Self {
        Self(format!("{project_id}:{kind}:{local_key}"))
    }

    pub fn opaque(project_id: &str, kind: &str) -> Self {
        Self::new(project_id, kind, &uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn project_id(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.0.split(':').nth(1).unwrap_or_default()
    }

    pub fn local_key(&self) -> &str {
        self.0.splitn(3, ':').nth(2).unwrap_or_default()
    }
}

impl fmt::Display for ScopedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ScopedId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ScopedId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Path canonicalization per invariant 3: workspace-relative, `/`-separated.
pub fn canonical_relative_path(workspace_root: &Path, file: &Path) -> String {
    let rel = file.strip_prefix(workspace_root).unwrap_or(file);
    rel.to_string_lossy().replace('\\', "/")
}

/// 64-char hex content hash, used for `FILE.contentHash` and incremental diffing.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_four_base36_chars() {
        let fp = project_fingerprint(Path::new("/home/user/project"));
        assert_eq!(fp.len(), 4);
        assert!(fp.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = project_fingerprint(Path::new("/tmp/workspace"));
        let b = project_fingerprint(Path::new("/tmp/workspace"));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_across_paths() {
        let a = project_fingerprint(Path::new("/tmp/workspace-a"));
        let b = project_fingerprint(Path::new("/tmp/workspace-b"));
        assert_ne!(a, b);
    }

    #[test]
    fn content_hash_is_64_hex_chars() {
        let h1 = content_hash(b"");
        let h2 = content_hash(b"some file contents\n");
        assert_eq!(h1.len(), 64);
        assert_eq!(h2.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn scoped_id_parts_roundtrip() {
        let id = ScopedId::new("ab12", "function", "src/a.ts:foo:10");
        assert_eq!(id.project_id(), "ab12");
        assert_eq!(id.kind(), "function");
        assert_eq!(id.local_key(), "src/a.ts:foo:10");
    }
}
