use std::path::{Path, PathBuf};

/// Suffix of every artifact file; anything else in a backup directory is a
/// stray file and is ignored by the store.
pub const ARTIFACT_SUFFIX: &str = ".sql";

/// One completed backup file.
///
/// The creation timestamp (epoch milliseconds) embedded in the file name is
/// both identity and sort key. Artifacts are immutable once created; they are
/// only ever deleted, never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub created_at_ms: i64,
    pub size_bytes: u64,
    pub path: PathBuf,
}

impl Artifact {
    pub fn file_name(&self) -> String {
        artifact_file_name(self.created_at_ms)
    }

    /// Owning schedule's storage directory.
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Canonical artifact file name for a creation timestamp.
pub fn artifact_file_name(created_at_ms: i64) -> String {
    format!("{created_at_ms}{ARTIFACT_SUFFIX}")
}

/// Parses a directory entry name back into a creation timestamp.
///
/// Returns `None` for anything that is not `<digits>.sql`, including
/// in-flight `.part` files and stray files dropped into the directory.
pub fn parse_artifact_name(name: &str) -> Option<i64> {
    let stem = name.strip_suffix(ARTIFACT_SUFFIX)?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
