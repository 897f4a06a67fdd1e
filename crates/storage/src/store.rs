use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use dbkeeper_core::{parse_artifact_name, Artifact};
use tracing::{debug, warn};

/// Directory-backed view of backup artifacts.
///
/// The directory listing *is* the retention state: there is no index file and
/// nothing to recover after a crash. Every operation re-reads the directory,
/// since files may appear or disappear underneath us (other schedules evict
/// from the shared pool, operators drop stray files in).
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactStore;

impl ArtifactStore {
    pub fn new() -> Self {
        Self
    }

    /// Lists the artifacts in `directory`, newest first.
    ///
    /// Entries whose names do not parse as `<millis>.sql` are skipped, never
    /// fatal: `.part` files belong to an in-flight dump and anything else is
    /// a stray file.
    pub fn list(&self, directory: &Path) -> Result<Vec<Artifact>> {
        self.ensure_directory(directory)?;
        let entries = fs::read_dir(directory)
            .with_context(|| format!("list backup directory {}", directory.display()))?;

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry =
                entry.with_context(|| format!("read entry in {}", directory.display()))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                warn!(directory = %directory.display(), "skipping non-utf8 file name");
                continue;
            };
            let Some(created_at_ms) = parse_artifact_name(name) else {
                if name.ends_with(".part") {
                    debug!(directory = %directory.display(), name, "skipping in-flight dump");
                } else {
                    warn!(directory = %directory.display(), name, "skipping non-artifact file");
                }
                continue;
            };
            let metadata = match entry.metadata() {
                Ok(m) => m,
                // Deleted between readdir and stat; the next list won't see it.
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("stat artifact {}", entry.path().display()))
                }
            };
            artifacts.push(Artifact {
                created_at_ms,
                size_bytes: metadata.len(),
                path: entry.path(),
            });
        }
        artifacts.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        Ok(artifacts)
    }

    /// Fresh size of an artifact file.
    pub fn size_of(&self, artifact: &Artifact) -> Result<u64> {
        let metadata = fs::metadata(&artifact.path)
            .with_context(|| format!("stat artifact {}", artifact.path.display()))?;
        Ok(metadata.len())
    }

    /// Deletes an artifact file.
    ///
    /// Idempotent: an already-missing file is treated as satisfied, since
    /// another schedule's eviction may have removed it first.
    pub fn delete(&self, artifact: &Artifact) -> Result<()> {
        match fs::remove_file(&artifact.path) {
            Ok(()) => {
                debug!(path = %artifact.path.display(), "deleted artifact");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("delete artifact {}", artifact.path.display()))
            }
        }
    }

    /// Creates the directory if absent. Losing a creation race to another
    /// task is not an error.
    pub fn ensure_directory(&self, directory: &Path) -> Result<()> {
        fs::create_dir_all(directory)
            .with_context(|| format!("create backup directory {}", directory.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbkeeper_core::artifact_file_name;
    use std::path::PathBuf;

    fn write_artifact(dir: &Path, created_at_ms: i64, bytes: &[u8]) {
        fs::write(dir.join(artifact_file_name(created_at_ms)), bytes).unwrap();
    }

    #[test]
    fn lists_newest_first_and_skips_strays() {
        let tmp = tempfile::tempdir().unwrap();
        write_artifact(tmp.path(), 100, b"a");
        write_artifact(tmp.path(), 300, b"abc");
        write_artifact(tmp.path(), 200, b"ab");
        fs::write(tmp.path().join("README.txt"), b"not a backup").unwrap();
        fs::write(tmp.path().join("400.sql.part"), b"half a dump").unwrap();

        let store = ArtifactStore::new();
        let listed = store.list(tmp.path()).unwrap();
        let timestamps: Vec<i64> = listed.iter().map(|a| a.created_at_ms).collect();
        assert_eq!(timestamps, vec![300, 200, 100]);
        assert_eq!(listed[0].size_bytes, 3);
    }

    #[test]
    fn list_reflects_external_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new();
        assert!(store.list(tmp.path()).unwrap().is_empty());

        write_artifact(tmp.path(), 500, b"x");
        assert_eq!(store.list(tmp.path()).unwrap().len(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        write_artifact(tmp.path(), 100, b"a");
        let store = ArtifactStore::new();
        let listed = store.list(tmp.path()).unwrap();

        store.delete(&listed[0]).unwrap();
        store.delete(&listed[0]).unwrap();
        assert!(store.list(tmp.path()).unwrap().is_empty());

        let ghost = Artifact {
            created_at_ms: 999,
            size_bytes: 0,
            path: tmp.path().join("999.sql"),
        };
        store.delete(&ghost).unwrap();
    }

    #[test]
    fn ensure_directory_tolerates_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir: PathBuf = tmp.path().join("nested/backups");
        let store = ArtifactStore::new();
        store.ensure_directory(&dir).unwrap();
        store.ensure_directory(&dir).unwrap();
        assert!(dir.is_dir());
    }

    #[test]
    fn list_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("fresh");
        let store = ArtifactStore::new();
        assert!(store.list(&dir).unwrap().is_empty());
        assert!(dir.is_dir());
    }
}
