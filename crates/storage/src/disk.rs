use std::path::Path;

use dbkeeper_core::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskStats {
    pub free_bytes: u64,
    pub total_bytes: u64,
}

/// Free and total bytes for the volume holding the backup pool.
///
/// A probe failure fails the attempt; it is never treated as "space is fine".
pub trait DiskSpaceProbe: Send + Sync {
    fn stats(&self, mount_point: &Path) -> Result<DiskStats, EngineError>;
}

/// statvfs(3)-backed probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsProbe;

#[cfg(unix)]
impl DiskSpaceProbe for StatvfsProbe {
    fn stats(&self, mount_point: &Path) -> Result<DiskStats, EngineError> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let path = CString::new(mount_point.as_os_str().as_bytes()).map_err(|_| {
            EngineError::Probe(format!(
                "mount point {} contains a NUL byte",
                mount_point.display()
            ))
        })?;
        let mut vfs: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(path.as_ptr(), &mut vfs) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            return Err(EngineError::Probe(format!(
                "statvfs({}): {err}",
                mount_point.display()
            )));
        }
        // f_bavail: blocks available to unprivileged callers, which is what
        // a dump actually gets to write into.
        let frsize = vfs.f_frsize as u64;
        Ok(DiskStats {
            free_bytes: vfs.f_bavail as u64 * frsize,
            total_bytes: vfs.f_blocks as u64 * frsize,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn statvfs_reports_plausible_numbers() {
        let stats = StatvfsProbe.stats(Path::new("/")).unwrap();
        assert!(stats.total_bytes > 0);
        assert!(stats.free_bytes <= stats.total_bytes);
    }

    #[test]
    fn statvfs_fails_for_missing_mount_point() {
        let err = StatvfsProbe
            .stats(Path::new("/definitely/not/a/mount/point"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Probe(_)));
    }
}
