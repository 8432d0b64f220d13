use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{CdrError, Result};
use crate::sanitize;

/// The file-transfer endpoint audio deliveries arrive on.
pub trait FileTransfer: Send + Sync {
    /// File names in a remote directory, sorted.
    fn list(&self, dir: &str) -> Result<Vec<String>>;

    /// Copies a remote file to `local`, returning the bytes copied.
    fn fetch(&self, remote: &str, local: &Path) -> Result<u64>;

    fn put(&self, local: &Path, remote: &str) -> Result<u64>;
}

/// A transfer endpoint backed by a local directory, for mirrored drops and
/// tests.
#[derive(Debug, Clone)]
pub struct LocalTransfer {
    root: PathBuf,
    timeout: Duration,
}

impl LocalTransfer {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    /// Maps a remote path under the root. Absolute paths and `..` are
    /// rejected.
    fn resolve(&self, remote: &str) -> Result<PathBuf> {
        let relative = Path::new(remote.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(CdrError::InvalidInput(format!("remote path '{}' leaves the drop", remote)));
        }
        Ok(self.root.join(relative))
    }

    fn within_deadline<T>(&self, started: Instant, what: &str, value: T) -> Result<T> {
        if started.elapsed() > self.timeout {
            return Err(CdrError::Timeout(format!("{} took longer than {:?}", what, self.timeout)));
        }
        Ok(value)
    }
}

impl FileTransfer for LocalTransfer {
    fn list(&self, dir: &str) -> Result<Vec<String>> {
        let started = Instant::now();
        let path = self.resolve(dir)?;
        let mut names = Vec::new();
        for entry in fs::read_dir(&path).map_err(|e| CdrError::io(&path, e))? {
            let entry = entry.map_err(|e| CdrError::io(&path, e))?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        self.within_deadline(started, "listing", names)
    }

    fn fetch(&self, remote: &str, local: &Path) -> Result<u64> {
        let started = Instant::now();
        let source = self.resolve(remote)?;
        let copied = fs::copy(&source, local).map_err(|e| CdrError::io(&source, e))?;
        log::debug!("Fetched {} ({} bytes)", sanitize::redact_path(Path::new(remote)), copied);
        self.within_deadline(started, "fetch", copied)
    }

    fn put(&self, local: &Path, remote: &str) -> Result<u64> {
        let started = Instant::now();
        let target = self.resolve(remote)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| CdrError::io(parent, e))?;
        }
        let copied = fs::copy(local, &target).map_err(|e| CdrError::io(local, e))?;
        self.within_deadline(started, "upload", copied)
    }
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;

    use super::*;

    #[test]
    fn test_put_list_fetch() {
        let drop = assert_fs::TempDir::new().unwrap();
        let work = assert_fs::TempDir::new().unwrap();
        let local = work.child("Week_2024_15.zip");
        local.write_binary(b"PK").unwrap();

        let transfer = LocalTransfer::new(drop.path(), Duration::from_secs(30));
        assert_eq!(transfer.put(local.path(), "/audio/Week_2024_15.zip").unwrap(), 2);
        assert!(drop.child("audio/Week_2024_15.zip").path().exists());
        assert_eq!(transfer.list("audio").unwrap(), vec!["Week_2024_15.zip"]);

        let copy = work.child("copy.zip");
        transfer.fetch("audio/Week_2024_15.zip", copy.path()).unwrap();
        assert_eq!(std::fs::read(copy.path()).unwrap(), b"PK");
    }

    #[test]
    fn test_rejects_escape() {
        let transfer = LocalTransfer::new("/tmp/drop", Duration::from_secs(1));
        let err = transfer.list("../etc").unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[test]
    fn test_zero_timeout_reports_timeout() {
        let drop = assert_fs::TempDir::new().unwrap();
        drop.child("a.txt").write_str("x").unwrap();
        let transfer = LocalTransfer::new(drop.path(), Duration::ZERO);
        let err = transfer.list("").unwrap_err();
        assert_eq!(err.kind(), "Timeout");
    }
}
