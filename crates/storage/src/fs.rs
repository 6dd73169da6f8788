//! Filesystem storage backend
//!
//! Keys map directly onto paths under the backend root; prefixes are
//! directories. Writes go through a temp file in the target directory
//! followed by a rename, so a concurrent reader never observes a torn
//! record file. Temp files are dot-prefixed and skipped by listings.

use shelf_core::{Result, StorageBackend};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::UNIX_EPOCH;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Directory-backed storage rooted at a single path
#[derive(Debug)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// Open a backend rooted at `root`, creating the directory if needed
    ///
    /// # Errors
    /// Returns an I/O error if the root cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        tracing::debug!(root = %root.display(), "filesystem backend opened");
        Ok(FsBackend { root })
    }

    /// The backend's root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in key.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    fn list_dir(&self, prefix: &str, want_dirs: bool) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(self.path_for(prefix))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if entry.file_type()?.is_dir() == want_dirs {
                out.push(name);
            }
        }
        Ok(out)
    }
}

impl StorageBackend for FsBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        let dir = path.parent().unwrap_or(&self.root);
        let tmp_name = format!(
            ".{}.tmp-{}",
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        let tmp = dir.join(tmp_name);
        fs::write(&tmp, bytes)?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path_for(key).is_file())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.list_dir(prefix, false)
    }

    fn stamp(&self, key: &str) -> Result<Option<u64>> {
        match fs::metadata(self.path_for(key)) {
            Ok(meta) => {
                let mtime = meta
                    .modified()?
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0);
                // Fold in the length so a same-mtime rewrite of different
                // size still changes the stamp.
                Ok(Some(mtime.wrapping_mul(31).wrapping_add(meta.len())))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn make_prefix(&self, prefix: &str) -> Result<()> {
        fs::create_dir_all(self.path_for(prefix))?;
        Ok(())
    }

    fn prefix_exists(&self, prefix: &str) -> Result<bool> {
        Ok(self.path_for(prefix).is_dir())
    }

    fn drop_prefix(&self, prefix: &str) -> Result<()> {
        match fs::remove_dir_all(self.path_for(prefix)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>> {
        self.list_dir(prefix, true)
    }
}
