//! Host-side dependency cache shared by all sandboxes.
//!
//! Each language gets its own directory under the cache root, mounted at the
//! package manager's cache path inside the container. Entries are only ever
//! added by package managers, which lock their own cache, so the engine never
//! locks it. Deleting the whole tree is always safe.

use crate::registry::LanguageProfile;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct DependencyCache {
    root: PathBuf,
}

/// Summary of one language's cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub language_id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl DependencyCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir_for(&self, language_id: &str) -> PathBuf {
        self.root.join(language_id)
    }

    /// Host directory to mount for `profile`, created if absent.
    /// Profiles without an in-image cache path get no mount.
    pub fn ensure_dir(&self, profile: &LanguageProfile) -> io::Result<Option<PathBuf>> {
        if profile.cache_path.is_none() {
            return Ok(None);
        }
        let dir = self.dir_for(&profile.language_id);
        fs::create_dir_all(&dir)?;
        let dir = fs::canonicalize(&dir)?;
        Ok(Some(dir))
    }

    pub fn entries(&self) -> io::Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        let read_dir = match fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(entries),
            Err(err) => return Err(err),
        };

        for entry in read_dir {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let path = entry.path();
            entries.push(CacheEntry {
                language_id: entry.file_name().to_string_lossy().into_owned(),
                size_bytes: dir_size(&path),
                path,
            });
        }
        entries.sort_by(|a, b| a.language_id.cmp(&b.language_id));
        Ok(entries)
    }

    pub fn total_size(&self) -> io::Result<u64> {
        Ok(self.entries()?.iter().map(|e| e.size_bytes).sum())
    }

    /// Removes every cached artifact. A missing root is not an error.
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                log::info!("Cleared dependency cache at {}", self.root.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

// Unreadable entries (root-owned files written by containers) count as zero.
fn dir_size(path: &Path) -> u64 {
    let Ok(read_dir) = fs::read_dir(path) else {
        return 0;
    };
    read_dir
        .flatten()
        .map(|entry| match entry.file_type() {
            Ok(kind) if kind.is_dir() => dir_size(&entry.path()),
            Ok(kind) if kind.is_file() => entry.metadata().map(|m| m.len()).unwrap_or(0),
            _ => 0,
        })
        .sum()
}
