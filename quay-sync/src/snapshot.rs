//! Directory snapshots: flat relative-path → metadata maps.
//!
//! Keys are case-insensitive and separator-normalized regardless of the
//! underlying filesystem, so a case-only rename never produces a diff.
//! Snapshots are ephemeral and rebuilt on every diff cycle; only the
//! prior-source snapshot retained by the working-copy manager outlives one.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Map identity for one tree entry: the relative path, lowercased, with
/// separators normalized to `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotKey(String);

impl SnapshotKey {
    pub fn from_relative(rel_path: &Path) -> Self {
        let mut normalized = String::new();
        for component in rel_path.components() {
            if !normalized.is_empty() {
                normalized.push('/');
            }
            normalized.push_str(&component.as_os_str().to_string_lossy().to_lowercase());
        }
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Metadata for one file or directory inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Path relative to the snapshot root, original casing preserved.
    pub rel_path: PathBuf,
    pub is_dir: bool,
    pub modified: DateTime<Utc>,
}

impl DirEntry {
    pub fn key(&self) -> SnapshotKey {
        SnapshotKey::from_relative(&self.rel_path)
    }

    /// Human label used in change logging: `file` or `directory`.
    pub fn kind_label(&self) -> &'static str {
        if self.is_dir {
            "directory"
        } else {
            "file"
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Flat map of every file and subdirectory reachable from one root.
///
/// Enumeration order is unspecified; consumers must not depend on it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirSnapshot {
    entries: HashMap<SnapshotKey, DirEntry>,
}

impl DirSnapshot {
    /// The empty snapshot — the initial prior-source baseline.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Recursively enumerate `root` into a snapshot.
    ///
    /// Fails with [`SyncError::RootNotFound`] when `root` is absent.
    pub fn build(root: &Path) -> Result<Self, SyncError> {
        if !root.exists() {
            return Err(SyncError::RootNotFound {
                path: root.to_path_buf(),
            });
        }

        let mut entries = HashMap::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let read = std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))?;
            for item in read {
                let item = item.map_err(|e| io_err(&dir, e))?;
                let path = item.path();
                let meta = item.metadata().map_err(|e| io_err(&path, e))?;
                let rel_path = path
                    .strip_prefix(root)
                    .unwrap_or(path.as_path())
                    .to_path_buf();
                let modified = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .map_err(|e| io_err(&path, e))?;
                let entry = DirEntry {
                    rel_path,
                    is_dir: meta.is_dir(),
                    modified,
                };
                if meta.is_dir() {
                    pending.push(path);
                }
                entries.insert(entry.key(), entry);
            }
        }

        Ok(Self { entries })
    }

    pub fn get(&self, key: &SnapshotKey) -> Option<&DirEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &SnapshotKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SnapshotKey, &DirEntry)> {
        self.entries.iter()
    }

    /// Insert an entry directly. Keys are unique; a colliding insert replaces.
    pub fn insert(&mut self, entry: DirEntry) {
        self.entries.insert(entry.key(), entry);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
