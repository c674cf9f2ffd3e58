//! Destination mutation: selective diff application and the whole-tree
//! copy fallback used on first activation.
//!
//! Copies preserve the source file's modified timestamp, otherwise the next
//! diff cycle would see every copied file as changed again.

use std::io::ErrorKind;
use std::path::Path;

use filetime::FileTime;

use crate::diff::TreeDiff;
use crate::error::{io_err, SyncError};

/// Apply a diff's remove and copy sets against `dest_root`.
///
/// Removals run first. Both phases are idempotent: a missing removal target
/// is not an error, directory creation tolerates existing directories, and
/// file copies overwrite unconditionally. There is no rollback; a
/// mid-operation failure leaves the destination partially synced and the
/// caller treats the whole refresh as failed.
pub fn apply_diff(diff: &TreeDiff, source_root: &Path, dest_root: &Path) -> Result<(), SyncError> {
    for entry in &diff.remove {
        let target = dest_root.join(&entry.rel_path);
        let removed = if entry.is_dir {
            std::fs::remove_dir_all(&target)
        } else {
            std::fs::remove_file(&target)
        };
        match removed {
            Ok(()) => tracing::debug!("removed {} {}", entry.kind_label(), target.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(io_err(&target, err)),
        }
    }

    for entry in &diff.copy {
        let target = dest_root.join(&entry.rel_path);
        if entry.is_dir {
            std::fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
        } else {
            let source = source_root.join(&entry.rel_path);
            copy_file(&source, &target)?;
        }
    }

    Ok(())
}

/// Recursively copy `source_root` into `dest_root` (created if absent).
///
/// The full-copy fallback for first activations and isolated-instance
/// seeding. Existing destination files are overwritten.
pub fn copy_tree(source_root: &Path, dest_root: &Path) -> Result<(), SyncError> {
    if !source_root.exists() {
        return Err(SyncError::RootNotFound {
            path: source_root.to_path_buf(),
        });
    }
    std::fs::create_dir_all(dest_root).map_err(|e| io_err(dest_root, e))?;

    let mut pending = vec![source_root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let read = std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))?;
        for item in read {
            let item = item.map_err(|e| io_err(&dir, e))?;
            let path = item.path();
            let rel = path.strip_prefix(source_root).unwrap_or(path.as_path());
            let target = dest_root.join(rel);
            let file_type = item.file_type().map_err(|e| io_err(&path, e))?;
            if file_type.is_dir() {
                std::fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
                pending.push(path);
            } else {
                copy_file(&path, &target)?;
            }
        }
    }

    Ok(())
}

/// Copy one file, creating parents, overwriting, and carrying the source
/// mtime over to the destination.
fn copy_file(source: &Path, target: &Path) -> Result<(), SyncError> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::copy(source, target).map_err(|e| io_err(target, e))?;

    let meta = std::fs::metadata(source).map_err(|e| io_err(source, e))?;
    let mtime = FileTime::from_last_modification_time(&meta);
    filetime::set_file_mtime(target, mtime).map_err(|e| io_err(target, e))?;

    tracing::debug!("copied {} -> {}", source.display(), target.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
