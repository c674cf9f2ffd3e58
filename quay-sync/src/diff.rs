//! Three-way tree diff: current source, current destination, and the
//! prior-source snapshot retained from the last successful sync.
//!
//! Additions and modifications come from comparing source to destination.
//! Deletions come *only* from comparing the prior source to the current
//! source — never from the destination — so a destination-side stray file
//! is left alone until the path reappears in (or vanishes from) the source.

use crate::snapshot::{DirEntry, DirSnapshot};

/// Delta between two trees: entries to copy and entries to remove.
///
/// The two sets are always disjoint: copy entries come from the current
/// source, remove entries from prior-source paths no longer in the source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDiff {
    pub copy: Vec<DirEntry>,
    pub remove: Vec<DirEntry>,
}

impl TreeDiff {
    pub fn changed(&self) -> bool {
        !self.copy.is_empty() || !self.remove.is_empty()
    }
}

/// Compute the copy and remove sets for one refresh cycle.
///
/// Pure function of its three snapshot arguments; the caller owns the
/// retained prior-source snapshot and passes it in explicitly.
pub fn diff_snapshots(
    source: &DirSnapshot,
    destination: &DirSnapshot,
    prior_source: &DirSnapshot,
) -> TreeDiff {
    let mut diff = TreeDiff::default();

    for (key, entry) in source.iter() {
        match destination.get(key) {
            Some(existing) => {
                // Directories are matched by presence only.
                if !entry.is_dir && entry.modified != existing.modified {
                    tracing::info!(
                        "{} {} timestamp differs",
                        entry.kind_label(),
                        entry.rel_path.display()
                    );
                    diff.copy.push(entry.clone());
                }
            }
            None => {
                tracing::info!(
                    "{} {} exists in source but not in destination",
                    entry.kind_label(),
                    entry.rel_path.display()
                );
                diff.copy.push(entry.clone());
            }
        }
    }

    for (key, entry) in prior_source.iter() {
        if !source.contains(key) {
            tracing::info!(
                "{} {} has been deleted",
                entry.kind_label(),
                entry.rel_path.display()
            );
            diff.remove.push(entry.clone());
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotKey;
    use chrono::{DateTime, Duration, Utc};
    use std::collections::BTreeSet;
    use std::path::{Path, PathBuf};

    // Fixed base so entries built by independent calls with the same
    // offset carry identical timestamps.
    fn base_time() -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::days(20_000)
    }

    fn file(rel: &str, offset_secs: i64) -> DirEntry {
        DirEntry {
            rel_path: PathBuf::from(rel),
            is_dir: false,
            modified: base_time() + Duration::seconds(offset_secs),
        }
    }

    fn dir(rel: &str) -> DirEntry {
        DirEntry {
            rel_path: PathBuf::from(rel),
            is_dir: true,
            modified: base_time(),
        }
    }

    fn snapshot(entries: Vec<DirEntry>) -> DirSnapshot {
        let mut snap = DirSnapshot::empty();
        for entry in entries {
            snap.insert(entry);
        }
        snap
    }

    #[test]
    fn identical_snapshots_produce_no_diff() {
        let base = file("test1.txt", 0);
        let source = snapshot(vec![base.clone()]);
        let destination = snapshot(vec![base.clone()]);
        let prior = snapshot(vec![base]);

        let diff = diff_snapshots(&source, &destination, &prior);
        assert!(diff.copy.is_empty());
        assert!(diff.remove.is_empty());
        assert!(!diff.changed());
    }

    #[test]
    fn timestamp_mismatch_copies_files_only() {
        let source = snapshot(vec![file("subdir/test2.txt", 60), dir("subdir")]);
        let destination = snapshot(vec![file("subdir/test2.txt", 0), dir("subdir")]);

        let diff = diff_snapshots(&source, &destination, &DirSnapshot::empty());
        assert_eq!(diff.copy.len(), 1);
        assert_eq!(diff.copy[0].rel_path, Path::new("subdir/test2.txt"));
        assert!(diff.remove.is_empty());
    }

    #[test]
    fn directory_timestamps_are_ignored() {
        let mut stale = dir("subdir");
        stale.modified = Utc::now() - Duration::hours(5);
        let source = snapshot(vec![dir("subdir")]);
        let destination = snapshot(vec![stale]);

        let diff = diff_snapshots(&source, &destination, &DirSnapshot::empty());
        assert!(!diff.changed());
    }

    #[test]
    fn source_only_paths_are_copied_unconditionally() {
        let source = snapshot(vec![file("test4.txt", 0), dir("subdir2"), file("subdir2/a.txt", 0)]);
        let destination = DirSnapshot::empty();

        let diff = diff_snapshots(&source, &destination, &DirSnapshot::empty());
        assert_eq!(diff.copy.len(), 3);
        assert!(diff.remove.is_empty());
    }

    #[test]
    fn deletions_come_from_prior_source_regardless_of_destination() {
        // test2 vanished from the source; the destination still has it but
        // the remove decision keys off the prior snapshot alone.
        let source = snapshot(vec![file("test1.txt", 0)]);
        let destination = snapshot(vec![file("test1.txt", 0), file("test2.txt", 0)]);
        let prior = snapshot(vec![file("test1.txt", 0), file("test2.txt", 0)]);

        let diff = diff_snapshots(&source, &destination, &prior);
        assert!(diff.copy.is_empty());
        assert_eq!(diff.remove.len(), 1);
        assert_eq!(diff.remove[0].rel_path, Path::new("test2.txt"));
    }

    #[test]
    fn destination_strays_without_prior_entry_are_untouched() {
        let source = snapshot(vec![file("test1.txt", 0)]);
        let destination = snapshot(vec![file("test1.txt", 0), file("stray.txt", 0)]);

        let diff = diff_snapshots(&source, &destination, &DirSnapshot::empty());
        assert!(!diff.changed(), "stray files are invisible until a full resync");
    }

    #[test]
    fn case_only_renames_produce_no_diff() {
        let source = snapshot(vec![file("TEST2.txt", 0)]);
        let mut matching = file("test2.txt", 0);
        matching.modified = source
            .get(&SnapshotKey::from_relative(Path::new("test2.txt")))
            .expect("entry")
            .modified;
        let destination = snapshot(vec![matching.clone()]);
        let prior = snapshot(vec![matching]);

        let diff = diff_snapshots(&source, &destination, &prior);
        assert!(!diff.changed());
    }

    #[test]
    fn copy_and_remove_sets_are_disjoint() {
        // Simultaneous edit, add, and delete.
        let source = snapshot(vec![file("test1.txt", 60), file("test4.txt", 0)]);
        let destination = snapshot(vec![file("test1.txt", 0), file("test2.txt", 0)]);
        let prior = snapshot(vec![file("test1.txt", 0), file("test2.txt", 0)]);

        let diff = diff_snapshots(&source, &destination, &prior);
        assert_eq!(diff.copy.len(), 2);
        assert_eq!(diff.remove.len(), 1);

        let copy_keys: BTreeSet<_> = diff.copy.iter().map(DirEntry::key).collect();
        let remove_keys: BTreeSet<_> = diff.remove.iter().map(DirEntry::key).collect();
        assert!(copy_keys.is_disjoint(&remove_keys));
    }

    #[test]
    fn deleted_directory_removes_directory_and_children() {
        let prior = snapshot(vec![
            dir("subdir"),
            file("subdir/test1.txt", 0),
            file("subdir/test2.txt", 0),
            file("subdir/test3.txt", 0),
        ]);
        let source = DirSnapshot::empty();
        let destination = prior.clone();

        let diff = diff_snapshots(&source, &destination, &prior);
        assert!(diff.copy.is_empty());
        assert_eq!(diff.remove.len(), 4);
    }
}
