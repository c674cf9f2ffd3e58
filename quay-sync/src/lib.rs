//! # quay-sync
//!
//! Snapshot-diff synchronization for job working copies.
//!
//! Call [`DirSnapshot::build`] to capture a tree, [`diff_snapshots`] to
//! compute the delta against a destination and a retained prior-source
//! baseline, and [`apply_diff`] (or [`copy_tree`] on first activation) to
//! mutate the destination minimally.

pub mod apply;
pub mod diff;
pub mod error;
pub mod snapshot;

pub use apply::{apply_diff, copy_tree};
pub use diff::{diff_snapshots, TreeDiff};
pub use error::SyncError;
pub use snapshot::{DirEntry, DirSnapshot, SnapshotKey};
