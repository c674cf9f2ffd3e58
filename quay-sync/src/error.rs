//! Error types for quay-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from snapshot and sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The snapshot root does not exist; the caller decides the fallback.
    #[error("snapshot root not found: {path}")]
    RootNotFound { path: PathBuf },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
