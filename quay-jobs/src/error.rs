//! Error types for quay-jobs.

use std::path::PathBuf;

use thiserror::Error;

use quay_sync::SyncError;

/// All errors that can arise from job supervision and working-copy refresh.
#[derive(Debug, Error)]
pub enum JobsError {
    /// An error from the snapshot-diff sync layer.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The job's entry-point script does not exist. Fatal for the activation.
    #[error("job script not found: {path}")]
    ScriptMissing { path: PathBuf },

    /// The job name does not match its source directory. Fatal for the activation.
    #[error("job name mismatch: expected '{expected}', source directory is '{actual}'")]
    NameMismatch { expected: String, actual: String },

    /// No working directory is available; the job is unrunnable this cycle.
    #[error("no working directory established for job '{job}'")]
    WorkingCopyUnavailable { job: String },

    /// The child process could not be spawned.
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`JobsError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> JobsError {
    JobsError::Io {
        path: path.into(),
        source,
    }
}
