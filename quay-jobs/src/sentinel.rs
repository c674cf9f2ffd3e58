//! Shutdown sentinel: a file whose existence signals an out-of-band stop
//! request to the running job process.
//!
//! The location is recreated at the start of every refresh, so callers must
//! capture the path at run start rather than re-resolving it later. The
//! payload is a timestamp string; its content is otherwise ignored.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;

use quay_core::JobName;

use crate::error::{io_err, JobsError};
use crate::paths;

#[derive(Debug, Clone)]
pub struct ShutdownSentinel {
    path: PathBuf,
}

impl ShutdownSentinel {
    pub fn new(data: &Path, name: &JobName) -> Self {
        Self {
            path: paths::sentinel_path(data, name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clear any stale sentinel from a prior cycle and ensure its directory
    /// exists. Called at the start of every refresh.
    pub fn reset(&self) -> Result<(), JobsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&self.path, err)),
        }
    }

    /// Request a shutdown by writing the current UTC timestamp.
    pub fn notify(&self) -> Result<(), JobsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        std::fs::write(&self.path, Utc::now().to_rfc3339()).map_err(|e| io_err(&self.path, e))
    }

    pub fn is_signalled(&self) -> bool {
        self.path.exists()
    }
}
