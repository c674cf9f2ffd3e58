//! Path helpers and well-known environment variable names.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use quay_core::{JobName, JobType};

pub const ENV_JOB_ROOT_PATH: &str = "QUAY_JOB_ROOT_PATH";
pub const ENV_JOB_NAME: &str = "QUAY_JOB_NAME";
pub const ENV_JOB_TYPE: &str = "QUAY_JOB_TYPE";
pub const ENV_JOB_DATA_PATH: &str = "QUAY_JOB_DATA_PATH";
pub const ENV_JOB_RUN_ID: &str = "QUAY_JOB_RUN_ID";
pub const ENV_JOB_COMMAND_ARGUMENTS: &str = "QUAY_JOB_COMMAND_ARGUMENTS";
pub const ENV_JOB_PORT: &str = "QUAY_JOB_PORT";
pub const ENV_JOB_SHUTDOWN_FILE: &str = "QUAY_JOB_SHUTDOWN_FILE";

/// Prefix for the per-job marker variable the orphan reaper looks for.
pub const JOB_MARKER_PREFIX: &str = "QUAY_JOB_RUNNING_";

/// Suffix of per-job configuration files patched on every resync.
pub const JOB_CONFIG_SUFFIX: &str = ".jobconfig.json";

/// Filesystem roots supplied by the outer host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    /// Root of the deployment the job belongs to.
    pub root: PathBuf,
    /// Durable per-job data area (sentinels, run artifacts).
    pub data: PathBuf,
    /// Scratch area for isolated working-copy instances.
    pub temp: PathBuf,
}

impl HostPaths {
    /// Conventional layout with data and temp areas under one root.
    pub fn under_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data: root.join("data"),
            temp: root.join("temp"),
            root,
        }
    }
}

/// Stable marker variable name for recognizing a job's spawned processes.
///
/// Uppercased job name, with anything outside `[A-Za-z0-9]` folded to `_`.
pub fn job_environment_key(name: &JobName) -> String {
    let sanitized: String = name
        .0
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{JOB_MARKER_PREFIX}{sanitized}")
}

/// `<root>/jobs/<type>/<name>` — conventional source directory for a job
/// discovered under the deployment root.
pub fn job_source_root(root: &Path, job_type: JobType, name: &JobName) -> PathBuf {
    root.join("jobs").join(job_type.to_string()).join(&name.0)
}

/// `<temp>/quay-jobs/<job>/` — parent of all isolated instances for a job.
pub fn instances_root(temp: &Path, name: &JobName) -> PathBuf {
    temp.join("quay-jobs").join(&name.0)
}

/// Allocate a fresh isolated instance path for one refresh cycle.
///
/// Uniqueness per activation is enough; the external scheduler serializes
/// activations per job name.
pub fn allocate_instance_dir(temp: &Path, name: &JobName) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    instances_root(temp, name).join(format!("{nanos:x}"))
}

/// `<data>/shutdown/<job>.stop` — the shutdown sentinel location.
pub fn sentinel_path(data: &Path, name: &JobName) -> PathBuf {
    data.join("shutdown").join(format!("{}.stop", name.0))
}
