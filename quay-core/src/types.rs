//! Domain types for quay jobs.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem
//! paths. All types are serializable/deserializable via serde + serde_json.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a background job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobName(pub String);

impl fmt::Display for JobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for JobName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A strongly-typed identifier for a single job run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The category of a job, as discovered by the outer job manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    #[default]
    Triggered,
    Continuous,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::Triggered => write!(f, "triggered"),
            JobType::Continuous => write!(f, "continuous"),
        }
    }
}

/// Lifecycle status of a job instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Initializing,
    Running,
    /// The run completed with exit code zero.
    Success,
    /// The run completed with a non-zero exit code.
    Failed,
    /// The run was cut short by an external abort request.
    Stopped,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Initializing => write!(f, "initializing"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Stopped => write!(f, "stopped"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Descriptor of the host a job executes on.
///
/// `default_in_place` is the inferred copy-mode default used when the job
/// settings carry no explicit override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionHost {
    pub descriptor: String,
    #[serde(default)]
    pub default_in_place: bool,
}

impl Default for ExecutionHost {
    fn default() -> Self {
        Self {
            descriptor: "local".to_owned(),
            default_in_place: false,
        }
    }
}

/// Per-job settings supplied by the outer job manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobSettings {
    /// Explicit in-place override; `None` defers to the execution host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_place: Option<bool>,
    /// Idle timeout exported to the child; enforced by the external scheduler.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

/// A background job as discovered by the outer job manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: JobName,
    /// Absolute path to the job's entry-point script inside the source tree.
    pub script_path: PathBuf,
    /// Program invoked to run the job (script interpreter or the script itself).
    pub run_command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    pub job_type: JobType,
    #[serde(default)]
    pub host: ExecutionHost,
    #[serde(default)]
    pub settings: JobSettings,
}

impl JobDefinition {
    /// The canonical source directory: the parent of the entry-point script.
    pub fn source_dir(&self) -> PathBuf {
        self.script_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.script_path.clone())
    }

    /// Extension of the entry-point script (empty when absent), reported in
    /// the started telemetry event.
    pub fn script_extension(&self) -> String {
        self.script_path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default()
    }

    /// Copy mode for this refresh: explicit override, else the host default.
    pub fn runs_in_place(&self) -> bool {
        self.settings.in_place.unwrap_or(self.host.default_in_place)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
