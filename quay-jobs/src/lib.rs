//! # quay-jobs
//!
//! Job-instance execution: isolated working-copy refresh via snapshot-diff
//! sync, per-job configuration patching, orphan-process reaping, and
//! supervised child execution with output streaming and abort support.
//!
//! The entry point is [`JobRunner`]: construct one per discovered job,
//! call [`JobRunner::initialize_job_instance`] once, then
//! [`JobRunner::run_job_instance`] for each activation.

pub mod config;
pub mod error;
pub mod paths;
pub mod reaper;
pub mod runner;
pub mod sentinel;
pub mod supervisor;
pub mod working_copy;

pub use config::patch_job_configs;
pub use error::JobsError;
pub use paths::HostPaths;
pub use reaper::{kill_all_for_job, ProcessHandle, ProcessInspector, SystemInspector};
pub use runner::JobRunner;
pub use sentinel::ShutdownSentinel;
pub use supervisor::{RunOutcome, RunRequest};
pub use working_copy::{RefreshContext, RefreshOutcome, WorkingCopyManager};
