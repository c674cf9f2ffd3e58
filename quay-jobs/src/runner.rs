//! Per-job runner: owns one job's long-lived state (working copy, sentinel,
//! last status) and drives a full activation cycle from validation through
//! refresh to supervised execution.
//!
//! The external scheduler owns triggering and serializes activations per job
//! name; the runner assumes `&mut self` access means exclusive access.

use std::sync::Arc;

use quay_core::{
    AbortSignal, JobDefinition, JobLogger, JobStatus, RetryPolicy, RunId, SettingsStore,
    TelemetrySink, TraceListenerRegistry,
};

use crate::error::JobsError;
use crate::paths::{self, HostPaths};
use crate::reaper::{kill_all_for_job, ProcessInspector};
use crate::sentinel::ShutdownSentinel;
use crate::supervisor::{self, RunOutcome, RunRequest};
use crate::working_copy::{RefreshContext, RefreshOutcome, WorkingCopyManager};

pub struct JobRunner {
    job: JobDefinition,
    host_paths: HostPaths,
    working_copy: WorkingCopyManager,
    sentinel: ShutdownSentinel,
    inspector: Arc<dyn ProcessInspector>,
    settings: SettingsStore,
    listeners: TraceListenerRegistry,
    retry: RetryPolicy,
    status: JobStatus,
}

impl JobRunner {
    pub fn new(
        job: JobDefinition,
        host_paths: HostPaths,
        inspector: Arc<dyn ProcessInspector>,
        settings: SettingsStore,
        listeners: TraceListenerRegistry,
    ) -> Self {
        let working_copy = WorkingCopyManager::new(&host_paths.temp);
        let sentinel = ShutdownSentinel::new(&host_paths.data, &job.name);
        Self {
            job,
            host_paths,
            working_copy,
            sentinel,
            inspector,
            settings,
            listeners,
            retry: RetryPolicy::default(),
            status: JobStatus::Initializing,
        }
    }

    pub fn job(&self) -> &JobDefinition {
        &self.job
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn sentinel(&self) -> &ShutdownSentinel {
        &self.sentinel
    }

    /// The marker variable tagging every process this job spawns.
    pub fn job_environment_key(&self) -> String {
        paths::job_environment_key(&self.job.name)
    }

    /// Validate the job definition and establish its first working copy.
    ///
    /// Validation failures are fatal for the activation: a missing entry
    /// point or a name that disagrees with the source directory means the
    /// definition is stale and must be re-discovered.
    pub fn initialize_job_instance(
        &mut self,
        logger: &dyn JobLogger,
        telemetry: &dyn TelemetrySink,
    ) -> Result<RefreshOutcome, JobsError> {
        match self
            .validate()
            .and_then(|()| self.refresh(logger, telemetry))
        {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.status = JobStatus::Failed;
                Err(err)
            }
        }
    }

    /// Execute one full activation: refresh the working copy, reap orphans,
    /// then run the job under supervision until it exits or is aborted.
    pub fn run_job_instance(
        &mut self,
        logger: Arc<dyn JobLogger>,
        telemetry: Arc<dyn TelemetrySink>,
        run_id: RunId,
        trigger: String,
        port: Option<u16>,
        abort: &AbortSignal,
    ) -> Result<RunOutcome, JobsError> {
        self.status = JobStatus::Initializing;
        // A failed prologue disables the job for this cycle; the status must
        // say so, not linger at initializing.
        if let Err(err) = self
            .validate()
            .and_then(|()| self.refresh(&*logger, &*telemetry).map(drop))
        {
            self.status = JobStatus::Failed;
            return Err(err);
        }

        // The refresh reaps on the mutation paths; the unchanged fast path
        // still needs a sweep so two activations never overlap.
        kill_all_for_job(&*self.inspector, &self.job.name, &*logger);

        let working_dir = self
            .working_copy
            .working_dir()
            .ok_or_else(|| JobsError::WorkingCopyUnavailable {
                job: self.job.name.to_string(),
            })?
            .to_path_buf();

        self.status = JobStatus::Running;
        let request = RunRequest {
            job: &self.job,
            working_dir: &working_dir,
            root_path: &self.host_paths.root,
            data_path: &self.host_paths.data,
            run_id,
            trigger,
            port,
            sentinel: Some(self.sentinel.path().to_path_buf()),
            site_mode: self.settings.site_mode.clone(),
        };
        let outcome = match supervisor::run(request, logger, telemetry, abort) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.status = JobStatus::Failed;
                return Err(err);
            }
        };
        self.status = outcome.status.clone();
        Ok(outcome)
    }

    /// Best-effort kill of every process from prior activations of this job.
    /// Never fails; per-process problems are logged and skipped.
    pub fn safe_kill_all_running_job_instances(&self, logger: &dyn JobLogger) -> usize {
        kill_all_for_job(&*self.inspector, &self.job.name, logger)
    }

    /// Ask a running instance to stop by raising the shutdown sentinel.
    pub fn notify_shutdown_job(&self) -> Result<(), JobsError> {
        self.sentinel.notify()
    }

    fn refresh(
        &mut self,
        logger: &dyn JobLogger,
        telemetry: &dyn TelemetrySink,
    ) -> Result<RefreshOutcome, JobsError> {
        // Every refresh starts from a cleared sentinel location; a stale
        // stop request must not leak into the run about to begin.
        self.sentinel.reset()?;
        let ctx = RefreshContext {
            inspector: &*self.inspector,
            logger,
            telemetry,
            retry: &self.retry,
            settings: &self.settings,
            listeners: &self.listeners,
        };
        self.working_copy.refresh(&self.job, &ctx)
    }

    fn validate(&self) -> Result<(), JobsError> {
        if !self.job.script_path.is_file() {
            return Err(JobsError::ScriptMissing {
                path: self.job.script_path.clone(),
            });
        }
        let source = self.job.source_dir();
        let actual = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !actual.eq_ignore_ascii_case(&self.job.name.0) {
            return Err(JobsError::NameMismatch {
                expected: self.job.name.to_string(),
                actual,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
