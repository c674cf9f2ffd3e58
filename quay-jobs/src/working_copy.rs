//! Working-copy refresh orchestration.
//!
//! One manager per job. It owns the two pieces of long-lived refresh state:
//! the prior-source snapshot (the deletion-detection baseline, replaced only
//! after a successful sync) and the working-directory pointer. The external
//! scheduler serializes activations per job name, so neither needs a lock.

use std::path::{Path, PathBuf};

use quay_core::{
    JobDefinition, JobLogger, JobName, RetryPolicy, SettingsStore, TelemetrySink,
    TraceListenerRegistry,
};
use quay_sync::{apply_diff, copy_tree, diff_snapshots, DirSnapshot};

use crate::config::patch_job_configs;
use crate::error::JobsError;
use crate::paths::allocate_instance_dir;
use crate::reaper::{kill_all_for_job, ProcessInspector};

/// How a refresh cycle resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The job executes straight from its source directory.
    InPlace,
    /// First activation: the whole tree was copied into a fresh instance.
    FullCopy,
    /// A delta was applied onto a new instance seeded from the old one.
    Synced,
    /// Fast path: nothing changed, no I/O performed.
    Unchanged,
}

/// Collaborators a refresh needs, all owned by the caller.
pub struct RefreshContext<'a> {
    pub inspector: &'a dyn ProcessInspector,
    pub logger: &'a dyn JobLogger,
    pub telemetry: &'a dyn TelemetrySink,
    pub retry: &'a RetryPolicy,
    pub settings: &'a SettingsStore,
    pub listeners: &'a TraceListenerRegistry,
}

#[derive(Debug)]
pub struct WorkingCopyManager {
    temp: PathBuf,
    prior_source: DirSnapshot,
    working_dir: Option<PathBuf>,
}

impl WorkingCopyManager {
    pub fn new(temp: impl Into<PathBuf>) -> Self {
        Self {
            temp: temp.into(),
            prior_source: DirSnapshot::empty(),
            working_dir: None,
        }
    }

    /// The directory the job currently executes from, if runnable.
    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Bring the working copy up to date with the job's source directory.
    ///
    /// On failure the working pointer is cleared (the job is unrunnable this
    /// cycle) but the prior-source snapshot survives, so the next activation
    /// retries against the same baseline.
    pub fn refresh(
        &mut self,
        job: &JobDefinition,
        ctx: &RefreshContext<'_>,
    ) -> Result<RefreshOutcome, JobsError> {
        if job.runs_in_place() {
            // Mode is chosen once per refresh; in-place skips sync entirely
            // but still clears out stale instances holding the source tree.
            kill_all_for_job(ctx.inspector, &job.name, ctx.logger);
            self.working_dir = Some(job.source_dir());
            tracing::info!(job = %job.name, "running in place from the source directory");
            return Ok(RefreshOutcome::InPlace);
        }

        match self.refresh_isolated(job, ctx) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::error!(job = %job.name, error = %err, "working copy refresh failed");
                ctx.telemetry
                    .report_error("working copy refresh", &err.to_string());
                self.working_dir = None;
                Err(err)
            }
        }
    }

    fn refresh_isolated(
        &mut self,
        job: &JobDefinition,
        ctx: &RefreshContext<'_>,
    ) -> Result<RefreshOutcome, JobsError> {
        let source_root = job.source_dir();
        let source = DirSnapshot::build(&source_root)?;

        let Some(current) = self.working_dir.clone() else {
            // First activation (or recovery after a failed cycle): no delta
            // to compute, copy the whole tree.
            let instance = allocate_instance_dir(&self.temp, &job.name);
            ctx.retry
                .run(|| copy_tree(&source_root, &instance))
                .map_err(JobsError::from)?;
            patch_job_configs(&instance, ctx.settings, ctx.listeners, ctx.telemetry);
            tracing::info!(
                job = %job.name,
                instance = %instance.display(),
                "established working copy with a full tree copy"
            );
            self.working_dir = Some(instance);
            self.prior_source = source;
            return Ok(RefreshOutcome::FullCopy);
        };

        let destination = DirSnapshot::build(&current)?;
        let diff = diff_snapshots(&source, &destination, &self.prior_source);
        if !diff.changed() {
            return Ok(RefreshOutcome::Unchanged);
        }

        // A stale instance may hold handles into the tree about to mutate.
        kill_all_for_job(ctx.inspector, &job.name, ctx.logger);

        let instance = allocate_instance_dir(&self.temp, &job.name);
        ctx.retry
            .run(|| {
                copy_tree(&current, &instance)?;
                apply_diff(&diff, &source_root, &instance)
            })
            .map_err(JobsError::from)?;
        patch_job_configs(&instance, ctx.settings, ctx.listeners, ctx.telemetry);
        tracing::info!(
            job = %job.name,
            copied = diff.copy.len(),
            removed = diff.remove.len(),
            instance = %instance.display(),
            "synchronized working copy"
        );
        self.working_dir = Some(instance);
        self.prior_source = source;
        self.discard_instance(&current, &job.name);
        Ok(RefreshOutcome::Synced)
    }

    /// Best-effort removal of a superseded instance directory so the scratch
    /// area does not grow by one tree per resync.
    fn discard_instance(&self, old: &Path, name: &JobName) {
        // The pointer may have been the source directory after an in-place
        // cycle; only paths inside our own instance area are fair game.
        if !old.starts_with(crate::paths::instances_root(&self.temp, name)) {
            return;
        }
        match std::fs::remove_dir_all(old) {
            Ok(()) => tracing::debug!(path = %old.display(), "removed superseded instance"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                tracing::warn!(
                    path = %old.display(),
                    error = %err,
                    "could not remove superseded instance"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reaper::ProcessHandle;
    use quay_core::{
        ExecutionHost, JobName, JobSettings, JobType, NullTelemetry, RetryPolicy,
    };
    use std::collections::HashMap;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct SilentLogger;

    impl JobLogger for SilentLogger {
        fn info(&self, _message: &str) {}
        fn warn(&self, _message: &str) {}
        fn error(&self, _message: &str) {}
    }

    /// Inspector that records how many scans were requested.
    #[derive(Default)]
    struct ScanCountingInspector {
        scans: AtomicUsize,
    }

    impl ProcessInspector for ScanCountingInspector {
        fn list_processes(&self) -> Vec<ProcessHandle> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        }
        fn environment(&self, _pid: i32) -> std::io::Result<HashMap<String, String>> {
            Ok(HashMap::new())
        }
        fn kill_tree(&self, _pid: i32) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct Harness {
        _source_parent: TempDir,
        temp: TempDir,
        job: JobDefinition,
        inspector: ScanCountingInspector,
        settings: SettingsStore,
        listeners: TraceListenerRegistry,
        retry: RetryPolicy,
    }

    impl Harness {
        fn new() -> Self {
            let source_parent = TempDir::new().expect("source parent");
            let source = source_parent.path().join("backup");
            fs::create_dir_all(source.join("subdir")).expect("mkdir");
            fs::write(source.join("run.sh"), "echo hi\n").expect("write");
            fs::write(source.join("subdir/data.txt"), "data").expect("write");

            let job = JobDefinition {
                name: JobName::from("backup"),
                script_path: source.join("run.sh"),
                run_command: "sh".to_owned(),
                arguments: vec!["run.sh".to_owned()],
                job_type: JobType::Triggered,
                host: ExecutionHost::default(),
                settings: JobSettings::default(),
            };

            Self {
                _source_parent: source_parent,
                temp: TempDir::new().expect("temp"),
                job,
                inspector: ScanCountingInspector::default(),
                settings: SettingsStore::default(),
                listeners: TraceListenerRegistry::default(),
                retry: RetryPolicy::no_retry(),
            }
        }

        fn ctx(&self) -> RefreshContext<'_> {
            RefreshContext {
                inspector: &self.inspector,
                logger: &SilentLogger,
                telemetry: &NullTelemetry,
                retry: &self.retry,
                settings: &self.settings,
                listeners: &self.listeners,
            }
        }

        fn manager(&self) -> WorkingCopyManager {
            WorkingCopyManager::new(self.temp.path())
        }
    }

    #[test]
    fn first_refresh_performs_full_copy() {
        let harness = Harness::new();
        let mut manager = harness.manager();

        let outcome = manager.refresh(&harness.job, &harness.ctx()).expect("refresh");
        assert_eq!(outcome, RefreshOutcome::FullCopy);

        let working = manager.working_dir().expect("pointer set");
        assert!(working.starts_with(harness.temp.path()));
        assert!(working.join("run.sh").exists());
        assert!(working.join("subdir/data.txt").exists());
    }

    #[test]
    fn second_refresh_without_changes_is_the_fast_path() {
        let harness = Harness::new();
        let mut manager = harness.manager();
        manager.refresh(&harness.job, &harness.ctx()).expect("first");
        let pointer = manager.working_dir().map(Path::to_path_buf);

        let outcome = manager.refresh(&harness.job, &harness.ctx()).expect("second");
        assert_eq!(outcome, RefreshOutcome::Unchanged);
        assert_eq!(manager.working_dir().map(Path::to_path_buf), pointer);
    }

    #[test]
    fn source_change_triggers_selective_sync_into_a_new_instance() {
        let harness = Harness::new();
        let mut manager = harness.manager();
        manager.refresh(&harness.job, &harness.ctx()).expect("first");
        let old_pointer = manager.working_dir().map(Path::to_path_buf).expect("pointer");
        let scans_before = harness.inspector.scans.load(Ordering::SeqCst);

        fs::write(harness.job.source_dir().join("extra.txt"), "new").expect("add");

        let outcome = manager.refresh(&harness.job, &harness.ctx()).expect("resync");
        assert_eq!(outcome, RefreshOutcome::Synced);

        let new_pointer = manager.working_dir().expect("pointer");
        assert_ne!(new_pointer, old_pointer.as_path(), "fresh instance allocated");
        assert!(new_pointer.join("extra.txt").exists());
        assert!(new_pointer.join("subdir/data.txt").exists(), "seeded from old instance");
        assert!(
            harness.inspector.scans.load(Ordering::SeqCst) > scans_before,
            "prior instances are reaped before mutation"
        );
        assert!(!old_pointer.exists(), "superseded instance was removed");
    }

    #[test]
    fn every_resync_leaves_exactly_one_instance_behind() {
        let harness = Harness::new();
        let mut manager = harness.manager();
        manager.refresh(&harness.job, &harness.ctx()).expect("first");

        for round in 0..3 {
            fs::write(
                harness.job.source_dir().join(format!("round{round}.txt")),
                "change",
            )
            .expect("edit source");
            manager.refresh(&harness.job, &harness.ctx()).expect("resync");
        }

        let instances_root = harness.temp.path().join("quay-jobs").join("backup");
        let remaining = fs::read_dir(&instances_root)
            .expect("instances root")
            .count();
        assert_eq!(remaining, 1, "only the live instance survives");
    }

    #[test]
    fn deletion_propagates_through_the_prior_snapshot() {
        let harness = Harness::new();
        let mut manager = harness.manager();
        manager.refresh(&harness.job, &harness.ctx()).expect("first");

        fs::remove_dir_all(harness.job.source_dir().join("subdir")).expect("delete");

        let outcome = manager.refresh(&harness.job, &harness.ctx()).expect("resync");
        assert_eq!(outcome, RefreshOutcome::Synced);
        assert!(!manager.working_dir().expect("pointer").join("subdir").exists());

        let outcome = manager.refresh(&harness.job, &harness.ctx()).expect("settle");
        assert_eq!(outcome, RefreshOutcome::Unchanged, "baseline was replaced");
    }

    #[test]
    fn failed_refresh_clears_pointer_but_keeps_baseline() {
        let harness = Harness::new();
        let mut manager = harness.manager();
        manager.refresh(&harness.job, &harness.ctx()).expect("first");

        // Make the source vanish: building its snapshot now fails.
        let source = harness.job.source_dir();
        fs::rename(&source, source.with_extension("gone")).expect("hide source");
        let err = manager
            .refresh(&harness.job, &harness.ctx())
            .expect_err("refresh must fail");
        assert!(matches!(err, JobsError::Sync(_)));
        assert!(manager.working_dir().is_none(), "job unrunnable this cycle");

        // Source comes back: the next activation recovers with a full copy.
        fs::rename(source.with_extension("gone"), &source).expect("restore source");
        let outcome = manager.refresh(&harness.job, &harness.ctx()).expect("recover");
        assert_eq!(outcome, RefreshOutcome::FullCopy);
        assert!(manager.working_dir().is_some());
    }

    #[test]
    fn in_place_mode_points_at_the_source_and_reaps() {
        let mut harness = Harness::new();
        harness.job.settings.in_place = Some(true);
        let mut manager = harness.manager();

        let outcome = manager.refresh(&harness.job, &harness.ctx()).expect("refresh");
        assert_eq!(outcome, RefreshOutcome::InPlace);
        assert_eq!(manager.working_dir(), Some(harness.job.source_dir().as_path()));
        assert_eq!(harness.inspector.scans.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn configs_are_patched_in_the_instance_not_the_source() {
        let mut harness = Harness::new();
        harness
            .settings
            .app_settings
            .insert("STORAGE".to_owned(), "primary".to_owned());
        let source_config = harness.job.source_dir().join("app.jobconfig.json");
        fs::write(&source_config, "{}").expect("write config");

        let mut manager = harness.manager();
        manager.refresh(&harness.job, &harness.ctx()).expect("refresh");

        let instance_config = manager
            .working_dir()
            .expect("pointer")
            .join("app.jobconfig.json");
        let patched = fs::read_to_string(&instance_config).expect("read instance copy");
        assert!(patched.contains("STORAGE"));
        assert_eq!(fs::read_to_string(&source_config).expect("read source"), "{}");
    }
}
