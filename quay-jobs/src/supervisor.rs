//! Process supervisor: launches the job executable from the current working
//! copy, streams its output, and blocks until completion or abort.
//!
//! The "job started" telemetry event is a two-trigger state machine: a timer
//! fires it after a fixed delay while the run is still in progress, or the
//! completion path fires it immediately if the run finishes sooner. A single
//! atomically swapped flag guarantees exactly one report.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use quay_core::{
    AbortSignal, JobDefinition, JobLogger, JobStartedEvent, JobStatus, RunId, TelemetrySink,
};

use crate::error::JobsError;
use crate::paths::{
    job_environment_key, ENV_JOB_COMMAND_ARGUMENTS, ENV_JOB_DATA_PATH, ENV_JOB_NAME, ENV_JOB_PORT,
    ENV_JOB_ROOT_PATH, ENV_JOB_RUN_ID, ENV_JOB_SHUTDOWN_FILE, ENV_JOB_TYPE,
};

/// Delay before the started event is reported for a still-running job.
pub const STARTED_REPORT_DELAY: Duration = Duration::from_secs(5);

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Marker file whose presence tags a working copy as SDK-built; reflected as
/// a suffix on the reported job type.
pub const SDK_MARKER_FILE: &str = "job.sdk";

/// Everything the supervisor needs for one run.
pub struct RunRequest<'a> {
    pub job: &'a JobDefinition,
    pub working_dir: &'a Path,
    pub root_path: &'a Path,
    pub data_path: &'a Path,
    pub run_id: RunId,
    pub trigger: String,
    pub port: Option<u16>,
    pub sentinel: Option<PathBuf>,
    pub site_mode: String,
}

/// Terminal result of a supervised run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: JobStatus,
    pub exit_code: Option<i32>,
}

/// Launch and supervise one job run, blocking the caller for its duration.
///
/// Non-zero exit is logged as an error and surfaced in the outcome, not
/// raised. An external abort yields the distinct `Stopped` status.
pub fn run(
    request: RunRequest<'_>,
    logger: Arc<dyn JobLogger>,
    telemetry: Arc<dyn TelemetrySink>,
    abort: &AbortSignal,
) -> Result<RunOutcome, JobsError> {
    let executable = resolve_executable(request.working_dir, &request.job.run_command);
    let mut command = Command::new(&executable);
    command
        .args(&request.job.arguments)
        .current_dir(request.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in build_environment(&request) {
        command.env(key, value);
    }

    logger.info(&format!(
        "starting job '{}' run {} (trigger: {})",
        request.job.name, request.run_id, request.trigger
    ));
    let mut child = command.spawn().map_err(|source| JobsError::Spawn {
        command: executable.display().to_string(),
        source,
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_pump = stream_lines(stdout, logger.clone(), false);
    let stderr_pump = stream_lines(stderr, logger.clone(), true);

    let reported = Arc::new(AtomicBool::new(false));
    spawn_started_timer(
        started_event(&request, None),
        telemetry.clone(),
        reported.clone(),
    );

    let (status, exit_code) = wait_for_exit(&mut child, abort, &logger)?;

    if let Some(pump) = stdout_pump {
        let _ = pump.join();
    }
    if let Some(pump) = stderr_pump {
        let _ = pump.join();
    }

    let error = match (&status, exit_code) {
        (JobStatus::Failed, Some(code)) => {
            let message = format!("job '{}' exited with code {code}", request.job.name);
            logger.error(&message);
            Some(message)
        }
        (JobStatus::Failed, None) => {
            let message = format!("job '{}' was terminated by a signal", request.job.name);
            logger.error(&message);
            Some(message)
        }
        _ => None,
    };

    // Completion beat the timer: report now, with the error field filled in.
    if !reported.swap(true, Ordering::SeqCst) {
        telemetry.report_started(started_event(&request, error));
    }

    tracing::info!(
        job = %request.job.name,
        run_id = %request.run_id,
        status = %status,
        exit_code = ?exit_code,
        "job run finished"
    );
    Ok(RunOutcome { status, exit_code })
}

fn resolve_executable(working_dir: &Path, run_command: &str) -> PathBuf {
    let local = working_dir.join(run_command);
    if local.is_file() {
        local
    } else {
        PathBuf::from(run_command)
    }
}

fn build_environment(request: &RunRequest<'_>) -> Vec<(String, String)> {
    let job = request.job;
    let mut env = vec![
        (job_environment_key(&job.name), "true".to_owned()),
        (
            ENV_JOB_ROOT_PATH.to_owned(),
            request.root_path.display().to_string(),
        ),
        (ENV_JOB_NAME.to_owned(), job.name.0.clone()),
        (ENV_JOB_TYPE.to_owned(), job.job_type.to_string()),
        (
            ENV_JOB_DATA_PATH.to_owned(),
            request.data_path.display().to_string(),
        ),
        (ENV_JOB_RUN_ID.to_owned(), request.run_id.0.clone()),
        (
            ENV_JOB_COMMAND_ARGUMENTS.to_owned(),
            job.arguments.join(" "),
        ),
    ];
    if let Some(port) = request.port {
        env.push((ENV_JOB_PORT.to_owned(), port.to_string()));
    }
    if let Some(sentinel) = &request.sentinel {
        env.push((
            ENV_JOB_SHUTDOWN_FILE.to_owned(),
            sentinel.display().to_string(),
        ));
    }
    env
}

fn started_event(request: &RunRequest<'_>, error: Option<String>) -> JobStartedEvent {
    let mut job_type = request.job.job_type.to_string();
    if request.working_dir.join(SDK_MARKER_FILE).exists() {
        job_type.push_str(" (SDK)");
    }
    JobStartedEvent {
        job_name: request.job.name.clone(),
        run_id: request.run_id.clone(),
        script_extension: request.job.script_extension(),
        job_type,
        site_mode: request.site_mode.clone(),
        error,
        trigger: request.trigger.clone(),
    }
}

fn spawn_started_timer(
    event: JobStartedEvent,
    telemetry: Arc<dyn TelemetrySink>,
    reported: Arc<AtomicBool>,
) {
    thread::spawn(move || {
        thread::sleep(STARTED_REPORT_DELAY);
        if !reported.swap(true, Ordering::SeqCst) {
            telemetry.report_started(event);
        }
    });
}

fn stream_lines(
    pipe: Option<impl Read + Send + 'static>,
    logger: Arc<dyn JobLogger>,
    is_stderr: bool,
) -> Option<thread::JoinHandle<()>> {
    let pipe = pipe?;
    Some(thread::spawn(move || {
        let reader = BufReader::new(pipe);
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if is_stderr {
                logger.stderr_line(&line);
            } else {
                logger.stdout_line(&line);
            }
        }
    }))
}

/// Block until the child exits or the abort signal fires.
///
/// After an abort the supervisor must not touch shared refresh state, so
/// everything it does here is kill-and-collect on the child alone.
fn wait_for_exit(
    child: &mut Child,
    abort: &AbortSignal,
    logger: &Arc<dyn JobLogger>,
) -> Result<(JobStatus, Option<i32>), JobsError> {
    loop {
        if abort.is_aborted() {
            logger.warn("run aborted by external request");
            let _ = child.kill();
            let _ = child.wait();
            return Ok((JobStatus::Stopped, None));
        }
        match child.try_wait() {
            Ok(Some(status)) => {
                let code = status.code();
                let terminal = if status.success() {
                    JobStatus::Success
                } else {
                    JobStatus::Failed
                };
                return Ok((terminal, code));
            }
            Ok(None) => thread::sleep(WAIT_POLL_INTERVAL),
            Err(source) => {
                return Err(JobsError::Spawn {
                    command: "wait".to_owned(),
                    source,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
