//! Logging and telemetry seams.
//!
//! Both collaborators are owned by the outer host; the subsystem only sees
//! these traits, so tests substitute recording doubles.

use serde::{Deserialize, Serialize};

use crate::types::{JobName, RunId};

/// Structured per-job logger plus raw child-output passthrough.
pub trait JobLogger: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);

    /// A raw line from the child's stdout.
    fn stdout_line(&self, line: &str) {
        self.info(line);
    }

    /// A raw line from the child's stderr.
    fn stderr_line(&self, line: &str) {
        self.error(line);
    }
}

/// The "job started" telemetry event, fired exactly once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStartedEvent {
    pub job_name: JobName,
    pub run_id: RunId,
    /// Extension of the entry-point script, e.g. `.sh`.
    pub script_extension: String,
    /// Job type string, with an ` (SDK)` suffix when an SDK marker is found.
    pub job_type: String,
    pub site_mode: String,
    /// Error text for a failed run; `None` for success and abort.
    pub error: Option<String>,
    /// Name of the trigger that caused this activation.
    pub trigger: String,
}

/// Sink for telemetry events and exception reports.
pub trait TelemetrySink: Send + Sync {
    fn report_started(&self, event: JobStartedEvent);
    fn report_error(&self, context: &str, error: &str);
}

/// Telemetry sink that drops everything. Used where the host supplies none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn report_started(&self, _event: JobStartedEvent) {}
    fn report_error(&self, _context: &str, _error: &str) {}
}

/// Logger that forwards to the process-wide `log` facade.
#[derive(Debug, Clone, Default)]
pub struct TraceLogger {
    prefix: String,
}

impl TraceLogger {
    pub fn new(job_name: &JobName) -> Self {
        Self {
            prefix: format!("[{job_name}] "),
        }
    }
}

impl JobLogger for TraceLogger {
    fn info(&self, message: &str) {
        log::info!("{}{message}", self.prefix);
    }

    fn warn(&self, message: &str) {
        log::warn!("{}{message}", self.prefix);
    }

    fn error(&self, message: &str) {
        log::error!("{}{message}", self.prefix);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLogger {
        lines: Mutex<Vec<String>>,
    }

    impl JobLogger for RecordingLogger {
        fn info(&self, message: &str) {
            self.lines.lock().unwrap().push(format!("info: {message}"));
        }
        fn warn(&self, message: &str) {
            self.lines.lock().unwrap().push(format!("warn: {message}"));
        }
        fn error(&self, message: &str) {
            self.lines.lock().unwrap().push(format!("error: {message}"));
        }
    }

    #[test]
    fn stdout_and_stderr_default_to_info_and_error() {
        let logger = RecordingLogger::default();
        logger.stdout_line("out");
        logger.stderr_line("err");
        let lines = logger.lines.lock().unwrap();
        assert_eq!(*lines, vec!["info: out".to_owned(), "error: err".to_owned()]);
    }

    #[test]
    fn started_event_serde_roundtrip() {
        let event = JobStartedEvent {
            job_name: JobName::from("backup"),
            run_id: RunId::from("201701"),
            script_extension: ".sh".to_owned(),
            job_type: "triggered".to_owned(),
            site_mode: "standard".to_owned(),
            error: None,
            trigger: "schedule".to_owned(),
        };
        let json = serde_json::to_string(&event).expect("serialize");
        let loaded: JobStartedEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(event, loaded);
    }
}
