//! Orphan reaper: finds and force-kills processes left behind by prior job
//! activations, identified by the per-job marker environment variable.
//!
//! System-wide enumeration is inherently racy against concurrently starting
//! and exiting processes; cleanup is best-effort, not exactly-once. The
//! reaper runs synchronously before any destructive resync so stale file
//! handles are released first.

use std::collections::HashMap;

use quay_core::{JobLogger, JobName};

use crate::paths::job_environment_key;

/// One OS process, as seen by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: i32,
    pub name: String,
}

/// Capability seam over OS process inspection and termination, so the
/// production behavior is swappable for a test double.
pub trait ProcessInspector: Send + Sync {
    fn list_processes(&self) -> Vec<ProcessHandle>;

    /// The environment of a running process. Fails for processes owned by
    /// other users or already gone.
    fn environment(&self, pid: i32) -> std::io::Result<HashMap<String, String>>;

    /// Force-kill a process and its descendants.
    fn kill_tree(&self, pid: i32) -> std::io::Result<()>;
}

/// Kill every process tagged with `job`'s marker variable.
///
/// Per-process inspection or kill failures are logged at warning level and
/// never abort the scan of remaining processes. Returns the number of
/// processes killed.
pub fn kill_all_for_job(
    inspector: &dyn ProcessInspector,
    job: &JobName,
    logger: &dyn JobLogger,
) -> usize {
    let marker = job_environment_key(job);
    let own_pid = std::process::id() as i32;
    let mut killed = 0;

    for process in inspector.list_processes() {
        if process.pid == own_pid {
            continue;
        }
        let env = match inspector.environment(process.pid) {
            Ok(env) => env,
            Err(err) => {
                logger.warn(&format!(
                    "could not inspect process {} ({}): {err}",
                    process.pid, process.name
                ));
                continue;
            }
        };
        if !env.contains_key(&marker) {
            continue;
        }
        match inspector.kill_tree(process.pid) {
            Ok(()) => {
                logger.info(&format!(
                    "killed orphan process {} ({}) from a prior activation of '{job}'",
                    process.pid, process.name
                ));
                killed += 1;
            }
            Err(err) => {
                logger.warn(&format!(
                    "could not kill process {} ({}): {err}",
                    process.pid, process.name
                ));
            }
        }
    }

    killed
}

// ---------------------------------------------------------------------------
// /proc-backed inspector
// ---------------------------------------------------------------------------

/// Production inspector backed by `/proc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInspector;

#[cfg(target_os = "linux")]
impl ProcessInspector for SystemInspector {
    fn list_processes(&self) -> Vec<ProcessHandle> {
        let Ok(entries) = std::fs::read_dir("/proc") else {
            return Vec::new();
        };
        let mut processes = Vec::new();
        for entry in entries.flatten() {
            let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() else {
                continue;
            };
            let name = std::fs::read_to_string(entry.path().join("comm"))
                .map(|comm| comm.trim().to_owned())
                .unwrap_or_default();
            processes.push(ProcessHandle { pid, name });
        }
        processes
    }

    fn environment(&self, pid: i32) -> std::io::Result<HashMap<String, String>> {
        let raw = std::fs::read(format!("/proc/{pid}/environ"))?;
        let mut env = HashMap::new();
        for chunk in raw.split(|byte| *byte == 0) {
            if chunk.is_empty() {
                continue;
            }
            let text = String::from_utf8_lossy(chunk);
            if let Some((key, value)) = text.split_once('=') {
                env.insert(key.to_owned(), value.to_owned());
            }
        }
        Ok(env)
    }

    fn kill_tree(&self, pid: i32) -> std::io::Result<()> {
        // Depth-first: descendants before the parent, so nothing re-spawns
        // children while the tree is going down.
        for child in child_pids(pid) {
            let _ = self.kill_tree(child);
        }
        nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid),
            nix::sys::signal::Signal::SIGKILL,
        )
        .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))
    }
}

#[cfg(target_os = "linux")]
fn child_pids(pid: i32) -> Vec<i32> {
    let tasks = format!("/proc/{pid}/task");
    let Ok(entries) = std::fs::read_dir(&tasks) else {
        return Vec::new();
    };
    let mut children = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path().join("children");
        let Ok(list) = std::fs::read_to_string(&path) else {
            continue;
        };
        children.extend(list.split_whitespace().filter_map(|p| p.parse::<i32>().ok()));
    }
    children
}

#[cfg(not(target_os = "linux"))]
impl ProcessInspector for SystemInspector {
    fn list_processes(&self) -> Vec<ProcessHandle> {
        tracing::warn!("process enumeration is only implemented for linux hosts");
        Vec::new()
    }

    fn environment(&self, _pid: i32) -> std::io::Result<HashMap<String, String>> {
        Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
    }

    fn kill_tree(&self, _pid: i32) -> std::io::Result<()> {
        Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
