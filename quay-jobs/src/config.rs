//! Per-job configuration patching.
//!
//! Every `*.jobconfig.json` file under the working directory gets the host's
//! application settings and connection strings merged in, and its
//! diagnostics section extended with the registered trace listeners. The
//! file's externally observed modified timestamp is restored after writing;
//! otherwise the next diff cycle would misclassify the patch as a source
//! change and resync forever.
//!
//! Patch failures are recovered locally: logged, reported to telemetry, and
//! never allowed to abort the refresh.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use serde::{Deserialize, Serialize};

use quay_core::{ConnectionString, SettingsStore, TelemetrySink, TraceListenerRegistry};

use crate::error::{io_err, JobsError};
use crate::paths::JOB_CONFIG_SUFFIX;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct JobConfigFile {
    #[serde(default)]
    settings: BTreeMap<String, String>,
    #[serde(default)]
    connection_strings: BTreeMap<String, ConnectionString>,
    #[serde(default)]
    diagnostics: DiagnosticsSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct DiagnosticsSection {
    #[serde(default)]
    listeners: Vec<String>,
}

/// Patch every job-config file under `working_dir`.
///
/// Returns the number of files patched. Never fails outward.
pub fn patch_job_configs(
    working_dir: &Path,
    store: &SettingsStore,
    listeners: &TraceListenerRegistry,
    telemetry: &dyn TelemetrySink,
) -> usize {
    let mut patched = 0;
    for path in find_config_files(working_dir) {
        match patch_one(&path, store, listeners) {
            Ok(true) => patched += 1,
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "job config patch failed");
                telemetry.report_error("job config patch", &err.to_string());
            }
        }
    }
    patched
}

/// Recursive scan for files matching the job-config naming convention.
fn find_config_files(working_dir: &Path) -> Vec<PathBuf> {
    let mut configs = Vec::new();
    let mut pending = vec![working_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path
                .file_name()
                .map(|name| name.to_string_lossy().ends_with(JOB_CONFIG_SUFFIX))
                .unwrap_or(false)
            {
                configs.push(path);
            }
        }
    }
    configs
}

/// Patch a single config file. Returns whether the file was rewritten.
fn patch_one(
    path: &Path,
    store: &SettingsStore,
    listeners: &TraceListenerRegistry,
) -> Result<bool, JobsError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut config: JobConfigFile = serde_json::from_str(&contents)
        .map_err(|e| io_err(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    let original = config.clone();

    merge_settings(&mut config, store);
    merge_listeners(&mut config, listeners);

    if config == original {
        return Ok(false);
    }

    // Capture the pre-patch mtime so the write is invisible to the differ.
    let meta = std::fs::metadata(path).map_err(|e| io_err(path, e))?;
    let mtime = FileTime::from_last_modification_time(&meta);

    let json = serde_json::to_string_pretty(&config)
        .map_err(|e| io_err(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    std::fs::write(path, json).map_err(|e| io_err(path, e))?;
    filetime::set_file_mtime(path, mtime).map_err(|e| io_err(path, e))?;

    tracing::debug!(path = %path.display(), "patched job config");
    Ok(true)
}

fn merge_settings(config: &mut JobConfigFile, store: &SettingsStore) {
    for (key, value) in &store.app_settings {
        config.settings.insert(key.clone(), value.clone());
    }
    for (name, supplied) in &store.connection_strings {
        let merged = match config.connection_strings.get(name) {
            // An existing connection string keeps its provider unless it has
            // none, in which case the supplied one is used.
            Some(existing) => ConnectionString {
                value: supplied.value.clone(),
                provider: existing.provider.clone().or_else(|| supplied.provider.clone()),
            },
            None => supplied.clone(),
        };
        config.connection_strings.insert(name.clone(), merged);
    }
}

fn merge_listeners(config: &mut JobConfigFile, listeners: &TraceListenerRegistry) {
    for name in listeners.patchable_names() {
        let present = config
            .diagnostics
            .listeners
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(name));
        if !present {
            config.diagnostics.listeners.push(name.to_owned());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
