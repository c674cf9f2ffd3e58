//! Externally supplied application settings merged into job configs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named connection string with an optional provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionString {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Global application settings and connection strings, plus the site mode
/// string reported with telemetry events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SettingsStore {
    #[serde(default)]
    pub app_settings: BTreeMap<String, String>,
    #[serde(default)]
    pub connection_strings: BTreeMap<String, ConnectionString>,
    #[serde(default)]
    pub site_mode: String,
}

/// Trace listeners currently registered with the host, by name.
///
/// The conventional `"default"` listener is never written into job configs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TraceListenerRegistry {
    names: Vec<String>,
}

impl TraceListenerRegistry {
    pub const DEFAULT_LISTENER: &'static str = "default";

    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Registered listener names, excluding the conventional default.
    pub fn patchable_names(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .map(String::as_str)
            .filter(|name| !name.eq_ignore_ascii_case(Self::DEFAULT_LISTENER))
    }
}
