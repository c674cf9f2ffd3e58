//! # quay-core
//!
//! Domain types and collaborator seams for the quay job-execution
//! subsystem: job definitions, the global settings store, logging and
//! telemetry traits, the bounded retry policy, and the abort signal.

pub mod abort;
pub mod retry;
pub mod settings;
pub mod telemetry;
pub mod types;

pub use abort::AbortSignal;
pub use retry::RetryPolicy;
pub use settings::{ConnectionString, SettingsStore, TraceListenerRegistry};
pub use telemetry::{JobLogger, JobStartedEvent, NullTelemetry, TelemetrySink, TraceLogger};
pub use types::{ExecutionHost, JobDefinition, JobName, JobSettings, JobStatus, JobType, RunId};
