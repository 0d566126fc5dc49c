/*
[INPUT]:  Failure sources of the task core (settings, driver, bounded waits, misuse)
[OUTPUT]: SettingsError / TaskError with messages naming what failed
[POS]:    Error handling layer - typed errors for the task execution core
[UPDATE]: When adding new pre-flight checks or polling primitives
*/

use autotask_driver::DriverError;
use std::path::PathBuf;
use thiserror::Error;

/// Settings validation failures (always raised before any driver exists)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// One or more mandatory keys are absent or empty
    #[error("missing mandatory settings: {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    /// A key is present but cannot be interpreted
    #[error("invalid value `{value}` for setting `{key}`: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Errors raised by the task core
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("configuration error: {0}")]
    Settings(#[from] SettingsError),

    #[error("download folder `{}` is not usable: {reason}", .path.display())]
    DownloadFolder { path: PathBuf, reason: String },

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("pre-run callback failed: {0:#}")]
    PreRun(anyhow::Error),

    /// A bounded wait ran out of attempts
    #[error("timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: String, attempts: u32 },

    #[error("can not find an option whose text matches `{keyword}`")]
    OptionNotFound { keyword: String },

    #[error("progress total must be set before advancing the count")]
    ProgressTotalUnset,

    #[error("progress total must be greater than zero")]
    InvalidTotal,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("task already started; construct a new instance per run")]
    AlreadyStarted,

    #[error("unknown task: {0}")]
    UnknownTask(String),
}

impl TaskError {
    pub fn timeout(what: impl Into<String>, attempts: u32) -> Self {
        TaskError::Timeout {
            what: what.into(),
            attempts,
        }
    }

    /// Errors surfaced before the task touched any external resource.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            TaskError::Settings(_) | TaskError::DownloadFolder { .. }
        )
    }
}
