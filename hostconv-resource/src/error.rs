//! Error types for tasks and drivers.

use std::time::Duration;

use thiserror::Error;

use crate::render::RenderError;
use crate::status::Status;

/// Errors raised by a volume manager driver.
///
/// These are infrastructure failures: the driver could not answer, as
/// opposed to answering "absent".
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to run {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("unexpected {command} output: {line}")]
    Parse { command: String, line: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("device {path} not ready after {waited:?}")]
    Timeout { path: String, waited: Duration },

    #[error("operation cancelled")]
    Cancelled,
}

/// Errors returned from `check`, `apply` and `prepare`.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The driver's own prerequisites are not met.
    #[error("lvm prerequisites: {0}")]
    Prerequisites(#[source] DriverError),

    /// A query or mutation against the driver failed.
    #[error(transparent)]
    Driver(DriverError),

    /// The parent volume group is absent when it can no longer be deferred.
    #[error("volume group {group} does not exist")]
    GroupMissing { group: String },

    #[error("cannot find device path for volume {group}/{name}")]
    DevicePathUnresolved { group: String, name: String },

    /// Realized device path differs from the planned one and the
    /// divergence policy is fatal.
    #[error("real device path '{actual}' diverges from planned '{planned}'")]
    PathDivergence {
        planned: String,
        actual: String,
        report: Status,
    },

    /// The volume was mutated but its device never became usable.
    #[error("device {device_path} did not become ready: {source}")]
    NotReady {
        device_path: String,
        #[source]
        source: DriverError,
        report: Status,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unknown resource kind: {0}")]
    UnknownKind(String),
}

impl TaskError {
    /// Partial report attached to the error, if the task got far enough
    /// to produce one.
    pub fn report(&self) -> Option<&Status> {
        match self {
            TaskError::PathDivergence { report, .. } | TaskError::NotReady { report, .. } => {
                Some(report)
            }
            _ => None,
        }
    }
}

impl From<DriverError> for TaskError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Cancelled => TaskError::Cancelled,
            other => TaskError::Driver(other),
        }
    }
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, TaskError>;
