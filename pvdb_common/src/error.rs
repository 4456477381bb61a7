//! Error taxonomy shared across the workspace.
//!
//! Processing failures are recorded as alarm state on the record and
//! returned as a status code from the dispatcher; they are never raised
//! as process-terminating faults.

use thiserror::Error;

/// Device-support I/O failures, surfaced as alarm state on the record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// The binding does not implement this operation.
    #[error("operation not supported by device support")]
    Unsupported,

    /// Hardware read failed.
    #[error("device read failed: {0}")]
    ReadFailed(String),

    /// Hardware write failed.
    #[error("device write failed: {0}")]
    WriteFailed(String),

    /// Input/output link resolution or transfer failed.
    #[error("i/o link failed: {0}")]
    LinkFailed(String),

    /// Per-record device initialization failed.
    #[error("device init failed: {0}")]
    InitFailed(String),
}

/// Fatal-for-this-cycle dispatcher failures.
///
/// Configuration errors park the record; transient I/O errors complete
/// the cycle and are reported alongside the alarm they raised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessError {
    /// Record has no device support bound.
    #[error("record has no device support bound")]
    MissingDeviceSupport,

    /// Bound device support lacks a required capability.
    #[error("device support lacks required capability: {0}")]
    MissingCapability(&'static str),

    /// The device I/O operation itself failed; the cycle still completed.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Callback scheduler refusals.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// The callback queue is at capacity.
    #[error("callback queue is full")]
    QueueFull,

    /// The callback queue has been shut down.
    #[error("callback queue is shut down")]
    ShutDown,
}
