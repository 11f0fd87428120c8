//! Error types surfaced to the host application.
//!
//! Per-sample problems (jumps, blinks, missing regions) never become errors;
//! only session-level failures do.

use std::path::PathBuf;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, GazeError>;

/// Session-level failures the host must react to.
#[derive(Debug, thiserror::Error)]
pub enum GazeError {
    /// The external estimator could not be started. Fatal for the session;
    /// the host should fall back to non-gaze input or offer a retry.
    #[error("gaze estimator unavailable: {0}")]
    EstimatorUnavailable(#[from] EstimatorError),

    /// An operation that needs a running session was called before `start`.
    #[error("gaze session not started")]
    NotStarted,

    /// `start` was called twice.
    #[error("gaze session already started")]
    AlreadyStarted,

    /// A calibration was requested while another one is running.
    #[error("calibration already in progress")]
    CalibrationInProgress,

    /// A calibration target never produced a stable verdict.
    #[error("calibration target {target_id} unstable after {attempts} attempts")]
    CalibrationFailed { target_id: usize, attempts: u32 },

    /// The user skipped calibration before all targets were collected.
    #[error("calibration cancelled")]
    CalibrationCancelled,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure reported by an estimator implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EstimatorError {
    pub message: String,
}

impl EstimatorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Configuration loading and validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is outside its meaningful range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
