//! Error types for the launchpad core.
//!
//! Only a handful of these ever reach the host as terminal failures of a
//! startup attempt (installer failure, process start failure, readiness
//! timeout). Probe and tail errors are absorbed where they happen.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the launchpad core.
#[derive(Debug, Error)]
pub enum LauncherError {
    // Prerequisite and installer errors
    #[error("Prerequisite missing: {0}")]
    PrerequisiteMissing(PathBuf),

    #[error("Installer failed: {message}")]
    InstallerFailed { message: String },

    #[error("Installer did not finish within {0:?}")]
    InstallerTimedOut(Duration),

    // Process errors
    #[error("Failed to start {program}: {source}")]
    ProcessStartFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{title} exited with {status}")]
    ProcessExited { title: String, status: String },

    #[error("A supervised process is already running (PID {pid:?})")]
    AlreadyRunning { pid: Option<u32> },

    // Lifecycle errors
    #[error("Orchestrator session already started")]
    AlreadyStarted,

    #[error("Server did not become ready after {attempts} attempts")]
    ReadinessTimeout { attempts: u32 },

    // Log tail errors
    #[error("Failed to tail {path}: {source}")]
    LogTail {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for launchpad operations.
pub type Result<T> = std::result::Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(err: std::io::Error) -> Self {
        LauncherError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for LauncherError {
    fn from(err: serde_json::Error) -> Self {
        LauncherError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl LauncherError {
    /// Whether this error ends the current startup attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LauncherError::InstallerFailed { .. }
                | LauncherError::InstallerTimedOut(_)
                | LauncherError::ProcessStartFailed { .. }
                | LauncherError::ReadinessTimeout { .. }
        )
    }
}
