//! Centralized configuration for the launcher.
//!
//! Constants hold the observed defaults (1 s x 30 readiness polling, 500 ms
//! tail cadence, loopback port 1920). `LauncherConfig` is the runtime
//! configuration; every field falls back to those constants.

use crate::error::{LauncherError, Result};
use crate::prereq::Prerequisites;
use crate::probe::ReadinessPolicy;
use crate::process::CommandSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lifecycle timing defaults.
pub struct LifecycleConfig;

impl LifecycleConfig {
    pub const DEFAULT_ADDRESS: &'static str = "localhost:1920";
    pub const READY_POLL_INTERVAL: Duration = Duration::from_secs(1);
    pub const READY_MAX_ATTEMPTS: u32 = 30;
    /// Per-request bound. A probe that hangs until this timeout adds to the
    /// poll interval, so a readiness wait can run for up to
    /// `READY_MAX_ATTEMPTS * (PROBE_TIMEOUT + READY_POLL_INTERVAL)`.
    /// See [`ReadinessPolicy::worst_case`].
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
    pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
    pub const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(500);
    // Grace period for pipe readers after the child has exited
    pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
}

/// Directory and file names under the launcher root.
pub struct PathsConfig;

impl PathsConfig {
    pub const DATA_DIR_NAME: &'static str = "data";
    pub const ENV_FILE_NAME: &'static str = ".env";
    pub const ENV_LOCAL_FILE_NAME: &'static str = ".env.local";
    pub const SERVER_LOG_FILE_NAME: &'static str = "server.log";

    #[cfg(windows)]
    pub const INSTALLER_PROGRAM: &'static str = "install.bat";
    #[cfg(not(windows))]
    pub const INSTALLER_PROGRAM: &'static str = "./install.sh";

    #[cfg(windows)]
    pub const SERVER_PROGRAM: &'static str = "server.exe";
    #[cfg(not(windows))]
    pub const SERVER_PROGRAM: &'static str = "./server";
}

/// Runtime configuration for an orchestrator instance.
///
/// Relative paths are resolved against `root_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Launcher root directory.
    pub root_dir: PathBuf,
    /// Configured `host:port` of the supervised service.
    pub address: String,
    /// Directory that must exist before the server can start.
    pub data_dir: PathBuf,
    /// Env files; at least one must exist.
    pub env_files: [PathBuf; 2],
    /// Log file persisted by the server, tailed when attaching.
    pub log_file: PathBuf,
    /// Installer run when prerequisites are missing.
    pub installer: CommandSpec,
    /// Long-running server.
    pub server: CommandSpec,
    pub ready_interval_ms: u64,
    pub ready_attempts: u32,
    pub probe_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub tail_interval_ms: u64,
    /// Upper bound on installer run time. `None` waits indefinitely.
    pub installer_timeout_ms: Option<u64>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

impl LauncherConfig {
    /// Create a config rooted at `root_dir` with default values.
    pub fn new(root_dir: impl AsRef<Path>) -> Self {
        Self {
            root_dir: root_dir.as_ref().to_path_buf(),
            address: LifecycleConfig::DEFAULT_ADDRESS.to_string(),
            data_dir: PathBuf::from(PathsConfig::DATA_DIR_NAME),
            env_files: [
                PathBuf::from(PathsConfig::ENV_FILE_NAME),
                PathBuf::from(PathsConfig::ENV_LOCAL_FILE_NAME),
            ],
            log_file: Path::new(PathsConfig::DATA_DIR_NAME).join(PathsConfig::SERVER_LOG_FILE_NAME),
            installer: CommandSpec::new(PathsConfig::INSTALLER_PROGRAM).with_title("Installer"),
            server: CommandSpec::new(PathsConfig::SERVER_PROGRAM).with_title("Server"),
            ready_interval_ms: duration_ms(LifecycleConfig::READY_POLL_INTERVAL),
            ready_attempts: LifecycleConfig::READY_MAX_ATTEMPTS,
            probe_timeout_ms: duration_ms(LifecycleConfig::PROBE_TIMEOUT),
            shutdown_timeout_ms: duration_ms(LifecycleConfig::SHUTDOWN_TIMEOUT),
            tail_interval_ms: duration_ms(LifecycleConfig::TAIL_POLL_INTERVAL),
            installer_timeout_ms: None,
        }
    }

    /// Load a config from a JSON file. Missing fields take default values.
    ///
    /// A config without `root_dir` is rooted at the file's directory.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| LauncherError::Io {
            message: "read config file".to_string(),
            path: Some(path.to_path_buf()),
            source: Some(e),
        })?;
        let raw: serde_json::Value = serde_json::from_str(&content)?;
        let has_root = raw.get("root_dir").is_some();
        let mut config: Self = serde_json::from_value(raw)?;
        if !has_root {
            if let Some(parent) = path.parent() {
                config.root_dir = parent.to_path_buf();
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the lifecycle meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(LauncherError::Config {
                message: "address must not be empty".to_string(),
            });
        }
        if self.ready_attempts == 0 {
            return Err(LauncherError::Config {
                message: "ready_attempts must be at least 1".to_string(),
            });
        }
        if self.probe_timeout_ms == 0 {
            return Err(LauncherError::Config {
                message: "probe_timeout_ms must be greater than zero".to_string(),
            });
        }
        if self.tail_interval_ms == 0 {
            return Err(LauncherError::Config {
                message: "tail_interval_ms must be greater than zero".to_string(),
            });
        }
        if self.installer_timeout_ms == Some(0) {
            return Err(LauncherError::Config {
                message: "installer_timeout_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Set the service address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Set the installer command.
    pub fn with_installer(mut self, installer: CommandSpec) -> Self {
        self.installer = installer;
        self
    }

    /// Set the server command.
    pub fn with_server(mut self, server: CommandSpec) -> Self {
        self.server = server;
        self
    }

    /// Set the persisted server log file.
    pub fn with_log_file(mut self, path: impl AsRef<Path>) -> Self {
        self.log_file = path.as_ref().to_path_buf();
        self
    }

    /// Set the readiness polling cadence and attempt budget.
    pub fn with_readiness(mut self, interval: Duration, attempts: u32) -> Self {
        self.ready_interval_ms = duration_ms(interval);
        self.ready_attempts = attempts;
        self
    }

    /// Set the per-request probe timeout.
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the tail polling interval.
    pub fn with_tail_interval(mut self, interval: Duration) -> Self {
        self.tail_interval_ms = duration_ms(interval);
        self
    }

    /// Bound installer run time.
    pub fn with_installer_timeout(mut self, timeout: Duration) -> Self {
        self.installer_timeout_ms = Some(duration_ms(timeout));
        self
    }

    /// Resolve a configured path against the root directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.resolve_path(&self.log_file)
    }

    /// Prerequisite markers resolved against the root directory.
    pub fn prerequisites(&self) -> Prerequisites {
        Prerequisites::new(
            self.resolve_path(&self.data_dir),
            [
                self.resolve_path(&self.env_files[0]),
                self.resolve_path(&self.env_files[1]),
            ],
        )
    }

    /// Installer command with its program and working directory rooted.
    pub fn installer_command(&self) -> CommandSpec {
        self.installer.rooted_at(&self.root_dir)
    }

    /// Server command with its program and working directory rooted.
    pub fn server_command(&self) -> CommandSpec {
        self.server.rooted_at(&self.root_dir)
    }

    pub fn ready_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            interval: Duration::from_millis(self.ready_interval_ms),
            max_attempts: self.ready_attempts,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn tail_interval(&self) -> Duration {
        Duration::from_millis(self.tail_interval_ms)
    }

    pub fn installer_timeout(&self) -> Option<Duration> {
        self.installer_timeout_ms.map(Duration::from_millis)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
