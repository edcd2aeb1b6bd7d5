//! Prerequisite markers checked before the server may start.

use crate::error::{LauncherError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filesystem markers that indicate a completed install.
///
/// Met iff the data directory exists and at least one env file exists.
/// Only existence is checked, never content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prerequisites {
    data_dir: PathBuf,
    env_files: [PathBuf; 2],
}

impl Prerequisites {
    pub fn new(data_dir: impl AsRef<Path>, env_files: [PathBuf; 2]) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            env_files,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn env_files(&self) -> &[PathBuf; 2] {
        &self.env_files
    }

    /// Whether every prerequisite is present.
    pub fn are_met(&self) -> bool {
        self.check().is_ok()
    }

    /// Check prerequisites, naming the first missing marker.
    pub fn check(&self) -> Result<()> {
        if !self.data_dir.is_dir() {
            debug!("Data directory missing: {}", self.data_dir.display());
            return Err(LauncherError::PrerequisiteMissing(self.data_dir.clone()));
        }

        if !self.env_files.iter().any(|path| path.is_file()) {
            debug!("No env file found among {:?}", self.env_files);
            return Err(LauncherError::PrerequisiteMissing(self.env_files[0].clone()));
        }

        Ok(())
    }
}
