//! External command descriptions for the installer and the server.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// An opaque external command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable. Paths with more than one component are resolved against
    /// the launcher root; bare names go through `PATH`.
    pub program: PathBuf,
    /// Arguments to pass.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory. Defaults to the launcher root.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Environment variables to set.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Display title for the log view.
    #[serde(default)]
    pub title: Option<String>,
}

impl CommandSpec {
    /// Create a command with no arguments.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: vec![],
            working_dir: None,
            env: HashMap::new(),
            title: None,
        }
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add several arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Set the display title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Title shown in the log view; falls back to the program's file name.
    pub fn display_title(&self) -> String {
        if let Some(ref title) = self.title {
            return title.clone();
        }
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    /// Resolve relative program and working directory against `root`.
    pub fn rooted_at(&self, root: &Path) -> Self {
        let mut spec = self.clone();

        if spec.program.is_relative() && spec.program.components().count() > 1 {
            spec.program = root.join(&spec.program);
        }

        spec.working_dir = Some(match spec.working_dir.take() {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        });

        spec
    }

    /// Build the tokio command. Stdio is configured by the supervisor.
    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}
