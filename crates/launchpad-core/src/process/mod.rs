//! Process supervision module.
//!
//! Launches the installer and the server as child processes, streams their
//! stdout/stderr to a sink line by line, and owns the child handle so it
//! can be terminated on stop.
//!
//! # Example
//!
//! ```rust,no_run
//! use launchpad_core::process::{CommandSpec, ProcessSupervisor};
//! use launchpad_core::TracingSink;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> launchpad_core::Result<()> {
//!     let installer = CommandSpec::new("./install.sh").with_title("Installer");
//!     ProcessSupervisor::run_with_captured_output(&installer, Arc::new(TracingSink)).await
//! }
//! ```

mod command;
mod supervisor;

pub use command::CommandSpec;
pub use supervisor::{ExitOutcome, ProcessSupervisor, SupervisedProcess};

pub(crate) use supervisor::decode_line;
