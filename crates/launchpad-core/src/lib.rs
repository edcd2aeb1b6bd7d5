//! Launchpad Core - lifecycle orchestration for a locally hosted service.
//!
//! A desktop launcher ships a server binary next to an installer. This crate
//! decides whether the install has to run, starts the server (or attaches to
//! one that is already listening), streams its output to a sink, waits for
//! it to answer on `/api/version`, and tears everything down on stop.
//!
//! There is no UI here; hosts receive output through a [`LogSink`].
//!
//! # Example
//!
//! ```rust,no_run
//! use launchpad_core::{ChannelSink, LauncherConfig, Orchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> launchpad_core::Result<()> {
//!     let (sink, mut events) = ChannelSink::new();
//!     let orchestrator = Orchestrator::new(LauncherConfig::new("/opt/app"), Arc::new(sink))?;
//!
//!     orchestrator.start()?;
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{:?}", event);
//!         }
//!     });
//!
//!     let state = orchestrator.wait_until_settled().await;
//!     println!("Settled in {:?}", state);
//!
//!     orchestrator.stop().await;
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod platform;
pub mod prereq;
pub mod probe;
pub mod process;
pub mod resolve;
pub mod sink;
pub mod tail;

// Re-export commonly used types
pub use classify::{classify, LineKind};
pub use config::{LauncherConfig, LifecycleConfig, PathsConfig};
pub use error::{LauncherError, Result};
pub use orchestrator::{LifecycleState, Orchestrator};
pub use prereq::Prerequisites;
pub use probe::{ReadinessOutcome, ReadinessPolicy, ReadinessProber, ReadinessState};
pub use process::{CommandSpec, ExitOutcome, ProcessSupervisor, SupervisedProcess};
pub use resolve::{base_url, resolve};
pub use sink::{ChannelSink, LauncherEvent, LogSink, SharedSink, TracingSink, SYSTEM_PREFIX};
pub use tail::{AttachedTail, LogTailer};
