//! Event sinks consumed by the UI layer.
//!
//! The orchestrator emits exactly three kinds of events: log lines, a title
//! for the log view, and the ready URL. Producers (stdout, stderr, a tailed
//! file) share one sink; ordering is only guaranteed per producer.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Prefix for lines the launcher itself writes to the sink.
pub const SYSTEM_PREFIX: &str = "[launcher]";

/// Receiver of orchestrator output.
///
/// Implementations must be cheap and non-blocking; they are called from
/// pipe reader and tail tasks.
pub trait LogSink: Send + Sync + 'static {
    /// A single line of output, without trailing newline.
    fn log_line(&self, line: &str);

    /// Label for the log view (process title or log file name).
    fn set_title(&self, title: &str);

    /// The service is ready at `base_url`.
    fn ready(&self, base_url: &str);
}

/// Shared sink handle.
pub type SharedSink = Arc<dyn LogSink>;

/// Write a launcher-originated line.
pub(crate) fn system_line(sink: &dyn LogSink, message: impl AsRef<str>) {
    sink.log_line(&format!("{SYSTEM_PREFIX} {}", message.as_ref()));
}

/// Event forwarded by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LauncherEvent {
    Log(String),
    Title(String),
    Ready(String),
}

/// Sink that forwards events over an unbounded channel.
///
/// Sends after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<LauncherEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver for its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LauncherEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: LauncherEvent) {
        let _ = self.tx.send(event);
    }
}

impl LogSink for ChannelSink {
    fn log_line(&self, line: &str) {
        self.send(LauncherEvent::Log(line.to_string()));
    }

    fn set_title(&self, title: &str) {
        self.send(LauncherEvent::Title(title.to_string()));
    }

    fn ready(&self, base_url: &str) {
        self.send(LauncherEvent::Ready(base_url.to_string()));
    }
}

/// Sink that writes events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log_line(&self, line: &str) {
        info!(target: "launchpad::output", "{}", line);
    }

    fn set_title(&self, title: &str) {
        info!(target: "launchpad::output", "== {} ==", title);
    }

    fn ready(&self, base_url: &str) {
        info!(target: "launchpad::output", "Service ready at {}", base_url);
    }
}
