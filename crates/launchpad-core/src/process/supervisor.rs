//! Child process supervision with captured output.

use super::command::CommandSpec;
use crate::config::LifecycleConfig;
use crate::error::{LauncherError, Result};
use crate::platform;
use crate::sink::{system_line, SharedSink};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How a supervised process ended.
#[derive(Debug)]
pub enum ExitOutcome {
    /// The process exited on its own.
    Exited(ExitStatus),
    /// The process was killed by its supervisor.
    Killed,
    /// Waiting on or killing the process failed.
    WaitFailed(String),
}

impl ExitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Exited(status) if status.success())
    }

    fn describe(&self) -> String {
        match self {
            ExitOutcome::Exited(status) => status.to_string(),
            ExitOutcome::Killed => "killed".to_string(),
            ExitOutcome::WaitFailed(message) => message.clone(),
        }
    }
}

/// Launches external commands with stdout/stderr streamed to a sink.
pub struct ProcessSupervisor;

impl ProcessSupervisor {
    /// Start `spec` and return as soon as the child exists.
    ///
    /// The console window is suppressed and both pipes are read by
    /// independent tasks that forward every line as it arrives. A start
    /// failure is returned immediately. Must be called inside a tokio
    /// runtime.
    pub fn spawn(spec: &CommandSpec, sink: SharedSink) -> Result<SupervisedProcess> {
        let title = spec.display_title();

        let mut cmd = spec.to_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        platform::suppress_console(&mut cmd);

        info!("Launching {} ({})", title, spec.program.display());

        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", spec.program.display(), e);
            LauncherError::ProcessStartFailed {
                program: spec.program.display().to_string(),
                source: e,
            }
        })?;

        let pid = child.id();
        info!("Launched {} with PID {:?}", title, pid);

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, sink.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, sink.clone()));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        let task = tokio::spawn(supervise(child, readers, kill_rx, title.clone(), sink));

        Ok(SupervisedProcess {
            title,
            pid,
            kill_tx: Some(kill_tx),
            task,
        })
    }

    /// Start `spec` and wait for it to exit.
    ///
    /// Returns `Ok(())` on a clean exit and [`LauncherError::ProcessExited`]
    /// otherwise.
    pub async fn run_with_captured_output(spec: &CommandSpec, sink: SharedSink) -> Result<()> {
        Self::spawn(spec, sink)?.wait().await
    }
}

/// A running child owned by its supervisor task.
///
/// Dropping this handle kills the child.
#[derive(Debug)]
pub struct SupervisedProcess {
    title: String,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<ExitOutcome>,
}

impl SupervisedProcess {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the child has exited and been reaped.
    pub fn has_exited(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the child to exit on its own.
    pub async fn wait(self) -> Result<()> {
        let SupervisedProcess {
            title,
            kill_tx,
            task,
            ..
        } = self;
        // Held until the child exits; dropping it early would kill the child
        let _kill_guard = kill_tx;

        let outcome = join_outcome(task).await;
        if outcome.is_success() {
            Ok(())
        } else {
            Err(LauncherError::ProcessExited {
                title,
                status: outcome.describe(),
            })
        }
    }

    /// Kill the child if it is still live and wait until it is reaped.
    pub async fn terminate(mut self) -> ExitOutcome {
        if let Some(kill_tx) = self.kill_tx.take() {
            // Fails only if the child already exited
            let _ = kill_tx.send(());
        }
        join_outcome(self.task).await
    }
}

async fn join_outcome(task: JoinHandle<ExitOutcome>) -> ExitOutcome {
    match task.await {
        Ok(outcome) => outcome,
        Err(e) => ExitOutcome::WaitFailed(format!("supervisor task failed: {}", e)),
    }
}

/// Own the child until it exits or a kill is requested.
///
/// A dropped kill sender counts as a kill request.
async fn supervise(
    mut child: Child,
    readers: Vec<JoinHandle<()>>,
    mut kill_rx: oneshot::Receiver<()>,
    title: String,
    sink: SharedSink,
) -> ExitOutcome {
    let outcome = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => ExitOutcome::Exited(status),
            Err(e) => ExitOutcome::WaitFailed(e.to_string()),
        },
        _ = &mut kill_rx => {
            debug!("Killing {}", title);
            match child.kill().await {
                Ok(()) => ExitOutcome::Killed,
                Err(e) => {
                    warn!("Failed to kill {}: {}", title, e);
                    ExitOutcome::WaitFailed(e.to_string())
                }
            }
        }
    };

    // Let the readers flush what the child wrote before exiting. A grandchild
    // holding the pipe open must not keep us here.
    for mut reader in readers {
        if tokio::time::timeout(LifecycleConfig::OUTPUT_DRAIN_TIMEOUT, &mut reader)
            .await
            .is_err()
        {
            reader.abort();
        }
    }

    match &outcome {
        ExitOutcome::Exited(status) if status.success() => {
            info!("{} exited cleanly", title);
        }
        ExitOutcome::Exited(status) => {
            warn!("{} exited with {}", title, status);
            system_line(sink.as_ref(), format!("{} exited with {}", title, status));
        }
        ExitOutcome::Killed => {
            info!("{} was stopped", title);
            system_line(sink.as_ref(), format!("{} stopped", title));
        }
        ExitOutcome::WaitFailed(message) => {
            system_line(sink.as_ref(), format!("{} failed: {}", title, message));
        }
    }

    outcome
}

/// Forward each line of `stream` to the sink as soon as it is read.
fn spawn_line_reader<R>(stream: R, sink: SharedSink) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => sink.log_line(&decode_line(&buf)),
                Err(e) => {
                    debug!("Output reader stopped: {}", e);
                    break;
                }
            }
        }
    })
}

/// Decode raw output bytes into a line without its terminator.
pub(crate) fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(&['\r', '\n'][..])
        .to_string()
}
