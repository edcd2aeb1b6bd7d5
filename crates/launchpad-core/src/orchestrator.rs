//! Lifecycle orchestration: prerequisites, install, start or attach, wait
//! for readiness, and teardown.
//!
//! # State machine
//!
//! ```text
//! Init -> CheckingPrerequisites -> [Installing] -> CheckingServer
//!      -> (StartingServer | AttachingToRunning) -> WaitingReady
//!      -> (Ready | TimedOut)
//! ```
//!
//! `Failed` ends an attempt when the installer or the server start fails.
//! `Stopping -> Stopped` is reachable from any state through [`Orchestrator::stop`].
//!
//! The session runs on its own task; progress reaches the host through the
//! sink and the [`LifecycleState`] watch channel.

use crate::config::LauncherConfig;
use crate::error::{LauncherError, Result};
use crate::probe::{ReadinessOutcome, ReadinessProber};
use crate::process::{ProcessSupervisor, SupervisedProcess};
use crate::resolve::{base_url, resolve};
use crate::sink::{system_line, SharedSink};
use crate::tail::LogTailer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Observable orchestrator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Init,
    CheckingPrerequisites,
    Installing,
    CheckingServer,
    StartingServer,
    AttachingToRunning,
    WaitingReady,
    Ready,
    TimedOut,
    /// The attempt ended early (installer or server start failed).
    Failed(String),
    Stopping,
    Stopped,
}

impl LifecycleState {
    /// Whether the startup attempt has settled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LifecycleState::Ready
                | LifecycleState::TimedOut
                | LifecycleState::Failed(_)
                | LifecycleState::Stopped
        )
    }
}

/// Boots, supervises and tears down the background service.
///
/// Dropping the orchestrator aborts its tasks and kills any child it
/// started.
pub struct Orchestrator {
    inner: Arc<Inner>,
    session: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    config: LauncherConfig,
    endpoint: String,
    prober: ReadinessProber,
    sink: SharedSink,
    /// The single supervised server process, if this orchestrator started one.
    child: Mutex<Option<SupervisedProcess>>,
    tail: Mutex<Option<JoinHandle<()>>>,
    state: watch::Sender<LifecycleState>,
    stopping: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Orchestrator {
    /// Create an orchestrator. The endpoint is resolved once here.
    pub fn new(config: LauncherConfig, sink: SharedSink) -> Result<Self> {
        config.validate()?;

        let endpoint = resolve(&config.address);
        let prober = ReadinessProber::new(config.probe_timeout())?;
        let (state, _) = watch::channel(LifecycleState::Init);

        debug!("Orchestrator endpoint {} (configured {})", endpoint, config.address);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                endpoint,
                prober,
                sink,
                child: Mutex::new(None),
                tail: Mutex::new(None),
                state,
                stopping: AtomicBool::new(false),
            }),
            session: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.inner.config
    }

    /// Resolved `host:port` used for every probe.
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn base_url(&self) -> String {
        base_url(&self.inner.endpoint)
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.inner.state.subscribe()
    }

    /// PID of the server this orchestrator started, if any.
    pub fn child_pid(&self) -> Option<u32> {
        lock(&self.inner.child).as_ref().and_then(|child| child.pid())
    }

    /// Wait until the current attempt settles and return the final state.
    pub async fn wait_until_settled(&self) -> LifecycleState {
        let mut rx = self.subscribe();
        let settled = match rx.wait_for(LifecycleState::is_terminal).await {
            Ok(state) => state.clone(),
            Err(_) => LifecycleState::Stopped,
        };
        settled
    }

    /// Begin the startup sequence on a background task and return at once.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut session = lock(&self.session);
        if session.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(LauncherError::AlreadyStarted);
        }
        if let Some(child) = lock(&self.inner.child).as_ref() {
            if !child.has_exited() {
                return Err(LauncherError::AlreadyRunning { pid: child.pid() });
            }
        }
        if let Some(tail) = lock(&self.inner.tail).take() {
            tail.abort();
        }

        self.inner.stopping.store(false, Ordering::SeqCst);
        self.inner.set_state(LifecycleState::Init);

        let inner = Arc::clone(&self.inner);
        *session = Some(tokio::spawn(async move { inner.run_session().await }));

        info!("Orchestrator started for {}", self.inner.endpoint);
        Ok(())
    }

    /// Tear down everything this orchestrator started.
    ///
    /// Safe to call at any time, repeatedly, and with nothing started. A
    /// server that was only attached to is never shut down or killed.
    pub async fn stop(&self) {
        let inner = &self.inner;
        inner.stopping.store(true, Ordering::SeqCst);
        inner.set_state(LifecycleState::Stopping);

        let session = lock(&self.session).take();
        if let Some(handle) = session {
            handle.abort();
            let _ = handle.await;
        }

        let child = lock(&inner.child).take();
        if let Some(child) = child {
            info!("Requesting graceful shutdown of {}", child.title());
            inner
                .prober
                .request_shutdown(&inner.endpoint, inner.config.shutdown_timeout())
                .await;

            if !child.has_exited() {
                debug!("{} still running, killing", child.title());
            }
            let outcome = child.terminate().await;
            debug!("Server terminated: {:?}", outcome);
        }

        let tail = lock(&inner.tail).take();
        if let Some(tail) = tail {
            tail.abort();
        }

        inner.set_state(LifecycleState::Stopped);
        info!("Orchestrator stopped");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(session) = lock(&self.session).take() {
            session.abort();
        }
        if let Some(tail) = lock(&self.inner.tail).take() {
            tail.abort();
        }
        // Dropping the handle kills the child
        let _ = lock(&self.inner.child).take();
    }
}

impl Inner {
    fn set_state(&self, state: LifecycleState) {
        debug!("Lifecycle state -> {:?}", state);
        self.state.send_replace(state);
    }

    fn fail(&self, err: &LauncherError) {
        if err.is_terminal() {
            error!("Startup failed: {}", err);
        } else {
            warn!("Startup aborted: {}", err);
        }
        system_line(self.sink.as_ref(), err.to_string());
        self.set_state(LifecycleState::Failed(err.to_string()));
    }

    fn child_exited(&self) -> bool {
        lock(&self.child)
            .as_ref()
            .is_some_and(|child| child.has_exited())
    }

    async fn run_session(self: Arc<Self>) {
        self.set_state(LifecycleState::CheckingPrerequisites);

        if let Err(missing) = self.config.prerequisites().check() {
            info!("{}; running installer", missing);
            if let Err(e) = self.install().await {
                self.fail(&e);
                return;
            }
            if !self.config.prerequisites().are_met() {
                warn!("Installer finished but prerequisites are still missing");
            }
        }

        self.set_state(LifecycleState::CheckingServer);

        let started = if self.prober.is_running(&self.endpoint).await {
            self.attach_to_running();
            false
        } else {
            if let Err(e) = self.start_server() {
                self.fail(&e);
                return;
            }
            true
        };

        self.set_state(LifecycleState::WaitingReady);

        let policy = self.config.ready_policy();
        debug!(
            "Readiness wait bounded by {} attempts (at most {:?})",
            policy.max_attempts,
            policy.worst_case(self.config.probe_timeout())
        );
        let outcome = self
            .prober
            .wait_until_ready(&self.endpoint, &policy, || started && self.child_exited())
            .await;

        match outcome {
            ReadinessOutcome::Ready { .. } => {
                let url = base_url(&self.endpoint);
                system_line(self.sink.as_ref(), format!("Server ready at {}", url));
                self.sink.ready(&url);
                self.set_state(LifecycleState::Ready);
            }
            ReadinessOutcome::TimedOut { attempts } => {
                let err = LauncherError::ReadinessTimeout { attempts };
                error!("{}", err);
                system_line(self.sink.as_ref(), err.to_string());
                self.set_state(LifecycleState::TimedOut);
            }
            ReadinessOutcome::Abandoned { .. } => {
                let message = "Server exited before becoming ready".to_string();
                error!("{}", message);
                system_line(self.sink.as_ref(), &message);
                self.set_state(LifecycleState::Failed(message));
            }
        }
    }

    /// Run the installer to completion. Any error is terminal.
    async fn install(&self) -> Result<()> {
        self.set_state(LifecycleState::Installing);

        let installer = self.config.installer_command();
        self.sink.set_title(&installer.display_title());
        system_line(self.sink.as_ref(), "Prerequisites missing, running installer");

        let as_install_error = |e: LauncherError| LauncherError::InstallerFailed {
            message: e.to_string(),
        };

        let process =
            ProcessSupervisor::spawn(&installer, Arc::clone(&self.sink)).map_err(as_install_error)?;

        match self.config.installer_timeout() {
            Some(limit) => match tokio::time::timeout(limit, process.wait()).await {
                Ok(result) => result.map_err(as_install_error),
                // The dropped wait future kills the installer
                Err(_) => Err(LauncherError::InstallerTimedOut(limit)),
            },
            None => process.wait().await.map_err(as_install_error),
        }
    }

    /// Spawn the server and store it in the child slot.
    fn start_server(&self) -> Result<()> {
        self.set_state(LifecycleState::StartingServer);

        let mut slot = lock(&self.child);
        if let Some(existing) = slot.as_ref() {
            if !existing.has_exited() {
                return Err(LauncherError::AlreadyRunning {
                    pid: existing.pid(),
                });
            }
        }
        if self.stopping.load(Ordering::SeqCst) {
            return Ok(());
        }

        let server = self.config.server_command();
        let process = ProcessSupervisor::spawn(&server, Arc::clone(&self.sink))?;
        self.sink.set_title(process.title());
        *slot = Some(process);
        Ok(())
    }

    /// Follow the persisted log of a server someone else started.
    fn attach_to_running(&self) {
        self.set_state(LifecycleState::AttachingToRunning);

        let log_file = self.config.log_file_path();
        let title = log_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| log_file.display().to_string());

        info!(
            "Server already running at {}, tailing {}",
            self.endpoint,
            log_file.display()
        );
        self.sink.set_title(&title);

        let handle = tokio::spawn(LogTailer::tail(
            log_file,
            self.config.tail_interval(),
            Arc::clone(&self.sink),
        ));
        if let Some(previous) = lock(&self.tail).replace(handle) {
            previous.abort();
        }
    }
}
