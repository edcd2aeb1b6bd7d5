//! Integration tests for the orchestrator lifecycle.
//!
//! Each test runs against a temporary launcher root and, where the service
//! has to answer HTTP, an axum mock bound to an ephemeral port.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use launchpad_core::{
    ChannelSink, CommandSpec, LauncherConfig, LauncherError, LauncherEvent, LifecycleState,
    Orchestrator,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct MockServer {
    version_status: StatusCode,
    /// Version checks answered with `version_status` before switching to 200.
    ready_after: usize,
    version_hits: Arc<AtomicUsize>,
    shutdown_hits: Arc<AtomicUsize>,
}

impl MockServer {
    fn new(version_status: StatusCode) -> Self {
        Self {
            version_status,
            ready_after: usize::MAX,
            version_hits: Arc::new(AtomicUsize::new(0)),
            shutdown_hits: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn ready_after(mut self, checks: usize) -> Self {
        self.ready_after = checks;
        self
    }

    fn version_hits(&self) -> usize {
        self.version_hits.load(Ordering::SeqCst)
    }

    fn shutdown_hits(&self) -> usize {
        self.shutdown_hits.load(Ordering::SeqCst)
    }

    /// Serve on an already bound listener.
    fn serve(&self, listener: TcpListener) {
        let app = Router::new()
            .route("/api/version", get(version))
            .route("/api/shutdown", post(shutdown))
            .with_state(self.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
    }

    async fn spawn(version_status: StatusCode) -> (String, Self) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        let mock = Self::new(version_status);
        mock.serve(listener);
        (endpoint, mock)
    }
}

async fn version(State(state): State<MockServer>) -> StatusCode {
    let seen = state.version_hits.fetch_add(1, Ordering::SeqCst);
    if seen >= state.ready_after {
        StatusCode::OK
    } else {
        state.version_status
    }
}

async fn shutdown(State(state): State<MockServer>) -> StatusCode {
    state.shutdown_hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

/// An address nothing listens on.
async fn unused_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = listener.local_addr().unwrap().to_string();
    drop(listener);
    endpoint
}

fn satisfy_prerequisites(root: &Path) {
    std::fs::create_dir_all(root.join("data")).unwrap();
    std::fs::write(root.join(".env"), "PORT=1920\n").unwrap();
}

fn test_config(root: &Path, endpoint: &str) -> LauncherConfig {
    LauncherConfig::new(root)
        .with_address(endpoint)
        .with_readiness(Duration::from_millis(20), 250)
        .with_probe_timeout(Duration::from_millis(300))
        .with_tail_interval(Duration::from_millis(20))
}

fn orchestrator(config: LauncherConfig) -> (Orchestrator, UnboundedReceiver<LauncherEvent>) {
    let (sink, rx) = ChannelSink::new();
    let orchestrator = Orchestrator::new(config, Arc::new(sink)).unwrap();
    (orchestrator, rx)
}

async fn settle(orchestrator: &Orchestrator) -> LifecycleState {
    tokio::time::timeout(SETTLE_TIMEOUT, orchestrator.wait_until_settled())
        .await
        .expect("orchestrator did not settle")
}

/// Receive events until one matches, returning everything seen.
async fn wait_for_event<F>(
    rx: &mut UnboundedReceiver<LauncherEvent>,
    mut matches: F,
) -> Vec<LauncherEvent>
where
    F: FnMut(&LauncherEvent) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(SETTLE_TIMEOUT, rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("sink closed");
        let done = matches(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

fn drain(rx: &mut UnboundedReceiver<LauncherEvent>) -> Vec<LauncherEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn has_log(events: &[LauncherEvent], needle: &str) -> bool {
    events
        .iter()
        .any(|event| matches!(event, LauncherEvent::Log(line) if line.contains(needle)))
}

#[tokio::test]
async fn test_attaches_to_running_server_and_tails_log() {
    let temp_dir = TempDir::new().unwrap();
    satisfy_prerequisites(temp_dir.path());
    std::fs::write(temp_dir.path().join("data/server.log"), "old line\n").unwrap();

    let (endpoint, mock) = MockServer::spawn(StatusCode::OK).await;
    let (orchestrator, mut rx) = orchestrator(test_config(temp_dir.path(), &endpoint));

    orchestrator.start().unwrap();
    assert_eq!(settle(&orchestrator).await, LifecycleState::Ready);

    let events = wait_for_event(&mut rx, |e| matches!(e, LauncherEvent::Ready(_))).await;
    assert!(events.contains(&LauncherEvent::Title("server.log".into())));
    assert_eq!(
        events.last(),
        Some(&LauncherEvent::Ready(format!("http://{endpoint}")))
    );
    assert!(orchestrator.child_pid().is_none());

    // Give the tail a moment to open and seek before appending
    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut log = std::fs::OpenOptions::new()
        .append(true)
        .open(temp_dir.path().join("data/server.log"))
        .unwrap();
    std::io::Write::write_all(&mut log, b"fresh line\n").unwrap();

    let events =
        wait_for_event(&mut rx, |e| *e == LauncherEvent::Log("fresh line".into())).await;
    assert!(!has_log(&events, "old line"));

    orchestrator.stop().await;
    assert_eq!(orchestrator.state(), LifecycleState::Stopped);
    assert_eq!(mock.shutdown_hits(), 0);
}

#[tokio::test]
async fn test_running_but_never_ready_times_out() {
    let temp_dir = TempDir::new().unwrap();
    satisfy_prerequisites(temp_dir.path());

    let (endpoint, mock) = MockServer::spawn(StatusCode::SERVICE_UNAVAILABLE).await;
    let config = test_config(temp_dir.path(), &endpoint)
        .with_readiness(Duration::from_millis(20), 3);
    let (orchestrator, mut rx) = orchestrator(config);

    orchestrator.start().unwrap();
    assert_eq!(settle(&orchestrator).await, LifecycleState::TimedOut);

    // One running check plus three readiness attempts
    assert_eq!(mock.version_hits(), 4);

    let events = drain(&mut rx);
    assert!(!events.iter().any(|e| matches!(e, LauncherEvent::Ready(_))));
    assert!(has_log(&events, "did not become ready after 3 attempts"));

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_stop_twice_is_harmless() {
    let temp_dir = TempDir::new().unwrap();
    satisfy_prerequisites(temp_dir.path());

    let (endpoint, _mock) = MockServer::spawn(StatusCode::OK).await;
    let (orchestrator, _rx) = orchestrator(test_config(temp_dir.path(), &endpoint));

    orchestrator.start().unwrap();
    settle(&orchestrator).await;

    orchestrator.stop().await;
    orchestrator.stop().await;
    assert_eq!(orchestrator.state(), LifecycleState::Stopped);
}

#[cfg(unix)]
mod unix {
    use super::*;
    use launchpad_core::platform::is_process_alive;

    #[tokio::test]
    async fn test_starts_server_and_stop_requests_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        satisfy_prerequisites(temp_dir.path());

        // Bound but not serving yet: the running check times out
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();

        let config = test_config(temp_dir.path(), &endpoint).with_server(
            CommandSpec::new("sleep").with_arg("30").with_title("Server"),
        );
        let (orchestrator, mut rx) = orchestrator(config);

        orchestrator.start().unwrap();
        wait_for_event(&mut rx, |e| *e == LauncherEvent::Title("Server".into())).await;

        let pid = orchestrator.child_pid().expect("server should be supervised");
        assert!(is_process_alive(pid));

        let mock = MockServer::new(StatusCode::SERVICE_UNAVAILABLE);
        mock.serve(listener);

        tokio::time::timeout(SETTLE_TIMEOUT, orchestrator.stop())
            .await
            .unwrap();

        assert_eq!(orchestrator.state(), LifecycleState::Stopped);
        assert_eq!(mock.shutdown_hits(), 1);
        assert!(!is_process_alive(pid));
        assert!(orchestrator.child_pid().is_none());
    }

    #[tokio::test]
    async fn test_started_server_becomes_ready_on_fourth_check() {
        let temp_dir = TempDir::new().unwrap();
        satisfy_prerequisites(temp_dir.path());

        // Nothing listens during the running check, so the server is spawned
        let endpoint = unused_endpoint().await;
        let config = test_config(temp_dir.path(), &endpoint).with_server(
            CommandSpec::new("sleep").with_arg("30").with_title("Server"),
        );
        let (orchestrator, mut rx) = orchestrator(config);

        orchestrator.start().unwrap();
        wait_for_event(&mut rx, |e| *e == LauncherEvent::Title("Server".into())).await;

        let pid = orchestrator.child_pid().expect("server should be supervised");

        // The server comes up on its port: three non-200 answers, then 200
        let mock = MockServer::new(StatusCode::SERVICE_UNAVAILABLE).ready_after(3);
        mock.serve(TcpListener::bind(endpoint.as_str()).await.unwrap());

        assert_eq!(settle(&orchestrator).await, LifecycleState::Ready);
        assert_eq!(mock.version_hits(), 4);

        let events = wait_for_event(&mut rx, |e| matches!(e, LauncherEvent::Ready(_))).await;
        assert_eq!(
            events.last(),
            Some(&LauncherEvent::Ready(format!("http://{endpoint}")))
        );
        assert!(is_process_alive(pid));

        tokio::time::timeout(SETTLE_TIMEOUT, orchestrator.stop())
            .await
            .unwrap();

        assert_eq!(mock.shutdown_hits(), 1);
        assert!(!is_process_alive(pid));
    }

    #[tokio::test]
    async fn test_server_exiting_before_ready_fails() {
        let temp_dir = TempDir::new().unwrap();
        satisfy_prerequisites(temp_dir.path());

        let endpoint = unused_endpoint().await;
        let config = test_config(temp_dir.path(), &endpoint).with_server(
            CommandSpec::new("sh")
                .with_args(["-c", "echo booting; exit 1"])
                .with_title("Server"),
        );
        let (orchestrator, mut rx) = orchestrator(config);

        orchestrator.start().unwrap();
        match settle(&orchestrator).await {
            LifecycleState::Failed(message) => assert!(message.contains("exited")),
            other => panic!("unexpected state: {other:?}"),
        }

        let events = drain(&mut rx);
        assert!(has_log(&events, "booting"));
        assert!(has_log(&events, "[launcher] Server exited with"));

        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_missing_server_binary_fails() {
        let temp_dir = TempDir::new().unwrap();
        satisfy_prerequisites(temp_dir.path());

        let endpoint = unused_endpoint().await;
        let (orchestrator, _rx) = orchestrator(test_config(temp_dir.path(), &endpoint));

        orchestrator.start().unwrap();
        match settle(&orchestrator).await {
            LifecycleState::Failed(message) => assert!(message.contains("Failed to start")),
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_installer_failure_is_terminal() {
        let temp_dir = TempDir::new().unwrap();
        let endpoint = unused_endpoint().await;
        let config = test_config(temp_dir.path(), &endpoint).with_installer(
            CommandSpec::new("sh")
                .with_args(["-c", "echo installing; exit 3"])
                .with_title("Installer"),
        );
        let (orchestrator, mut rx) = orchestrator(config);

        orchestrator.start().unwrap();
        match settle(&orchestrator).await {
            LifecycleState::Failed(message) => assert!(message.starts_with("Installer failed")),
            other => panic!("unexpected state: {other:?}"),
        }

        let events = drain(&mut rx);
        assert_eq!(events.first(), Some(&LauncherEvent::Title("Installer".into())));
        assert!(has_log(&events, "installing"));
        assert!(orchestrator.child_pid().is_none());
    }

    #[tokio::test]
    async fn test_successful_install_proceeds_to_ready() {
        let temp_dir = TempDir::new().unwrap();
        let (endpoint, _mock) = MockServer::spawn(StatusCode::OK).await;
        let config = test_config(temp_dir.path(), &endpoint).with_installer(
            CommandSpec::new("sh")
                .with_args(["-c", "mkdir -p data && touch .env && echo installed"])
                .with_title("Installer"),
        );
        let (orchestrator, mut rx) = orchestrator(config);

        orchestrator.start().unwrap();
        assert_eq!(settle(&orchestrator).await, LifecycleState::Ready);

        assert!(temp_dir.path().join("data").is_dir());
        assert!(temp_dir.path().join(".env").is_file());

        let events = wait_for_event(&mut rx, |e| matches!(e, LauncherEvent::Ready(_))).await;
        assert!(has_log(&events, "installed"));
        let titles: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                LauncherEvent::Title(title) => Some(title.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(titles, vec!["Installer", "server.log"]);

        orchestrator.stop().await;
    }

    #[tokio::test]
    async fn test_installer_timeout_is_terminal() {
        let temp_dir = TempDir::new().unwrap();
        let endpoint = unused_endpoint().await;
        let config = test_config(temp_dir.path(), &endpoint)
            .with_installer(CommandSpec::new("sleep").with_arg("30"))
            .with_installer_timeout(Duration::from_secs(1));
        let (orchestrator, _rx) = orchestrator(config);

        orchestrator.start().unwrap();
        match settle(&orchestrator).await {
            LifecycleState::Failed(message) => assert!(message.contains("did not finish")),
            other => panic!("unexpected state: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_active() {
        let temp_dir = TempDir::new().unwrap();
        let endpoint = unused_endpoint().await;
        let config = test_config(temp_dir.path(), &endpoint)
            .with_installer(CommandSpec::new("sleep").with_arg("30").with_title("Installer"));
        let (orchestrator, mut rx) = orchestrator(config);

        orchestrator.start().unwrap();
        wait_for_event(&mut rx, |e| *e == LauncherEvent::Title("Installer".into())).await;

        assert!(matches!(
            orchestrator.start(),
            Err(LauncherError::AlreadyStarted)
        ));

        tokio::time::timeout(SETTLE_TIMEOUT, orchestrator.stop())
            .await
            .unwrap();
        assert_eq!(orchestrator.state(), LifecycleState::Stopped);
    }
}
