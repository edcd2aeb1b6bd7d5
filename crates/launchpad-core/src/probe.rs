//! HTTP readiness probing against the supervised service.
//!
//! Both predicates hit `GET /api/version`. "Running" accepts any HTTP
//! response, "ready" requires status 200; a service that is up but still
//! initializing counts as running but not ready. Transport failures of any
//! kind (refused, DNS, timeout) collapse to "not running".

use crate::config::LifecycleConfig;
use crate::error::{LauncherError, Result};
use crate::resolve::base_url;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info, warn};

const VERSION_PATH: &str = "/api/version";
const SHUTDOWN_PATH: &str = "/api/shutdown";

/// Liveness of the service as seen by the last probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadinessState {
    #[default]
    Unknown,
    NotRunning,
    Running,
    Ready,
    TimedOut,
}

/// Polling cadence for the readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl ReadinessPolicy {
    /// Longest a readiness wait can take when every probe runs into
    /// `probe_timeout`. The attempt count stays bounded; wall time does not
    /// equal `interval * max_attempts`.
    pub fn worst_case(&self, probe_timeout: Duration) -> Duration {
        let probes = probe_timeout.saturating_mul(self.max_attempts);
        let sleeps = self
            .interval
            .saturating_mul(self.max_attempts.saturating_sub(1));
        probes.saturating_add(sleeps)
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            interval: LifecycleConfig::READY_POLL_INTERVAL,
            max_attempts: LifecycleConfig::READY_MAX_ATTEMPTS,
        }
    }
}

/// How a readiness wait ended. `attempts` counts the probes issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Ready { attempts: u32 },
    TimedOut { attempts: u32 },
    /// The caller asked to stop waiting (e.g. the server exited).
    Abandoned { attempts: u32 },
}

impl ReadinessOutcome {
    pub fn state(&self) -> ReadinessState {
        match self {
            ReadinessOutcome::Ready { .. } => ReadinessState::Ready,
            ReadinessOutcome::TimedOut { .. } => ReadinessState::TimedOut,
            ReadinessOutcome::Abandoned { .. } => ReadinessState::NotRunning,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ReadinessOutcome::Ready { attempts }
            | ReadinessOutcome::TimedOut { attempts }
            | ReadinessOutcome::Abandoned { attempts } => *attempts,
        }
    }
}

/// Bounded HTTP checks against a resolved endpoint.
///
/// Every call uses a fresh connection; idle connections are never pooled.
#[derive(Debug, Clone)]
pub struct ReadinessProber {
    client: Client,
}

impl ReadinessProber {
    /// Create a prober whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_max_idle_per_host(0)
            .no_proxy()
            .user_agent("launchpad/0.1")
            .build()
            .map_err(|e| LauncherError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self { client })
    }

    /// Issue one version request and classify the response.
    pub async fn probe(&self, endpoint: &str) -> ReadinessState {
        let url = format!("{}{}", base_url(endpoint), VERSION_PATH);

        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status();
                // Drain so the connection closes cleanly
                let _ = response.bytes().await;
                if status == StatusCode::OK {
                    ReadinessState::Ready
                } else {
                    debug!("{} answered {}", url, status);
                    ReadinessState::Running
                }
            }
            Err(e) => {
                debug!("Probe of {} failed: {}", url, e);
                ReadinessState::NotRunning
            }
        }
    }

    /// Something is listening and speaking HTTP.
    pub async fn is_running(&self, endpoint: &str) -> bool {
        self.probe(endpoint).await != ReadinessState::NotRunning
    }

    /// The version endpoint answers 200.
    pub async fn is_ready(&self, endpoint: &str) -> bool {
        self.probe(endpoint).await == ReadinessState::Ready
    }

    /// Ask the service to shut down. Best effort; the outcome is not checked.
    pub async fn request_shutdown(&self, endpoint: &str, timeout: Duration) {
        let url = format!("{}{}", base_url(endpoint), SHUTDOWN_PATH);

        match self.client.post(&url).timeout(timeout).send().await {
            Ok(response) => {
                debug!("Shutdown request answered {}", response.status());
                let _ = response.bytes().await;
            }
            Err(e) => debug!("Shutdown request to {} failed: {}", url, e),
        }
    }

    /// Poll `is_ready` at a fixed cadence until it succeeds, the attempt
    /// budget runs out, or `abandon` returns true.
    ///
    /// Polling is sequential: one probe per interval.
    pub async fn wait_until_ready<F>(
        &self,
        endpoint: &str,
        policy: &ReadinessPolicy,
        mut abandon: F,
    ) -> ReadinessOutcome
    where
        F: FnMut() -> bool,
    {
        info!("Waiting for server at {} to become ready...", endpoint);

        for attempt in 1..=policy.max_attempts {
            if self.is_ready(endpoint).await {
                info!("Server is ready after {} attempt(s)", attempt);
                return ReadinessOutcome::Ready { attempts: attempt };
            }
            if abandon() {
                debug!("Readiness wait abandoned after {} attempt(s)", attempt);
                return ReadinessOutcome::Abandoned { attempts: attempt };
            }
            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }

        warn!(
            "Server did not become ready after {} attempts",
            policy.max_attempts
        );
        ReadinessOutcome::TimedOut {
            attempts: policy.max_attempts,
        }
    }
}
