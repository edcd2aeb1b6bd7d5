//! Launchpad - headless host for the lifecycle orchestrator.
//!
//! Runs the install / start / attach sequence for a launcher root and
//! prints sink events to stdout until Ctrl+C.

use anyhow::{bail, Context, Result};
use clap::Parser;
use launchpad_core::{
    classify, ChannelSink, LauncherConfig, LauncherEvent, LifecycleState, Orchestrator,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "launchpad")]
#[command(about = "Install, start and supervise a local service")]
struct Args {
    /// JSON config file (relative paths resolve against its directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Launcher root directory (defaults to the current directory)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Service address as host:port
    #[arg(short, long)]
    address: Option<String>,

    /// Installer program
    #[arg(long)]
    installer: Option<PathBuf>,

    /// Server program
    #[arg(long)]
    server: Option<PathBuf>,

    /// Enable debug logging (ignored when RUST_LOG is set)
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries sink events
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_directive(args.debug)));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = build_config(&args)?;
    info!(
        "Launcher root: {} ({})",
        config.root_dir.display(),
        launchpad_core::platform::current_platform()
    );

    let (sink, mut events) = ChannelSink::new();
    let orchestrator = Orchestrator::new(config, Arc::new(sink))?;
    let mut state = orchestrator.subscribe();

    orchestrator.start()?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let failure = loop {
        tokio::select! {
            Some(event) = events.recv() => print_event(&event),
            changed = state.changed() => {
                if changed.is_err() {
                    break None;
                }
                let current = state.borrow_and_update().clone();
                match current {
                    LifecycleState::Failed(reason) => break Some(reason),
                    LifecycleState::TimedOut => {
                        break Some("server did not become ready".to_string())
                    }
                    _ => {}
                }
            }
            signal = &mut shutdown => {
                signal.context("failed to listen for Ctrl+C")?;
                info!("Shutdown signal received, stopping");
                break None;
            }
        }
    };

    orchestrator.stop().await;
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }

    if let Some(reason) = failure {
        error!("Startup did not complete: {}", reason);
        bail!("startup did not complete: {}", reason);
    }

    Ok(())
}

fn default_log_directive(debug: bool) -> &'static str {
    if debug {
        "launchpad=debug,launchpad_core=debug,info"
    } else {
        "info"
    }
}

/// CLI options override values loaded from `--config`.
fn build_config(args: &Args) -> Result<LauncherConfig> {
    let mut config = match &args.config {
        Some(path) => LauncherConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => LauncherConfig::new(std::env::current_dir()?),
    };

    if let Some(ref root) = args.root {
        config.root_dir = root.clone();
    }
    if let Some(ref address) = args.address {
        config = config.with_address(address.clone());
    }
    if let Some(ref installer) = args.installer {
        config.installer.program = installer.clone();
    }
    if let Some(ref server) = args.server {
        config.server.program = server.clone();
    }

    config.validate()?;
    Ok(config)
}

fn print_event(event: &LauncherEvent) {
    match event {
        LauncherEvent::Title(title) => println!("== {} ==", title),
        LauncherEvent::Log(line) => println!("[{}] {}", classify(line).as_str(), line),
        // Intentional stdout for the embedding host
        LauncherEvent::Ready(url) => println!("READY {}", url),
    }
}
