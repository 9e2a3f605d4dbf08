//! shell-gate
//!
//! A brute-force gate in front of a line-based shell server.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                      SHELL GATE                      │
//!                      │                                                      │
//!   Load balancer      │  ┌─────────┐   ┌────────────┐   ┌────────────────┐   │
//!   (PROXY v2) ────────┼─▶│   net   │──▶│ connection │──▶│ proxy_protocol │   │
//!                      │  │listener │   │    gate    │   │    decoder     │   │
//!                      │  └─────────┘   └────────────┘   └───────┬────────┘   │
//!                      │                      ▲                  │            │
//!                      │                      │ deny list        ▼            │
//!                      │                ┌─────┴──────┐   ┌────────────────┐   │
//!                      │                │  security  │◀──│  auth gate +   │   │
//!                      │                │ deny_list  │   │ authenticator  │   │
//!                      │                └────────────┘   └───────┬────────┘   │
//!                      │                                         ▼            │
//!                      │                                  ┌────────────┐      │     Shell
//!                      │                                  │  upstream  │──────┼───▶ server
//!                      │                                  │   relay    │      │
//!                      │                                  └────────────┘      │
//!                      │  config · health · lifecycle · observability         │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;

use shell_gate::config::{load_config, ConfigWatcher, GateConfig};
use shell_gate::health::HealthServer;
use shell_gate::lifecycle::{wait_for_signal, Shutdown};
use shell_gate::net::Listener;
use shell_gate::observability::{logging, metrics};
use shell_gate::security::DenyList;
use shell_gate::{auth, GateServer};

#[derive(Parser)]
#[command(name = "shell-gate")]
#[command(about = "Brute-force gate for shell servers behind a PROXY v2 load balancer", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Watch the configuration file and apply changes without a restart.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GateConfig::default(),
    };

    logging::init_logging(&config.observability.log_level, config.observability.log_format);
    tracing::info!("shell-gate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        proxy_protocol = config.proxy_protocol.enabled,
        max_fails = config.brute_force.max_fails,
        capacity = config.brute_force.capacity,
        idle_secs = config.brute_force.idle_secs,
        upstream = %config.upstream.address,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();

    let deny_list = Arc::new(DenyList::from_config(&config.brute_force));
    let persistence_path = config.brute_force.persistence_path.clone();
    if let Some(path) = &persistence_path {
        if let Err(e) = deny_list.load_from_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable deny list snapshot");
        }
    }
    let sweeper = deny_list.spawn_sweeper(
        Duration::from_secs(config.brute_force.sweep_interval_secs),
        shutdown.subscribe(),
    );

    let authenticator = auth::from_config(&config.auth)?;

    let health = if config.health.enabled {
        let server = HealthServer::bind(&config.health.bind_address).await?;
        Some(tokio::spawn(server.run(shutdown.subscribe())))
    } else {
        None
    };

    let (config_updates, _watcher) = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        _ => (mpsc::unbounded_channel().1, None),
    };

    let listener = Listener::bind(&config.listener).await?;
    let server = GateServer::new(config, Arc::clone(&deny_list), authenticator);
    let server_handle = tokio::spawn(server.run(listener, config_updates, shutdown.subscribe()));

    let signal = wait_for_signal().await;
    tracing::info!(signal, "Shutting down");
    shutdown.trigger();

    server_handle.await??;
    let _ = sweeper.await;
    if let Some(health) = health {
        let _ = health.await;
    }

    if let Some(path) = &persistence_path {
        if let Err(e) = deny_list.save_to_file(path) {
            tracing::error!(path = %path.display(), error = %e, "Failed to save deny list");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
