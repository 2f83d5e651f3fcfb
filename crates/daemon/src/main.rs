// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ottobot daemon (ottod)
//!
//! One binary, two roles selected by `MODE`:
//! - api: terminates client HTTP/WS traffic, runs the reconciliation reapers
//! - worker: claims lifecycle jobs, owns sandboxes and agents

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use otto_core::{Config, LogFormat};
use otto_daemon::DaemonError;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before touching config or the store
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("ottod {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("ottod {}", env!("CARGO_PKG_VERSION"));
                println!("Ottobot daemon - session orchestration plane process");
                println!();
                println!("USAGE:");
                println!("    ottod");
                println!();
                println!("Configuration comes from the environment; MODE selects the");
                println!("process role (api | worker). Key variables: API_HOST, API_PORT,");
                println!("STORE_HOST, STORE_PORT, WORKER_CONCURRENCY, SESSION_TIMEOUT,");
                println!("DESKTOP_PORT_RANGE_START/END, TOOL_PORT_RANGE_START/END,");
                println!("AGENT_IMAGE, LOG_LEVEL, LOG_FORMAT.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: ottod [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::from_env()?;
    setup_logging(&config);

    info!(mode = %config.mode, "starting ottod");

    // Shutdown fan-in: first signal starts the drain
    let shutdown = Arc::new(Notify::new());
    spawn_signal_listener(Arc::clone(&shutdown))?;

    match otto_daemon::run(config, shutdown).await {
        Ok(()) => {
            info!("ottod stopped");
            Ok(())
        }
        Err(err) => {
            error!(error = %err, "ottod failed");
            Err(err.into())
        }
    }
}

fn spawn_signal_listener(shutdown: Arc<Notify>) -> Result<(), DaemonError> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down..."),
            _ = sigint.recv() => info!("received SIGINT, shutting down..."),
        }
        shutdown.notify_one();
    });
    Ok(())
}

fn setup_logging(config: &Config) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init(),
    }
}
