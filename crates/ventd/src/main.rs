//! ventd
//!
//! Keeps HVAC vent dampers in line with room occupancy and temperature.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use ventd::format_diagnostics;
use ventd::Config;
use ventd::Controller;
use ventd::RestClient;

/// Occupancy-driven vent controller for Home Assistant
#[derive(Parser, Debug)]
#[command(name = "ventd", version)]
#[command(about = "Occupancy-driven vent controller for Home Assistant", long_about = None)]
struct Args {
    /// Config file; repeat to merge several (first definition wins)
    #[arg(short, long = "config", default_value = "ventd.toml")]
    config: Vec<PathBuf>,

    /// Decide and log, but never move a vent
    #[arg(long)]
    dry_run: bool,

    /// Seconds between cycles; 0 runs a single cycle and exits
    #[arg(long)]
    interval: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, diagnostics) = match Config::from_files(&args.config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    if !diagnostics.is_empty() {
        eprint!("{}", format_diagnostics(&diagnostics));
    }

    tracing_subscriber::registry()
        .with(config.logging.targets())
        .with(tracing_subscriber::fmt::layer())
        .init();

    if args.dry_run {
        config.control.dry_run = true;
    }
    if let Some(secs) = args.interval {
        config.control.interval = Duration::from_secs(secs);
    }

    info!("ventd v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Home Assistant at {}", config.home_assistant.url);

    let token = config.home_assistant.token().with_context(|| {
        format!(
            "No access token: set home_assistant.token or the {} environment variable",
            config.home_assistant.token_env
        )
    })?;
    let client = RestClient::new(
        &config.home_assistant.url,
        &token,
        config.home_assistant.timeout,
    )
    .context("Failed to build Home Assistant client")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    Controller::new(client, config.control).run(shutdown_rx).await;

    info!("ventd shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
