//! Gateway binary serving fixture calendars and contacts.
//!
//! Configured through `SATURN_*` environment variables or flags; see
//! `test-server --help`.

use std::sync::Arc;

use clap::Parser;
use saturn_server::render::FixtureRenderer;
use saturn_server::{startup, telemetry, Cli, NetworkModule};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.log_format)?;
    if let Some(addr) = cli.metrics_addr {
        telemetry::install_metrics(addr)?;
        info!(%addr, "metrics listener started");
    }

    let state = startup::initialize(&cli, Arc::new(FixtureRenderer::new())).await?;

    let mut module = NetworkModule::new(state);
    let port = module.start().await?;
    info!(port, "saturn gateway started");

    module.serve(shutdown_signal()).await
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received, draining");
}
