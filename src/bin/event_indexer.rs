//! Runs the indexer against the configured RPC endpoint until Ctrl-C or SIGTERM.
//!
//! Configuration is read from environment variables, see [`IndexerConfig::from_env`]. Log
//! verbosity follows `RUST_LOG` (default `info`).

use anyhow::Context;
use event_indexer::{IndexerConfig, ScannerState};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = IndexerConfig::from_env().context("invalid configuration")?;
    info!(
        rpc_url = %config.rpc_url,
        contract = %config.contract_address,
        starting_block = config.starting_block,
        output_dir = %config.output_dir.display(),
        "Starting event indexer"
    );

    let source = config.connect_source().await.context("failed to connect to RPC endpoint")?;
    let scanner = config.scanner_builder().build(source).context("failed to build scanner")?;
    let handle = scanner.start();

    tokio::select! {
        () = shutdown_signal() => info!("Shutdown signal received, stopping"),
        _ = handle.wait_until(|progress| progress.state == ScannerState::Stopped) => {}
    }

    match handle.stop().await {
        Ok(summary) => {
            info!(
                next_block = summary.next_block,
                events = summary.events_indexed,
                artifacts = summary.artifacts_written,
                "Indexer stopped"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Indexer failed");
            Err(e.into())
        }
    }
}

/// Resolves on Ctrl-C, or on SIGTERM where available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
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
                error!(error = %e, "Failed to listen for SIGTERM");
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
}
