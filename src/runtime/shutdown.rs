//! # Shutdown
//!
//! SIGINT/SIGTERM handling. The first signal starts a graceful drain; a second
//! one exits immediately with status 1.

use tracing::{error, info, warn};

/// Resolves on the first shutdown signal
pub async fn shutdown_signal() {
    wait_for_signal().await;
    info!("Received shutdown signal, waiting for in-flight passes (signal again to force exit)");

    tokio::spawn(async {
        wait_for_signal().await;
        error!("Received second shutdown signal, exiting");
        std::process::exit(1);
    });
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
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
