//! Operator interrupt handling
//!
//! Ctrl+C (and SIGTERM on Unix) cancel the run's token. The orchestrator
//! notices at its next wait and shuts down; further signals while shutting
//! down are only logged, so cleanup runs exactly once.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Spawn a task that cancels `cancel` on every interrupt signal
pub fn install_interrupt_handler(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if !wait_for_signal().await {
                return;
            }
            if cancel.is_cancelled() {
                info!("Interrupt received again; already shutting down");
            } else {
                info!("Interrupt received. Shutting down...");
                cancel.cancel();
            }
        }
    })
}

/// `false` if no signal handler could be installed
async fn wait_for_signal() -> bool {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}. Only Ctrl+C will stop the run", e);
                None
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                    false
                }
            },
            _ = async {
                match term_signal {
                    Some(mut sig) => {
                        sig.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => true,
        }
    }
    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to listen for Ctrl+C: {}", e);
                false
            }
        }
    }
}
