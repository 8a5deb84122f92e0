//! Cancellation of a relay run
//!
//! SIGINT, SIGTERM and the optional wall-clock timeout all cancel the same
//! token; the poll loop observes it between and during sleeps.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Install signal handlers that cancel `token`.
///
/// If a handler cannot be installed the run continues without it.
pub fn install_signal_handlers(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(term), Ok(int)) => (term, int),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!(error = %e, "Failed to install signal handlers");
                        return;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, cancelling");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, cancelling");
                }
                () = token.cancelled() => return,
            }
        }

        #[cfg(windows)]
        {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Failed to install Ctrl+C handler");
                        return;
                    }
                    info!("Received Ctrl+C, cancelling");
                }
                () = token.cancelled() => return,
            }
        }

        token.cancel();
    });
}

/// Cancel `token` once `timeout` has elapsed.
pub fn cancel_after(token: CancellationToken, timeout: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            () = tokio::time::sleep(timeout) => {
                warn!(timeout_secs = timeout.as_secs(), "Timeout reached, cancelling");
                token.cancel();
            }
            () = token.cancelled() => {}
        }
    });
}
