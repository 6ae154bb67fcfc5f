// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown coordination with signal handling.
//!
//! SIGTERM and SIGINT (Ctrl+C) cancel the root [`CancellationToken`]; the
//! gateway, consumers and sweepers all watch a child of it. Background
//! tasks are then drained with a deadline.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            info!("received SIGINT (Ctrl+C), initiating shutdown");
                        }
                        _ = sigterm.recv() => {
                            info!("received SIGTERM, initiating shutdown");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler, listening for Ctrl+C only");
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Waits up to `timeout` for background tasks to finish, then aborts the
/// stragglers. Returns how many tasks finished on their own.
pub async fn drain_tasks(tasks: Vec<JoinHandle<()>>, timeout: Duration) -> usize {
    if tasks.is_empty() {
        info!("no background tasks to drain");
        return 0;
    }

    info!(count = tasks.len(), "waiting for background tasks to stop");
    let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();

    match tokio::time::timeout(timeout, futures::future::join_all(tasks)).await {
        Ok(results) => {
            let mut finished = 0;
            for result in results {
                match result {
                    Ok(()) => finished += 1,
                    Err(e) => warn!(error = %e, "background task ended abnormally"),
                }
            }
            info!(finished, "background tasks drained");
            finished
        }
        Err(_) => {
            let pending = aborts.iter().filter(|a| !a.is_finished()).count();
            warn!(
                pending,
                timeout_secs = timeout.as_secs(),
                "drain timeout reached, aborting remaining tasks"
            );
            for abort in &aborts {
                abort.abort();
            }
            aborts.len() - pending
        }
    }
}
