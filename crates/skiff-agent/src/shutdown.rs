// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown coordination with signal handling.
//!
//! Installs handlers for SIGTERM and SIGINT (Ctrl+C), triggering a
//! [`CancellationToken`] that the agent loop monitors. Session actors are
//! drained before the process exits.

use std::time::Duration;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatcher::SessionDispatcher;

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a token that is cancelled when either signal arrives.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler, only Ctrl+C will stop the process");
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received SIGINT (Ctrl+C), initiating shutdown");
            }
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT (Ctrl+C), initiating shutdown"),
        _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("received Ctrl+C, initiating shutdown");
    }
}

/// Closes every session actor's queue and waits up to `timeout` for the
/// queued turns to finish. Returns false when the timeout cut some short.
pub async fn drain_sessions(dispatcher: &SessionDispatcher, timeout: Duration) -> bool {
    let actors = dispatcher.take_actors().await;
    if actors.is_empty() {
        info!("no active sessions to drain");
        return true;
    }

    info!(count = actors.len(), "waiting for active sessions to complete");
    match tokio::time::timeout(timeout, join_all(actors)).await {
        Ok(_) => {
            info!("all sessions drained successfully");
            true
        }
        Err(_) => {
            warn!("timeout reached, some sessions interrupted");
            false
        }
    }
}
