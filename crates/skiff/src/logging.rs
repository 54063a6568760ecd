// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber. `RUST_LOG` wins over `log_level`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("skiff={log_level},warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
