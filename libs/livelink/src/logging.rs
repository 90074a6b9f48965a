// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Stderr logging for hosts that have no `tracing` subscriber.
//!
//! A C, Python or Deno host loading the shared library never installs a
//! Rust subscriber, so events would otherwise be dropped and a failing
//! status code would arrive with no diagnostic. The C façade calls
//! [`init_logging`] at its first entry point.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Filter directives, e.g. `LIVELINK_LOG=livelink=debug`.
pub const LOG_ENV_VAR: &str = "LIVELINK_LOG";

const DEFAULT_FILTER: &str = "info";

static INIT: Once = Once::new();

/// Install a stderr fmt subscriber once per process.
///
/// Does nothing if the host already installed a global subscriber.
pub fn init_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
            .is_ok();

        if installed {
            tracing::debug!("livelink logging initialized");
        }
    });
}
