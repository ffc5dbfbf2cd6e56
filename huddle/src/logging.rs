//! Development-time tracing for debugging the engine.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Dev diagnostics via `RUST_LOG`, output to
//!   stderr, plus a debug-level `debug.log` in the session directory.
//!   Not part of the session's product output and never checkpointed.
//!
//! - **Session artifacts (`io/*`)**: Transcript, ledger, checkpoints and state
//!   under the session directory. Always written, unaffected by `RUST_LOG`.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Initialize tracing subscriber for development logging.
///
/// Stderr output is filtered by the `RUST_LOG` env var, defaulting to `warn`
/// if unset. When `debug_log` is given, debug-level events are additionally
/// appended there; an unopenable path skips the file layer so that commands
/// can still run against directories that do not exist yet.
///
/// # Example
/// ```bash
/// RUST_LOG=huddle=debug cargo run -- run
/// ```
pub fn init(debug_log: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = debug_log
        .and_then(|path| OpenOptions::new().create(true).append(true).open(path).ok())
        .map(|file| {
            fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG)
        });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_filter(filter),
        )
        .with(file_layer)
        .init();
}
