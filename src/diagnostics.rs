//! The library's own diagnostics.
//!
//! Backend failures, rotation and archive progress are reported through
//! `tracing`. Applications that already install a subscriber see them there;
//! [`init_diagnostics`] installs a minimal stderr subscriber otherwise.

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{Error, LogConfig, Result};

/// Install a global `tracing` subscriber printing diagnostics to stderr.
///
/// `RUST_LOG` takes precedence over `config.diagnostics`.
pub fn init_diagnostics(config: &LogConfig) -> Result<()> {
    let directives = effective_filter(config);
    let env_filter = EnvFilter::try_new(&directives).map_err(|e| Error::Init(e.to_string()))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(feature = "ansi"))
        .with_target(true)
        .with_thread_names(true)
        .boxed();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Init(e.to_string()))?;

    Ok(())
}

/// Determine the effective filter, considering config and `RUST_LOG`.
fn effective_filter(config: &LogConfig) -> String {
    // RUST_LOG takes precedence over everything
    if let Ok(rust_log) = std::env::var("RUST_LOG")
        && !rust_log.is_empty()
    {
        return rust_log;
    }

    let level = config.diagnostics.trim();
    if level.is_empty() {
        "warn,relaylog=warn".to_string()
    } else if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("{},relaylog={}", level, level)
    }
}
