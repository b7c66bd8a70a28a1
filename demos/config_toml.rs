//! Example of loading logging configuration from TOML.
//!
//! This example demonstrates how to parse a `[log]` table into a
//! `LogConfig` and start a service from it.
//!
//! Run with:
//! ```bash
//! cargo run --example config_toml
//! ```

use relaylog::{LogConfig, ServiceBuilder, log_debug, log_error, log_info, log_warn};
use serde::Deserialize;

#[derive(Deserialize)]
struct Config {
    log: LogConfig,
}

const CONFIG: &str = r#"
[log]
level = "info"
format = "text"
queue_capacity = 256
console = true
diagnostics = "relaylog=debug"

[[log.files]]
name = "app"
description = "main"
cut_size = "1M"
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = tempfile::tempdir()?;

    // Parse the TOML configuration
    let root: Config = toml::from_str(CONFIG)?;
    let config = root.log.with_directory(temp_dir.path());

    // Route the library's own diagnostics to stderr
    relaylog::init_diagnostics(&config)?;

    let service = ServiceBuilder::from_config(config).build()?;
    let log = service.get_logger("config");

    log_debug!(log, "This is a debug message (filtered out by level = info)")?;
    log_info!(log, "This is an info message")?;
    log_warn!(log, "This is a warning message")?;
    log_error!(log, "This is an error message")?;

    service.shutdown()?;
    Ok(())
}
