//! JSON logging example.
//!
//! This example demonstrates how to configure JSON output so every
//! record is printed as one object per line.

use relaylog::{Format, log_error, log_info, log_warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let service = relaylog::builder()
        .with_console(true)
        .with_format(Format::Json)
        .build()?;

    let auth = service.get_logger("auth");
    let http = service.get_logger("http");
    log_info!(auth, "user {} logged in", 123)?;
    log_warn!(http, "resource not found: {}", "/missing")?;
    log_error!(auth, "authentication failed")?;

    service.shutdown()?;
    Ok(())
}
