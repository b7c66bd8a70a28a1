//! Basic console logging example.
//!
//! This example demonstrates the simplest way to start a log service
//! with relaylog using the builder API.

use relaylog::{Level, LevelMask, log_debug, log_error, log_info, log_warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Start a service that prints to the console
    let service = relaylog::builder()
        .with_console(true)
        .with_level(LevelMask::up_to(Level::Info))
        .build()?;

    let log = service.get_logger("basic");
    log_info!(log, "This is an info message")?;
    log_warn!(log, "This is a warning message")?;
    log_error!(log, "This is an error message")?;
    log_debug!(log, "This debug message is filtered out")?;

    // Flush everything before exiting
    service.shutdown()?;
    Ok(())
}
