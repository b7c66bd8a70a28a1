//! # Relaylog
//!
//! Asynchronous leveled logging with named loggers, rotating file backends
//! and archival of old log files.
//!
//! ## Features
//!
//! - Named loggers with per-logger level masks and backend lists
//! - One background worker draining a bounded queue in submission order
//! - Console output and log files split by day and by size
//! - Compression of old log files into dated `.tar.gz` archives
//!
//! ## Example
//!
//! ```rust
//! use relaylog::{Level, Service, log_info};
//!
//! let service = Service::new(512)?;
//! let log = service.get_logger("app");
//! log.set_level(relaylog::LevelMask::up_to(Level::Info));
//!
//! log_info!(log, "listening on {}", 8080)?;
//! log.debug(format_args!("filtered out"))?;
//!
//! service.shutdown()?;
//! # Ok::<(), relaylog::Error>(())
//! ```

pub mod archive;
pub mod backend;
pub mod builder;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod level;
pub mod logger;
pub mod record;
pub mod rotation;
pub mod service;
pub mod writer;

pub use archive::{Archiver, CompressReport, DecompressReport, cutoff_days_ago};
pub use backend::{Backend, BackendRef, ConsoleBackend, default_console, same_backend};
pub use builder::ServiceBuilder;
pub use config::{FileLogConfig, LogConfig};
pub use diagnostics::init_diagnostics;
pub use error::{Error, Result};
pub use level::{Level, LevelMask};
pub use logger::Logger;
pub use record::{Format, Record};
pub use rotation::{Clock, CutSize, DEFAULT_CUT_SIZE, LocalClock, LogDir, SegmentName};
pub use service::{
    DEFAULT_QUEUE_CAPACITY, Service, ServiceState, add_global_backend, get_logger, global, join,
    logoff, reset_backends, set_global_backends, set_global_level,
};
pub use writer::RotatingFileBackend;

/// Start configuring a service.
pub fn builder() -> ServiceBuilder {
    ServiceBuilder::new()
}
