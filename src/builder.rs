//! Builder pattern for starting a log service.
//!
//! This module provides a convenient builder API for configuring a
//! [`Service`] and its backends in a single chain of method calls.
//!
//! # Example
//!
//! ```rust,no_run
//! use relaylog::{Level, log_info};
//!
//! let service = relaylog::builder()
//!     .with_level(relaylog::LevelMask::up_to(Level::Info))
//!     .with_directory("/var/log/app")
//!     .with_file("app", "main", 20_000_000u64)
//!     .build()
//!     .expect("Failed to start logging");
//!
//! let log = service.get_logger("app");
//! log_info!(log, "started").ok();
//! service.shutdown().expect("Failed to flush logs");
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::{BackendRef, default_console};
use crate::rotation::{CutSize, LogDir};
use crate::{Error, FileLogConfig, Format, LevelMask, LogConfig, Result, RotatingFileBackend, Service};

/// A builder for configuring and starting a log service.
#[derive(Debug, Clone)]
pub struct ServiceBuilder {
    config: LogConfig,
    backends: Vec<BackendRef>,
}

impl ServiceBuilder {
    /// Create a new ServiceBuilder with default configuration.
    pub fn new() -> Self {
        Self::from_config(LogConfig::new())
    }

    /// Create a ServiceBuilder from an existing configuration.
    pub fn from_config(config: LogConfig) -> Self {
        Self {
            config,
            backends: Vec::new(),
        }
    }

    /// Set the default level mask.
    pub fn with_level(mut self, level: impl Into<LevelMask>) -> Self {
        self.config = self.config.with_level(level);
        self
    }

    /// Set the record format.
    pub fn with_format(mut self, format: Format) -> Self {
        self.config = self.config.with_format(format);
        self
    }

    /// Set the bound of the record queue.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_queue_capacity(capacity);
        self
    }

    /// Enable or disable the shared console backend.
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config = self.config.with_console(enabled);
        self
    }

    /// Set the directory rotating files are written to.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config = self.config.with_directory(directory);
        self
    }

    /// Add a rotating file backend.
    pub fn with_file(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        cut_size: impl Into<CutSize>,
    ) -> Self {
        let file = FileLogConfig::new(name, description).with_cut_size(cut_size);
        self.config = self.config.with_file(file);
        self
    }

    /// Add a rotating file backend from a FileLogConfig.
    pub fn with_file_config(mut self, file: FileLogConfig) -> Self {
        self.config = self.config.with_file(file);
        self
    }

    /// Add a custom backend to the defaults.
    pub fn with_backend(mut self, backend: BackendRef) -> Self {
        self.backends.push(backend);
        self
    }

    /// Get the current configuration without starting anything.
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Start the service with the configured defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File backends are configured without a directory
    /// - The log directory cannot be created
    /// - The worker thread cannot be spawned
    pub fn build(self) -> Result<Service> {
        let mut backends: Vec<BackendRef> = Vec::new();
        if self.config.console {
            backends.push(default_console());
        }

        if !self.config.files.is_empty() {
            let directory = self.config.directory.as_ref().ok_or_else(|| {
                Error::Config("file backends need a log directory".to_string())
            })?;
            let dir = LogDir::setup(directory)?;
            for file in &self.config.files {
                let backend =
                    RotatingFileBackend::new(&dir, &file.name, &file.description, file.cut_size);
                backends.push(Arc::new(backend));
            }
        } else if let Some(directory) = &self.config.directory {
            LogDir::setup(directory)?;
        }

        backends.extend(self.backends);

        Service::start(
            self.config.queue_capacity,
            self.config.format,
            self.config.level,
            backends,
        )
    }
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
