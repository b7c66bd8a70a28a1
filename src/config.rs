use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::rotation::CutSize;
use crate::service::DEFAULT_QUEUE_CAPACITY;
use crate::{Format, LevelMask};

/// Configuration for a log service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level mask, e.g. `"info"`, `"error|debug"` or `[warn, info]`
    #[serde(default = "default_level")]
    pub level: LevelMask,
    /// Record format ("text" or "json")
    #[serde(default)]
    pub format: Format,
    /// Bound of the record queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Attach the shared console backend
    #[serde(default = "default_console")]
    pub console: bool,
    /// Directory for rotating log files
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Rotating file backends attached to every logger
    #[serde(default)]
    pub files: Vec<FileLogConfig>,
    /// Filter for the library's own diagnostics (e.g., "warn", "relaylog=debug")
    #[serde(default = "default_diagnostics")]
    pub diagnostics: String,
}

impl LogConfig {
    /// Create a new LogConfig with defaults
    pub fn new() -> Self {
        Self {
            level: default_level(),
            format: Format::default(),
            queue_capacity: default_queue_capacity(),
            console: default_console(),
            directory: None,
            files: Vec::new(),
            diagnostics: default_diagnostics(),
        }
    }

    /// Set the default level mask
    pub fn with_level(mut self, level: impl Into<LevelMask>) -> Self {
        self.level = level.into();
        self
    }

    /// Set record format
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Set queue capacity
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Enable or disable the console backend
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    /// Set the log directory
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Add a rotating file backend
    pub fn with_file(mut self, file: FileLogConfig) -> Self {
        self.files.push(file);
        self
    }

    /// Set the diagnostics filter
    pub fn with_diagnostics(mut self, diagnostics: impl Into<String>) -> Self {
        self.diagnostics = diagnostics.into();
        self
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_level() -> LevelMask {
    LevelMask::ALL
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_console() -> bool {
    true
}

fn default_diagnostics() -> String {
    "warn".to_string()
}

fn default_description() -> String {
    "log".to_string()
}

/// Configuration for one rotating file backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLogConfig {
    /// Stream name, first part of the file name
    pub name: String,
    /// Stream description, second part of the file name
    #[serde(default = "default_description")]
    pub description: String,
    /// Size at which a new segment is started; 0 selects the default
    #[serde(default)]
    pub cut_size: CutSize,
}

impl FileLogConfig {
    /// Create a new FileLogConfig
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            cut_size: CutSize::default(),
        }
    }

    /// Set cut size
    pub fn with_cut_size(mut self, cut_size: impl Into<CutSize>) -> Self {
        self.cut_size = cut_size.into();
        self
    }
}
