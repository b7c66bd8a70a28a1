use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use crate::backend::BackendRef;
use crate::service::{LoggerSlot, Shared};
use crate::{Level, LevelMask, Record, Result};

/// Named handle used to emit records.
///
/// Handles are cheap to clone; every handle for the same name shares its
/// level mask and backend list. Obtain one with
/// [`Service::get_logger`](crate::Service::get_logger).
#[derive(Clone)]
pub struct Logger {
    slot: Arc<LoggerSlot>,
    shared: Arc<Shared>,
}

impl Logger {
    pub(crate) fn new(slot: Arc<LoggerSlot>, shared: Arc<Shared>) -> Self {
        Self { slot, shared }
    }

    pub fn name(&self) -> &str {
        &self.slot.name
    }

    /// Current level mask.
    pub fn level(&self) -> LevelMask {
        self.slot.mask()
    }

    /// Whether records at `level` pass this logger's mask.
    pub fn enabled(&self, level: Level) -> bool {
        self.slot.mask().contains(level)
    }

    /// Change the mask of this logger only.
    pub fn set_level(&self, mask: impl Into<LevelMask>) {
        let _registry = self.shared.registry.lock();
        self.slot.set_mask(mask.into());
    }

    /// Replace this logger's backends.
    pub fn set_backends(&self, backends: Vec<BackendRef>) {
        let _registry = self.shared.registry.lock();
        *self.slot.backends.lock() = backends;
    }

    /// Append a backend to this logger.
    pub fn add_backend(&self, backend: BackendRef) {
        let _registry = self.shared.registry.lock();
        self.slot.backends.lock().push(backend);
    }

    /// Snapshot of this logger's backends.
    pub fn backends(&self) -> Vec<BackendRef> {
        self.slot.backends.lock().clone()
    }

    /// Emit a record at `level` if the mask allows it. The caller's file and
    /// line are recorded.
    #[track_caller]
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) -> Result<()> {
        self.log_at(level, Location::caller(), args)
    }

    /// Emit a record attributed to an explicit source location.
    pub fn log_at(
        &self,
        level: Level,
        location: &Location<'_>,
        args: fmt::Arguments<'_>,
    ) -> Result<()> {
        if !self.enabled(level) {
            return Ok(());
        }
        let message = match args.as_str() {
            Some(s) => s.to_string(),
            None => fmt::format(args),
        };
        let record = Record::new(level, self.name(), location, message, self.shared.format);
        self.shared.enqueue(&self.slot, record)
    }

    #[track_caller]
    pub fn fatal(&self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log_at(Level::Fatal, Location::caller(), args)
    }

    #[track_caller]
    pub fn error(&self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log_at(Level::Error, Location::caller(), args)
    }

    #[track_caller]
    pub fn warn(&self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log_at(Level::Warn, Location::caller(), args)
    }

    #[track_caller]
    pub fn info(&self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log_at(Level::Info, Location::caller(), args)
    }

    #[track_caller]
    pub fn debug(&self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log_at(Level::Debug, Location::caller(), args)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.slot.name)
            .field("level", &self.level())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.slot.name)
    }
}

/// Log at fatal level: `log_fatal!(logger, "disk {} gone", id)`.
#[macro_export]
macro_rules! log_fatal {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log($crate::Level::Fatal, format_args!($($arg)+))
    };
}

/// Log at error level.
#[macro_export]
macro_rules! log_error {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log($crate::Level::Error, format_args!($($arg)+))
    };
}

/// Log at warn level.
#[macro_export]
macro_rules! log_warn {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log($crate::Level::Warn, format_args!($($arg)+))
    };
}

/// Log at info level.
#[macro_export]
macro_rules! log_info {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log($crate::Level::Info, format_args!($($arg)+))
    };
}

/// Log at debug level.
#[macro_export]
macro_rules! log_debug {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log($crate::Level::Debug, format_args!($($arg)+))
    };
}
