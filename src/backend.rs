//! Output backends.
//!
//! A backend consumes records handed over by the dispatch worker. Backends are
//! shared by reference between loggers, so identity is the allocation behind
//! the [`BackendRef`] and shutdown must tolerate being asked more than once.

use std::fmt::Debug;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use console::{Style, Term};
use once_cell::sync::Lazy;

use crate::{Level, Record, Result};

/// Consumer of log records.
pub trait Backend: Send + Sync + Debug {
    /// Render and persist or display a single record.
    fn receive(&self, record: &Record) -> Result<()>;

    /// Release held resources. Calls after the first are no-ops.
    fn shutdown(&self) -> Result<()>;

    /// False once the backend stopped accepting records after a fatal error.
    fn is_available(&self) -> bool {
        true
    }

    /// Backend name for diagnostics.
    fn name(&self) -> &str;
}

/// Shared handle to a backend.
pub type BackendRef = Arc<dyn Backend>;

/// True when both handles point at the same backend instance.
pub fn same_backend(a: &BackendRef, b: &BackendRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Append `backend` to `list` unless that instance is already present.
pub(crate) fn push_unique(list: &mut Vec<BackendRef>, backend: &BackendRef) {
    if !list.iter().any(|b| same_backend(b, backend)) {
        list.push(Arc::clone(backend));
    }
}

static DEFAULT_CONSOLE: Lazy<BackendRef> = Lazy::new(|| Arc::new(ConsoleBackend::new()));

/// The process-wide console backend every service starts with.
pub fn default_console() -> BackendRef {
    Arc::clone(&DEFAULT_CONSOLE)
}

/// Prints colored records to standard output.
#[derive(Debug)]
pub struct ConsoleBackend {
    term: Term,
    colors: bool,
    closed: AtomicBool,
}

impl ConsoleBackend {
    pub fn new() -> Self {
        let term = Term::stdout();
        let colors = console::colors_enabled();
        Self {
            term,
            colors,
            closed: AtomicBool::new(false),
        }
    }

    /// Force colors on or off regardless of terminal detection.
    pub fn with_colors(mut self, colors: bool) -> Self {
        self.colors = colors;
        self
    }

    fn style(level: Level) -> Style {
        match level {
            Level::Fatal => Style::new().red().underlined(),
            Level::Error => Style::new().red(),
            Level::Warn => Style::new().yellow(),
            Level::Info => Style::new().white(),
            Level::Debug => Style::new().cyan(),
        }
    }
}

impl Default for ConsoleBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for ConsoleBackend {
    fn receive(&self, record: &Record) -> Result<()> {
        let line = record.render()?;
        if self.colors {
            let styled = Self::style(record.level()).force_styling(true).apply_to(line);
            self.term.write_line(&styled.to_string())?;
        } else {
            self.term.write_line(&line)?;
        }
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            (&self.term).flush()?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_backend_is_identity() {
        let a: BackendRef = Arc::new(ConsoleBackend::new());
        let b: BackendRef = Arc::new(ConsoleBackend::new());
        assert!(same_backend(&a, &Arc::clone(&a)));
        assert!(!same_backend(&a, &b));
    }

    #[test]
    fn test_push_unique() {
        let a: BackendRef = Arc::new(ConsoleBackend::new());
        let b: BackendRef = Arc::new(ConsoleBackend::new());
        let mut list = Vec::new();
        push_unique(&mut list, &a);
        push_unique(&mut list, &b);
        push_unique(&mut list, &a);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_default_console_is_shared() {
        assert!(same_backend(&default_console(), &default_console()));
    }

    #[test]
    fn test_console_shutdown_is_idempotent() {
        let console = ConsoleBackend::new().with_colors(false);
        console.shutdown().unwrap();
        console.shutdown().unwrap();
    }
}
