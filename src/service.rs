//! Asynchronous dispatch service.
//!
//! Producers format records on their own threads and push them onto one
//! bounded queue. A single worker thread drains the queue in order and hands
//! each record to the backends of its logger. [`Service::shutdown`] closes
//! the queue, waits for the worker to drain it and shuts every distinct
//! backend down once.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender};
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};

use crate::backend::{BackendRef, default_console, push_unique};
use crate::{Error, Format, LevelMask, Logger, Record, Result};

/// Queue capacity used when none (or zero) is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 512;

/// Lifecycle of a [`Service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceState {
    /// Accepting records.
    Running = 0,
    /// Submission closed, worker draining the queue.
    Draining = 1,
    /// Queue drained and backends shut down.
    Stopped = 2,
}

impl ServiceState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ServiceState::Running,
            1 => ServiceState::Draining,
            _ => ServiceState::Stopped,
        }
    }
}

/// Per-logger routing data shared between handles and the worker.
///
/// The mask is read lock-free on the hot path. Both fields are only written
/// while the service registry lock is held.
#[derive(Debug)]
pub(crate) struct LoggerSlot {
    pub(crate) name: String,
    pub(crate) mask: AtomicU8,
    pub(crate) backends: Mutex<Vec<BackendRef>>,
}

impl LoggerSlot {
    fn new(name: &str, mask: LevelMask, backends: Vec<BackendRef>) -> Self {
        Self {
            name: name.to_string(),
            mask: AtomicU8::new(mask.bits()),
            backends: Mutex::new(backends),
        }
    }

    pub(crate) fn mask(&self) -> LevelMask {
        LevelMask::from_bits(self.mask.load(Ordering::Relaxed))
    }

    pub(crate) fn set_mask(&self, mask: LevelMask) {
        self.mask.store(mask.bits(), Ordering::Relaxed);
    }
}

/// A queued record and the logger it is routed through.
struct Envelope {
    record: Record,
    slot: Arc<LoggerSlot>,
}

#[derive(Debug)]
pub(crate) struct Registry {
    loggers: HashMap<String, Arc<LoggerSlot>>,
    default_mask: LevelMask,
    default_backends: Vec<BackendRef>,
}

/// State shared by the service, its logger handles and the worker.
pub(crate) struct Shared {
    pub(crate) registry: Mutex<Registry>,
    sender: RwLock<Option<Sender<Envelope>>>,
    state: AtomicU8,
    pub(crate) format: Format,
}

impl Shared {
    fn state(&self) -> ServiceState {
        ServiceState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Blocking enqueue. Waits while the queue is full.
    pub(crate) fn enqueue(&self, slot: &Arc<LoggerSlot>, record: Record) -> Result<()> {
        if self.state() != ServiceState::Running {
            return Err(Error::ShutDown);
        }
        let guard = self.sender.read();
        let sender = guard.as_ref().ok_or(Error::ShutDown)?;
        let envelope = Envelope {
            record,
            slot: Arc::clone(slot),
        };
        sender.send(envelope).map_err(|_| Error::ShutDown)
    }

    fn enqueue_timeout(
        &self,
        slot: &Arc<LoggerSlot>,
        record: Record,
        timeout: Duration,
    ) -> Result<()> {
        if self.state() != ServiceState::Running {
            return Err(Error::ShutDown);
        }
        let guard = self.sender.read();
        let sender = guard.as_ref().ok_or(Error::ShutDown)?;
        let envelope = Envelope {
            record,
            slot: Arc::clone(slot),
        };
        sender
            .send_timeout(envelope, timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => Error::QueueFull,
                SendTimeoutError::Disconnected(_) => Error::ShutDown,
            })
    }

    /// Existing slot for `name` or a new one seeded from the defaults.
    fn slot(&self, name: &str) -> Arc<LoggerSlot> {
        let mut registry = self.registry.lock();
        if let Some(slot) = registry.loggers.get(name) {
            return Arc::clone(slot);
        }
        let slot = Arc::new(LoggerSlot::new(
            name,
            registry.default_mask,
            registry.default_backends.clone(),
        ));
        registry.loggers.insert(name.to_string(), Arc::clone(&slot));
        tracing::trace!(logger = name, "registered logger");
        slot
    }
}

/// The dispatch service.
///
/// Dropping a service that was not shut down shuts it down.
pub struct Service {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Service {
    /// Start a service with text output, every level enabled and the shared
    /// console backend as the only default backend.
    pub fn new(queue_capacity: usize) -> Result<Self> {
        Self::start(
            queue_capacity,
            Format::Text,
            LevelMask::ALL,
            vec![default_console()],
        )
    }

    /// Start a service with explicit defaults.
    pub fn start(
        queue_capacity: usize,
        format: Format,
        level: LevelMask,
        backends: Vec<BackendRef>,
    ) -> Result<Self> {
        let capacity = if queue_capacity == 0 {
            DEFAULT_QUEUE_CAPACITY
        } else {
            queue_capacity
        };
        let (sender, receiver) = crossbeam_channel::bounded(capacity);

        let shared = Arc::new(Shared {
            registry: Mutex::new(Registry {
                loggers: HashMap::new(),
                default_mask: level,
                default_backends: backends,
            }),
            sender: RwLock::new(Some(sender)),
            state: AtomicU8::new(ServiceState::Running as u8),
            format,
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("relaylog-worker".to_string())
            .spawn(move || run_worker(&worker_shared, receiver))
            .map_err(|e| Error::Init(format!("failed to spawn log worker: {}", e)))?;

        tracing::debug!(capacity, "log service started");
        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn state(&self) -> ServiceState {
        self.shared.state()
    }

    /// Format stamped into records created through this service's loggers.
    pub fn format(&self) -> Format {
        self.shared.format
    }

    /// Enqueue a record for the logger named in it, registering that logger
    /// if needed. Blocks while the queue is full.
    pub fn submit(&self, record: Record) -> Result<()> {
        if self.state() != ServiceState::Running {
            return Err(Error::ShutDown);
        }
        let slot = self.shared.slot(record.logger());
        self.shared.enqueue(&slot, record)
    }

    /// Like [`submit`](Self::submit) but gives up with [`Error::QueueFull`]
    /// once the queue stayed full for `timeout`.
    pub fn submit_timeout(&self, record: Record, timeout: Duration) -> Result<()> {
        if self.state() != ServiceState::Running {
            return Err(Error::ShutDown);
        }
        let slot = self.shared.slot(record.logger());
        self.shared.enqueue_timeout(&slot, record, timeout)
    }

    /// Handle for `name`, created from the current defaults on first use.
    pub fn get_logger(&self, name: &str) -> Logger {
        Logger::new(self.shared.slot(name), Arc::clone(&self.shared))
    }

    /// Set the default mask and apply it to every registered logger.
    pub fn set_global_level(&self, mask: impl Into<LevelMask>) {
        let mask = mask.into();
        let mut registry = self.shared.registry.lock();
        registry.default_mask = mask;
        for slot in registry.loggers.values() {
            slot.set_mask(mask);
        }
    }

    /// Replace the default backends and those of every registered logger.
    pub fn set_global_backends(&self, backends: Vec<BackendRef>) {
        let mut registry = self.shared.registry.lock();
        for slot in registry.loggers.values() {
            *slot.backends.lock() = backends.clone();
        }
        registry.default_backends = backends;
    }

    /// Append a backend to the defaults and to every registered logger.
    pub fn add_global_backend(&self, backend: BackendRef) {
        let mut registry = self.shared.registry.lock();
        for slot in registry.loggers.values() {
            slot.backends.lock().push(Arc::clone(&backend));
        }
        registry.default_backends.push(backend);
    }

    /// Restore the shared console as the only backend everywhere.
    pub fn reset_backends(&self) {
        self.set_global_backends(vec![default_console()]);
    }

    /// Remove `name` from the registry. Records already queued for it are
    /// still delivered. Returns whether the logger was registered.
    pub fn logoff(&self, name: &str) -> bool {
        self.shared.registry.lock().loggers.remove(name).is_some()
    }

    /// Names of the registered loggers, sorted.
    pub fn logger_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.registry.lock().loggers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Distinct backends, reachable from a logger or the defaults, that
    /// stopped accepting records after a fatal error.
    pub fn failed_backends(&self) -> Vec<BackendRef> {
        let registry = self.shared.registry.lock();
        reachable_backends(&registry)
            .into_iter()
            .filter(|b| !b.is_available())
            .collect()
    }

    /// Close submission, drain the queue and shut every distinct backend
    /// down once. Must be the last call made on the service.
    pub fn shutdown(&self) -> Result<()> {
        self.shared
            .state
            .compare_exchange(
                ServiceState::Running as u8,
                ServiceState::Draining as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|_| Error::AlreadyShutDown)?;

        // Dropping the only sender lets the worker finish once the queue is empty.
        drop(self.shared.sender.write().take());

        let worker = self.worker.lock().take();
        let joined = match worker {
            Some(handle) => handle.join(),
            None => Ok(()),
        };
        self.shared
            .state
            .store(ServiceState::Stopped as u8, Ordering::SeqCst);

        joined.map_err(|_| Error::Io(std::io::Error::other("log worker panicked")))?;
        tracing::debug!("log service stopped");
        Ok(())
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        if self.state() == ServiceState::Running
            && let Err(e) = self.shutdown()
        {
            tracing::error!(error = %e, "log service shutdown on drop failed");
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("state", &self.state())
            .field("format", &self.shared.format)
            .finish_non_exhaustive()
    }
}

fn run_worker(shared: &Shared, receiver: Receiver<Envelope>) {
    for envelope in receiver.iter() {
        deliver(envelope);
    }
    shutdown_backends(shared);
}

fn deliver(envelope: Envelope) {
    // Backends attached at delivery time, not at submit time.
    let backends = envelope.slot.backends.lock().clone();
    for backend in &backends {
        let received = panic::catch_unwind(AssertUnwindSafe(|| backend.receive(&envelope.record)));
        match received {
            Ok(Ok(())) => {}
            Ok(Err(Error::BackendUnavailable(_))) => {
                tracing::trace!(backend = backend.name(), "dropping record for failed backend");
            }
            Ok(Err(e)) => {
                tracing::error!(
                    backend = backend.name(),
                    logger = %envelope.slot.name,
                    error = %e,
                    "backend failed to receive record"
                );
            }
            Err(_) => {
                tracing::error!(
                    backend = backend.name(),
                    logger = %envelope.slot.name,
                    "backend panicked while receiving record"
                );
            }
        }
    }
}

/// Every distinct backend of the registered loggers and the defaults.
fn reachable_backends(registry: &Registry) -> Vec<BackendRef> {
    let mut distinct: Vec<BackendRef> = Vec::new();
    for slot in registry.loggers.values() {
        for backend in slot.backends.lock().iter() {
            push_unique(&mut distinct, backend);
        }
    }
    for backend in &registry.default_backends {
        push_unique(&mut distinct, backend);
    }
    distinct
}

fn shutdown_backends(shared: &Shared) {
    let backends = reachable_backends(&shared.registry.lock());
    for backend in &backends {
        match panic::catch_unwind(AssertUnwindSafe(|| backend.shutdown())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(backend = backend.name(), error = %e, "backend shutdown failed");
            }
            Err(_) => {
                tracing::error!(backend = backend.name(), "backend panicked during shutdown");
            }
        }
    }
}

static GLOBAL: OnceCell<Service> = OnceCell::new();

/// The process-wide default service, started on first use.
pub fn global() -> Result<&'static Service> {
    GLOBAL.get_or_try_init(|| Service::new(DEFAULT_QUEUE_CAPACITY))
}

/// [`Service::get_logger`] on the default service.
pub fn get_logger(name: &str) -> Result<Logger> {
    Ok(global()?.get_logger(name))
}

/// [`Service::set_global_level`] on the default service.
pub fn set_global_level(mask: impl Into<LevelMask>) -> Result<()> {
    global()?.set_global_level(mask);
    Ok(())
}

/// [`Service::set_global_backends`] on the default service.
pub fn set_global_backends(backends: Vec<BackendRef>) -> Result<()> {
    global()?.set_global_backends(backends);
    Ok(())
}

/// [`Service::add_global_backend`] on the default service.
pub fn add_global_backend(backend: BackendRef) -> Result<()> {
    global()?.add_global_backend(backend);
    Ok(())
}

/// [`Service::reset_backends`] on the default service.
pub fn reset_backends() -> Result<()> {
    global()?.reset_backends();
    Ok(())
}

/// [`Service::logoff`] on the default service.
pub fn logoff(name: &str) -> Result<bool> {
    Ok(global()?.logoff(name))
}

/// Shut the default service down. Call it last, before the process exits,
/// so every queued record is written.
pub fn join() -> Result<()> {
    global()?.shutdown()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Backend, Level};
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Default)]
    struct Collect {
        lines: Mutex<Vec<String>>,
        shutdowns: AtomicUsize,
    }

    impl Collect {
        fn lines(&self) -> Vec<String> {
            self.lines.lock().clone()
        }
    }

    impl Backend for Collect {
        fn receive(&self, record: &Record) -> Result<()> {
            self.lines
                .lock()
                .push(format!("{}:{}", record.logger(), record.message()));
            Ok(())
        }

        fn shutdown(&self) -> Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "collect"
        }
    }

    fn service_with(backend: &Arc<Collect>) -> Service {
        let backend: BackendRef = backend.clone();
        Service::start(8, Format::Text, LevelMask::ALL, vec![backend]).unwrap()
    }

    #[test]
    fn test_get_logger_returns_same_slot() {
        let sink = Arc::new(Collect::default());
        let service = service_with(&sink);
        let a = service.get_logger("net");
        let b = service.get_logger("net");
        a.set_level(Level::Error);
        assert_eq!(b.level(), LevelMask::from(Level::Error));
        assert_eq!(service.logger_names(), vec!["net"]);
        service.shutdown().unwrap();
    }

    #[test]
    fn test_global_level_propagates_and_seeds() {
        let sink = Arc::new(Collect::default());
        let service = service_with(&sink);
        let before = service.get_logger("before");
        service.set_global_level(LevelMask::up_to(Level::Warn));
        let after = service.get_logger("after");
        assert_eq!(before.level(), LevelMask::up_to(Level::Warn));
        assert_eq!(after.level(), LevelMask::up_to(Level::Warn));
        service.shutdown().unwrap();
    }

    #[test]
    fn test_global_backends_propagate() {
        let first = Arc::new(Collect::default());
        let second = Arc::new(Collect::default());
        let service = service_with(&first);
        let log = service.get_logger("app");

        let second_ref: BackendRef = second.clone();
        service.add_global_backend(second_ref.clone());
        assert_eq!(log.backends().len(), 2);

        service.set_global_backends(vec![second_ref]);
        assert_eq!(log.backends().len(), 1);
        assert_eq!(service.get_logger("late").backends().len(), 1);

        log.info(format_args!("hello")).unwrap();
        service.shutdown().unwrap();
        assert!(first.lines().is_empty());
        assert_eq!(second.lines(), vec!["app:hello"]);
    }

    #[test]
    fn test_submit_registers_logger() {
        let sink = Arc::new(Collect::default());
        let service = service_with(&sink);
        let record = Record::new(
            Level::Info,
            "raw",
            std::panic::Location::caller(),
            "direct",
            Format::Text,
        );
        service.submit(record).unwrap();
        assert_eq!(service.logger_names(), vec!["raw"]);
        service.shutdown().unwrap();
        assert_eq!(sink.lines(), vec!["raw:direct"]);
    }

    #[test]
    fn test_logoff_keeps_queued_records() {
        let sink = Arc::new(Collect::default());
        let service = service_with(&sink);
        let log = service.get_logger("temp");
        log.info(format_args!("queued")).unwrap();
        assert!(service.logoff("temp"));
        assert!(!service.logoff("temp"));
        service.shutdown().unwrap();
        assert_eq!(sink.lines(), vec!["temp:queued"]);
    }

    #[test]
    fn test_state_machine() {
        let sink = Arc::new(Collect::default());
        let service = service_with(&sink);
        let log = service.get_logger("app");
        assert_eq!(service.state(), ServiceState::Running);

        service.shutdown().unwrap();
        assert_eq!(service.state(), ServiceState::Stopped);
        assert!(matches!(log.info(format_args!("late")), Err(Error::ShutDown)));
        assert!(matches!(service.shutdown(), Err(Error::AlreadyShutDown)));
        assert_eq!(sink.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_submit_after_shutdown_registers_nothing() {
        let sink = Arc::new(Collect::default());
        let service = service_with(&sink);
        service.shutdown().unwrap();

        let record = Record::new(
            Level::Info,
            "ghost",
            std::panic::Location::caller(),
            "too late",
            Format::Text,
        );
        assert!(matches!(service.submit(record.clone()), Err(Error::ShutDown)));
        assert!(matches!(
            service.submit_timeout(record, Duration::from_millis(10)),
            Err(Error::ShutDown)
        ));
        assert!(service.logger_names().is_empty());
    }

    #[test]
    fn test_drop_shuts_down() {
        let sink = Arc::new(Collect::default());
        {
            let service = service_with(&sink);
            service.get_logger("app").warn(format_args!("bye")).unwrap();
        }
        assert_eq!(sink.lines(), vec!["app:bye"]);
        assert_eq!(sink.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_capacity_uses_default() {
        let service = Service::start(0, Format::Json, LevelMask::ALL, Vec::new()).unwrap();
        assert_eq!(service.format(), Format::Json);
        service.get_logger("quiet").info(format_args!("nobody listens")).unwrap();
        service.shutdown().unwrap();
    }
}
