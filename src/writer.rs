use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use time::Date;

use crate::rotation::{Clock, CutSize, LocalClock, LogDir, SegmentName};
use crate::{Backend, Error, Record, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    /// A resource error happened; the backend refuses further records.
    Failed,
    Closed,
}

/// State of the current segment.
#[derive(Debug)]
struct SegmentState {
    /// Date of the active segment.
    date: Date,
    /// Segment counter for `date`. The first segment of a day is 1.
    segment: u32,
    /// The open file handle, if any.
    file: Option<File>,
    path: Option<PathBuf>,
    status: Status,
}

/// Backend that appends records to files split by day and by size.
///
/// Files are named `{name}_{description}_{YYYYMMDD}_{segment}.log` inside the
/// log directory. Before every write the active segment is checked; a new one
/// is opened when the date changed, when the file already holds at least the
/// cut size, or when the open handle can no longer be inspected.
pub struct RotatingFileBackend {
    dir: LogDir,
    name: String,
    description: String,
    cut_size: u64,
    label: String,
    clock: Arc<dyn Clock>,
    state: Mutex<SegmentState>,
}

impl RotatingFileBackend {
    /// Create a backend. No file is opened until the first record arrives.
    pub fn new(
        dir: &LogDir,
        name: impl Into<String>,
        description: impl Into<String>,
        cut_size: impl Into<CutSize>,
    ) -> Self {
        Self::with_clock(dir, name, description, cut_size, LocalClock)
    }

    /// Create a backend that reads the date from `clock`.
    pub fn with_clock(
        dir: &LogDir,
        name: impl Into<String>,
        description: impl Into<String>,
        cut_size: impl Into<CutSize>,
        clock: impl Clock + 'static,
    ) -> Self {
        let name = name.into();
        let description = description.into();
        let clock: Arc<dyn Clock> = Arc::new(clock);
        let state = SegmentState {
            date: clock.today(),
            segment: 0,
            file: None,
            path: None,
            status: Status::Active,
        };
        Self {
            dir: dir.clone(),
            label: format!("file:{}_{}", name, description),
            name,
            description,
            cut_size: cut_size.into().bytes(),
            clock,
            state: Mutex::new(state),
        }
    }

    /// Effective cut size in bytes.
    pub fn cut_size(&self) -> u64 {
        self.cut_size
    }

    /// Whether an earlier open or write error disabled this backend.
    pub fn is_failed(&self) -> bool {
        self.state.lock().status == Status::Failed
    }

    /// Path of the segment currently open, if any.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.state.lock().path.clone()
    }

    /// Check if the open segment must be replaced before writing.
    fn needs_rotation(&self, state: &SegmentState, today: Date) -> bool {
        let Some(file) = state.file.as_ref() else {
            return true;
        };
        if state.date != today {
            return true;
        }
        self.over_cut(file.metadata().map(|m| m.len()))
    }

    /// Whether a segment of `size` bytes is full. A size that cannot be read
    /// (file removed or handle gone stale) counts as full.
    fn over_cut(&self, size: io::Result<u64>) -> bool {
        match size {
            Ok(len) => len >= self.cut_size,
            Err(e) => {
                tracing::warn!(backend = %self.label, error = %e, "stat on log file failed, rotating");
                true
            }
        }
    }

    /// Get the current segment, rotating if necessary.
    fn ensure_segment(&self, state: &mut SegmentState) -> Result<()> {
        let today = self.clock.today();
        if !self.needs_rotation(state, today) {
            return Ok(());
        }

        if let Some(file) = state.file.take() {
            let _ = file.sync_all();
        }
        state.path = None;

        if state.date != today {
            state.date = today;
            state.segment = 0;
        }

        loop {
            state.segment = state.segment.checked_add(1).ok_or_else(|| {
                Error::Config(format!("{} ran out of segment numbers", self.label))
            })?;
            let name = SegmentName::new(&self.name, &self.description, state.date, state.segment);
            let path = self.dir.segment_path(&name)?;
            if let Some(file) = open_under(&path, self.cut_size)? {
                tracing::debug!(backend = %self.label, path = %path.display(), "opened log segment");
                state.file = Some(file);
                state.path = Some(path);
                return Ok(());
            }
            tracing::debug!(backend = %self.label, path = %path.display(), "segment already full, skipping");
        }
    }

    fn write_line(&self, state: &mut SegmentState, line: &[u8]) -> Result<()> {
        self.ensure_segment(state)?;
        let file = state
            .file
            .as_mut()
            .ok_or_else(|| Error::Io(io::Error::other("failed to open log file")))?;
        file.write_all(line)?;
        Ok(())
    }
}

/// Open `path` for appending. Returns `None` when the file already holds at
/// least `cut_size` bytes.
fn open_under(path: &Path, cut_size: u64) -> io::Result<Option<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata()?.len();
    if size >= cut_size {
        return Ok(None);
    }
    Ok(Some(file))
}

impl Backend for RotatingFileBackend {
    fn receive(&self, record: &Record) -> Result<()> {
        let mut line = record.render()?;
        line.push('\n');

        let mut state = self.state.lock();
        if state.status != Status::Active {
            return Err(Error::BackendUnavailable(self.label.clone()));
        }
        let result = self.write_line(&mut state, line.as_bytes());
        if let Err(e) = &result {
            tracing::error!(backend = %self.label, error = %e, "log file backend failed, disabling it");
            if !tracing::dispatcher::has_been_set() {
                eprintln!("relaylog: {} failed, disabling it: {}", self.label, e);
            }
            state.status = Status::Failed;
            state.file = None;
            state.path = None;
        }
        result
    }

    fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.status == Status::Closed {
            return Ok(());
        }
        state.status = Status::Closed;
        state.path = None;
        if let Some(mut file) = state.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        !self.is_failed()
    }

    fn name(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for RotatingFileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotatingFileBackend")
            .field("dir", &self.dir)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("cut_size", &self.cut_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Format, Level};
    use time::macros::{date, datetime};

    #[derive(Debug)]
    struct ManualClock(Mutex<Date>);

    impl ManualClock {
        fn new(date: Date) -> Arc<Self> {
            Arc::new(Self(Mutex::new(date)))
        }

        fn set(&self, date: Date) {
            *self.0.lock() = date;
        }
    }

    impl Clock for ManualClock {
        fn today(&self) -> Date {
            *self.0.lock()
        }
    }

    fn record(message: &str) -> Record {
        Record::with_timestamp(
            Level::Info,
            datetime!(2024-05-01 10:00:00 UTC),
            "app",
            "main.rs",
            7,
            message,
            Format::Text,
        )
    }

    fn line_len(message: &str) -> u64 {
        record(message).render_text().len() as u64 + 1
    }

    fn segment_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_first_record_opens_segment_one() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = LogDir::setup(tmp.path()).unwrap();
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let backend = RotatingFileBackend::with_clock(&dir, "app", "main", 0u64, clock);

        assert_eq!(backend.cut_size(), crate::rotation::DEFAULT_CUT_SIZE);
        assert!(backend.current_path().is_none());

        backend.receive(&record("hello")).unwrap();
        backend.shutdown().unwrap();

        let path = tmp.path().join("app_main_20240501_1.log");
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{}\n", record("hello").render_text()));
    }

    #[test]
    fn test_size_rotation_produces_ceil_segments() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = LogDir::setup(tmp.path()).unwrap();
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let len = line_len("0123456789");
        let backend = RotatingFileBackend::with_clock(&dir, "app", "main", len * 4, clock);

        for _ in 0..10 {
            backend.receive(&record("0123456789")).unwrap();
        }
        backend.shutdown().unwrap();

        let names = segment_files(tmp.path());
        assert_eq!(
            names,
            vec![
                "app_main_20240501_1.log",
                "app_main_20240501_2.log",
                "app_main_20240501_3.log",
            ]
        );
        let sizes: Vec<u64> = names
            .iter()
            .map(|n| std::fs::metadata(tmp.path().join(n)).unwrap().len())
            .collect();
        assert_eq!(sizes, vec![len * 4, len * 4, len * 2]);
    }

    #[test]
    fn test_date_change_restarts_numbering() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = LogDir::setup(tmp.path()).unwrap();
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let len = line_len("x");
        let backend =
            RotatingFileBackend::with_clock(&dir, "app", "main", len, Arc::clone(&clock));

        for _ in 0..3 {
            backend.receive(&record("x")).unwrap();
        }
        assert_eq!(
            backend.current_path(),
            Some(tmp.path().join("app_main_20240501_3.log"))
        );

        clock.set(date!(2024 - 05 - 02));
        backend.receive(&record("x")).unwrap();
        assert_eq!(
            backend.current_path(),
            Some(tmp.path().join("app_main_20240502_1.log"))
        );
        backend.shutdown().unwrap();
    }

    #[test]
    fn test_skips_full_segments_from_previous_run() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = LogDir::setup(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("app_main_20240501_1.log"), vec![b'a'; 64]).unwrap();
        std::fs::write(tmp.path().join("app_main_20240501_2.log"), vec![b'b'; 64]).unwrap();
        std::fs::write(tmp.path().join("app_main_20240501_3.log"), b"partial\n").unwrap();

        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let backend = RotatingFileBackend::with_clock(&dir, "app", "main", 64u64, clock);
        backend.receive(&record("resume")).unwrap();
        backend.shutdown().unwrap();

        let content =
            std::fs::read_to_string(tmp.path().join("app_main_20240501_3.log")).unwrap();
        assert!(content.starts_with("partial\n"));
        assert!(content.contains("resume"));
        assert_eq!(
            std::fs::read(tmp.path().join("app_main_20240501_1.log")).unwrap(),
            vec![b'a'; 64]
        );
    }

    #[test]
    fn test_json_records() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = LogDir::setup(tmp.path()).unwrap();
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let backend = RotatingFileBackend::with_clock(&dir, "app", "json", 0u64, clock);

        let json = Record::with_timestamp(
            Level::Error,
            datetime!(2024-05-01 10:00:00 UTC),
            "app",
            "main.rs",
            9,
            "boom",
            Format::Json,
        );
        backend.receive(&json).unwrap();
        backend.shutdown().unwrap();

        let content =
            std::fs::read_to_string(tmp.path().join("app_json_20240501_1.log")).unwrap();
        let value: serde_json::Value = serde_json::from_str(content.trim_end()).unwrap();
        assert_eq!(value["Flag"], "E");
        assert_eq!(value["Content"], "boom");
    }

    #[test]
    fn test_open_failure_disables_backend() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("logs");
        let dir = LogDir::setup(&root).unwrap();
        std::fs::remove_dir_all(&root).unwrap();

        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let backend = RotatingFileBackend::with_clock(&dir, "app", "main", 0u64, clock);

        assert!(backend.is_available());
        assert!(matches!(backend.receive(&record("lost")), Err(Error::Io(_))));
        assert!(backend.is_failed());
        assert!(!backend.is_available());

        // Recreating the directory does not revive a failed backend.
        std::fs::create_dir_all(&root).unwrap();
        assert!(matches!(
            backend.receive(&record("lost")),
            Err(Error::BackendUnavailable(_))
        ));
        assert!(segment_files(&root).is_empty());
    }

    #[test]
    fn test_unreadable_size_forces_rotation() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = LogDir::setup(tmp.path()).unwrap();
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let backend = RotatingFileBackend::with_clock(&dir, "app", "main", 64u64, clock);
        assert!(!backend.over_cut(Ok(63)));
        assert!(backend.over_cut(Ok(64)));
        assert!(backend.over_cut(Err(io::Error::other("stale handle"))));
    }

    #[test]
    fn test_shutdown_is_idempotent_and_final() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = LogDir::setup(tmp.path()).unwrap();
        let clock = ManualClock::new(date!(2024 - 05 - 01));
        let backend = RotatingFileBackend::with_clock(&dir, "app", "main", 0u64, clock);

        backend.receive(&record("one")).unwrap();
        backend.shutdown().unwrap();
        backend.shutdown().unwrap();
        assert!(backend.current_path().is_none());
        assert!(matches!(
            backend.receive(&record("two")),
            Err(Error::BackendUnavailable(_))
        ));
    }
}
