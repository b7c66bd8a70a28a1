//! Out-of-band compression of rotated log segments.
//!
//! [`Archiver::compress`] bundles every segment dated on or before a cutoff
//! into `{YYYYMMDD}.tar.gz` and removes the originals; [`Archiver::decompress`]
//! restores them. Both passes are all or nothing: a failure removes whatever
//! the pass itself produced and leaves the inputs untouched.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use time::{Date, Duration};

use crate::rotation::{Clock, LocalClock, LogDir, SegmentName};
use crate::{Error, Result};

/// Outcome of a compress pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompressReport {
    /// Archive written, `None` when no segment matched.
    pub archive: Option<PathBuf>,
    /// File names stored in the archive.
    pub files: Vec<String>,
}

/// Outcome of a decompress pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecompressReport {
    /// File names restored into the log directory.
    pub files: Vec<String>,
}

/// Compresses and restores rotated segments inside one log directory.
#[derive(Debug, Clone)]
pub struct Archiver {
    dir: LogDir,
}

impl Archiver {
    pub fn new(dir: &LogDir) -> Self {
        Self { dir: dir.clone() }
    }

    /// Segment file names dated on or before `cutoff` whose stream starts
    /// with `prefix`, sorted. Malformed names are skipped.
    pub fn select(&self, prefix: &str, cutoff: Date) -> Result<Vec<String>> {
        let mut selected = Vec::new();
        for entry in fs::read_dir(self.dir.path())? {
            let entry = entry?;
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
                continue;
            }
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(segment) = SegmentName::parse(file_name) else {
                tracing::trace!(file = file_name, "not a log segment, skipping");
                continue;
            };
            if segment.date <= cutoff && segment.stream.starts_with(prefix) {
                selected.push(file_name.to_string());
            }
        }
        selected.sort();
        Ok(selected)
    }

    /// Bundle matching segments into `{cutoff}.tar.gz` and delete them.
    ///
    /// Any failure while writing the archive aborts the pass: the partial
    /// archive written by this pass is removed and no segment is deleted. An existing archive for
    /// `cutoff` is an error.
    pub fn compress(&self, prefix: &str, cutoff: Date) -> Result<CompressReport> {
        let files = self.select(prefix, cutoff)?;
        if files.is_empty() {
            tracing::debug!(prefix, "no log segments to compress");
            return Ok(CompressReport::default());
        }

        let archive = self.dir.archive_path(cutoff)?;
        if archive.exists() {
            return Err(Error::Archive(format!(
                "{} already exists",
                archive.display()
            )));
        }

        // A leftover partial archive is not ours to remove.
        let partial = partial_path(&archive);
        let out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial)
            .map_err(|e| {
                Error::Archive(format!("cannot create {}: {}", partial.display(), e))
            })?;

        let written = self
            .write_archive(out, &files)
            .and_then(|()| fs::rename(&partial, &archive).map_err(Error::from));
        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            tracing::error!(archive = %archive.display(), error = %e, "compress log files failed");
            return Err(e);
        }

        for file in &files {
            if let Err(e) = fs::remove_file(self.dir.path().join(file)) {
                tracing::warn!(file = %file, error = %e, "remove archived log file failed");
            }
        }
        tracing::info!(archive = %archive.display(), count = files.len(), "compressed log files");

        Ok(CompressReport {
            archive: Some(archive),
            files,
        })
    }

    fn write_archive(&self, out: File, files: &[String]) -> Result<()> {
        let mut builder = tar::Builder::new(GzEncoder::new(out, Compression::default()));
        for file in files {
            builder
                .append_path_with_name(self.dir.path().join(file), file)
                .map_err(|e| Error::Archive(format!("cannot archive {}: {}", file, e)))?;
        }
        let encoder = builder.into_inner()?;
        let out = encoder.finish()?;
        out.sync_all()?;
        Ok(())
    }

    /// Restore every file of `{date}.tar.gz` into the log directory and
    /// delete the archive.
    ///
    /// Existing files are never overwritten. On failure the files restored by
    /// this pass are removed again and the archive is kept.
    pub fn decompress(&self, date: Date) -> Result<DecompressReport> {
        let archive = self.dir.archive_path(date)?;
        let file = File::open(&archive)
            .map_err(|e| Error::Archive(format!("cannot open {}: {}", archive.display(), e)))?;

        let mut restored = Vec::new();
        if let Err(e) = self.extract(file, &mut restored) {
            for name in &restored {
                let _ = fs::remove_file(self.dir.path().join(name));
            }
            tracing::error!(archive = %archive.display(), error = %e, "uncompress log failed");
            return Err(e);
        }

        fs::remove_file(&archive)?;
        tracing::info!(archive = %archive.display(), count = restored.len(), "restored log files");
        Ok(DecompressReport { files: restored })
    }

    fn extract(&self, file: File, restored: &mut Vec<String>) -> Result<()> {
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.into_owned();
            let name = plain_file_name(&path).ok_or_else(|| {
                Error::Archive(format!("refusing archive entry {}", path.display()))
            })?;

            let target = self.dir.path().join(&name);
            let mut out = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
                .map_err(|e| Error::Archive(format!("cannot restore {}: {}", name, e)))?;
            restored.push(name);
            io::copy(&mut entry, &mut out)?;
            out.sync_all()?;
        }
        Ok(())
    }
}

/// The local date `days` before today.
pub fn cutoff_days_ago(days: i64) -> Date {
    let today = LocalClock.today();
    today.checked_sub(Duration::days(days)).unwrap_or(Date::MIN)
}

fn partial_path(archive: &Path) -> PathBuf {
    let mut name = OsString::from(archive.as_os_str());
    name.push(".partial");
    PathBuf::from(name)
}

/// The entry name when it is a single normal path component.
fn plain_file_name(path: &Path) -> Option<String> {
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => name.to_str().map(str::to_string),
        _ => None,
    }
}
