use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, de};
use time::Date;
use time::format_description::FormatItem;
use time::macros::format_description;

use crate::{Error, Result};

/// Cut size used when a backend is configured with zero.
pub const DEFAULT_CUT_SIZE: u64 = 20_000_000;

const DATE_STAMP_FORMAT: &[FormatItem<'static>] = format_description!("[year][month][day]");

/// Parse a size string with optional units (K/M/G, case-insensitive), defaulting to bytes if no unit.
fn parse_size(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    let Some(last) = s.chars().last() else {
        return Err("empty size string".to_string());
    };

    let (num_str, unit) = if last.is_alphabetic() {
        (&s[..s.len() - last.len_utf8()], last.to_ascii_uppercase())
    } else {
        (s, 'B')
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("invalid number: {}", num_str))?;

    let multiplier = match unit {
        'B' => 1,
        'K' => 1024,
        'M' => 1024 * 1024,
        'G' => 1024 * 1024 * 1024,
        _ => return Err(format!("invalid unit: {}, supported: K/M/G", unit)),
    };

    num.checked_mul(multiplier)
        .ok_or_else(|| "size too large".to_string())
}

/// Byte threshold that starts a new segment.
///
/// Deserializes from a number of bytes or a string with units
/// (K/M/G, case-insensitive). Examples: `4096`, `"512K"`, `"20M"`, `"1g"`.
/// Zero means [`DEFAULT_CUT_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct CutSize(u64);

impl CutSize {
    pub const fn new(bytes: u64) -> Self {
        CutSize(bytes)
    }

    /// Effective threshold in bytes.
    pub const fn bytes(self) -> u64 {
        if self.0 == 0 { DEFAULT_CUT_SIZE } else { self.0 }
    }
}

impl From<u64> for CutSize {
    fn from(bytes: u64) -> Self {
        CutSize(bytes)
    }
}

impl std::str::FromStr for CutSize {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_size(s).map(CutSize).map_err(Error::Config)
    }
}

impl<'de> Deserialize<'de> for CutSize {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        /// Size value that can be a number or string with units.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum SizeValue {
            Number(u64),
            String(String),
        }

        match SizeValue::deserialize(deserializer)? {
            SizeValue::Number(n) => Ok(CutSize(n)),
            SizeValue::String(s) => parse_size(&s).map(CutSize).map_err(de::Error::custom),
        }
    }
}

/// Source of the calendar date used to split files by day.
pub trait Clock: Send + Sync {
    fn today(&self) -> Date;
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn today(&self) -> Date {
        (**self).today()
    }
}

/// Local calendar date, falling back to UTC when the offset is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> Date {
        crate::record::now().date()
    }
}

/// `YYYYMMDD` stamp embedded in segment and archive names.
pub fn date_stamp(date: Date) -> Result<String> {
    Ok(date.format(DATE_STAMP_FORMAT)?)
}

/// Parse a `YYYYMMDD` stamp.
pub fn parse_date_stamp(s: &str) -> Option<Date> {
    Date::parse(s, DATE_STAMP_FORMAT).ok()
}

/// A log directory that has been set up for use.
///
/// Rotating file backends and the archiver only accept a `LogDir`, so the
/// one-time directory setup cannot be skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDir {
    path: PathBuf,
}

impl LogDir {
    /// Create the directory if it is absent. Any other failure is a
    /// configuration error.
    pub fn setup(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::Config("log directory path is empty".to_string()));
        }
        match std::fs::create_dir_all(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => {}
            Err(e) => {
                return Err(Error::Config(format!(
                    "cannot create log directory {}: {}",
                    path.display(),
                    e
                )));
            }
        }
        if !path.is_dir() {
            return Err(Error::Config(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        tracing::debug!(dir = %path.display(), "log directory ready");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full path of one segment file.
    pub fn segment_path(&self, name: &SegmentName) -> Result<PathBuf> {
        Ok(self.path.join(name.file_name()?))
    }

    /// Full path of the archive for `date`.
    pub fn archive_path(&self, date: Date) -> Result<PathBuf> {
        Ok(self.path.join(format!("{}.tar.gz", date_stamp(date)?)))
    }
}

/// Parsed form of `{name}_{description}_{YYYYMMDD}_{segment}.log`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentName {
    /// `{name}_{description}`.
    pub stream: String,
    pub date: Date,
    pub segment: u32,
}

impl SegmentName {
    pub fn new(name: &str, description: &str, date: Date, segment: u32) -> Self {
        Self {
            stream: format!("{}_{}", name, description),
            date,
            segment,
        }
    }

    /// Parse a file name. The date and segment are taken from the right so
    /// names and descriptions may themselves contain underscores.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".log")?;
        let mut parts = stem.rsplitn(3, '_');
        let segment = parts.next()?.parse().ok()?;
        let date = parse_date_stamp(parts.next()?)?;
        let stream = parts.next()?;
        // The stream must still hold both a name and a description.
        if !stream.contains('_') {
            return None;
        }
        Some(Self {
            stream: stream.to_string(),
            date,
            segment,
        })
    }

    /// File name in the log directory: `{stream}_{YYYYMMDD}_{segment}.log`.
    pub fn file_name(&self) -> Result<String> {
        Ok(format!(
            "{}_{}_{}.log",
            self.stream,
            date_stamp(self.date)?,
            self.segment
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_cut_size_default() {
        assert_eq!(CutSize::new(0).bytes(), DEFAULT_CUT_SIZE);
        assert_eq!(CutSize::new(4096).bytes(), 4096);
    }

    #[test]
    fn test_cut_size_deserialize() {
        let size: CutSize = serde_yaml::from_str("4096").unwrap();
        assert_eq!(size.bytes(), 4096);

        let size: CutSize = serde_yaml::from_str("\"5K\"").unwrap();
        assert_eq!(size.bytes(), 5 * 1024);

        let size: CutSize = serde_yaml::from_str("\"3m\"").unwrap();
        assert_eq!(size.bytes(), 3 * 1024 * 1024);

        let size: CutSize = serde_yaml::from_str("\"2g\"").unwrap();
        assert_eq!(size.bytes(), 2 * 1024 * 1024 * 1024);

        let size: CutSize = serde_yaml::from_str("\"100\"").unwrap();
        assert_eq!(size.bytes(), 100);

        assert!(serde_yaml::from_str::<CutSize>("\"12Q\"").is_err());
        assert!(serde_yaml::from_str::<CutSize>("\"\"").is_err());
    }

    #[test]
    fn test_cut_size_from_str() {
        assert_eq!("20M".parse::<CutSize>().unwrap().bytes(), 20 * 1024 * 1024);
        assert!(matches!("x".parse::<CutSize>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_date_stamp() {
        assert_eq!(date_stamp(date!(2024 - 01 - 09)).unwrap(), "20240109");
        assert_eq!(parse_date_stamp("20240109"), Some(date!(2024 - 01 - 09)));
        assert_eq!(parse_date_stamp("20241301"), None);
        assert_eq!(parse_date_stamp("2024019"), None);
        assert_eq!(parse_date_stamp("2024o109"), None);
        assert_eq!(parse_date_stamp("202401091"), None);
        assert_eq!(parse_date_stamp("20240230"), None);
    }

    #[test]
    fn test_segment_name_roundtrip() {
        let name = SegmentName::new("api_server", "access", date!(2024 - 02 - 29), 7);
        let file = name.file_name().unwrap();
        assert_eq!(file, "api_server_access_20240229_7.log");
        assert_eq!(SegmentName::parse(&file), Some(name));
    }

    #[test]
    fn test_segment_name_rejects_malformed() {
        assert_eq!(SegmentName::parse("app_20240101_1.log"), None);
        assert_eq!(SegmentName::parse("app_main_20240101_x.log"), None);
        assert_eq!(SegmentName::parse("app_main_2024_1.log"), None);
        assert_eq!(SegmentName::parse("app_main_20240101_1.txt"), None);
        assert_eq!(SegmentName::parse("20240101.tar.gz"), None);
        assert_eq!(SegmentName::parse("README"), None);
    }

    #[test]
    fn test_log_dir_setup_creates_and_reuses() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/logs");
        let dir = LogDir::setup(&path).unwrap();
        assert!(path.is_dir());
        assert_eq!(dir.path(), path.as_path());
        assert!(LogDir::setup(&path).is_ok());
    }

    #[test]
    fn test_log_dir_setup_rejects_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(LogDir::setup(tmp.path()), Err(Error::Config(_))));
    }
}
