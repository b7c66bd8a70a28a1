use std::panic::Location;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::FormatItem;
use time::macros::format_description;

use crate::{Level, Result};

/// Timestamp layout of rendered lines, microsecond precision.
const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");

/// How a record is rendered by text-oriented backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// `{timestamp} ({file}:{line}) [{level}] {logger} -- {message}`
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// One log event. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    level: Level,
    timestamp: OffsetDateTime,
    logger: String,
    file: String,
    line: u32,
    message: String,
    format: Format,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct JsonLine<'a> {
    timestamp: &'a str,
    file: &'a str,
    line: u32,
    flag: &'a str,
    log: &'a str,
    content: &'a str,
}

impl Record {
    /// Build a record stamped with the current local time.
    pub fn new(
        level: Level,
        logger: impl Into<String>,
        location: &Location<'_>,
        message: impl Into<String>,
        format: Format,
    ) -> Self {
        Self::with_timestamp(
            level,
            now(),
            logger,
            short_file(location.file()),
            location.line(),
            message,
            format,
        )
    }

    /// Build a record with every field supplied by the caller.
    pub fn with_timestamp(
        level: Level,
        timestamp: OffsetDateTime,
        logger: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        message: impl Into<String>,
        format: Format,
    ) -> Self {
        Self {
            level,
            timestamp,
            logger: logger.into(),
            file: file.into(),
            line,
            message: message.into(),
            format,
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    pub fn logger(&self) -> &str {
        &self.logger
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn format(&self) -> Format {
        self.format
    }

    fn formatted_timestamp(&self) -> String {
        self.timestamp
            .format(TIMESTAMP_FORMAT)
            .unwrap_or_else(|_| self.timestamp.to_string())
    }

    /// Plain text rendering, without a trailing newline.
    pub fn render_text(&self) -> String {
        format!(
            "{} ({}:{}) [{}] {} -- {}",
            self.formatted_timestamp(),
            self.file,
            self.line,
            self.level,
            self.logger,
            self.message
        )
    }

    /// JSON object rendering, without a trailing newline.
    pub fn render_json(&self) -> Result<String> {
        let timestamp = self.formatted_timestamp();
        let line = JsonLine {
            timestamp: &timestamp,
            file: &self.file,
            line: self.line,
            flag: self.level.as_str(),
            log: &self.logger,
            content: &self.message,
        };
        Ok(serde_json::to_string(&line)?)
    }

    /// Render according to the record's format hint.
    pub fn render(&self) -> Result<String> {
        match self.format {
            Format::Text => Ok(self.render_text()),
            Format::Json => self.render_json(),
        }
    }
}

/// Current local time, UTC when the local offset cannot be determined.
pub(crate) fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn short_file(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
