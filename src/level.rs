use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Severity of a record. Each level occupies one bit so levels can be combined
/// into a [`LevelMask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    Fatal = 1 << 0,
    Error = 1 << 1,
    Warn = 1 << 2,
    Info = 1 << 3,
    Debug = 1 << 4,
}

impl Level {
    /// All levels, most severe first.
    pub const ALL: [Level; 5] = [
        Level::Fatal,
        Level::Error,
        Level::Warn,
        Level::Info,
        Level::Debug,
    ];

    /// Bit of this level inside a mask.
    pub const fn bit(self) -> u8 {
        self as u8
    }

    /// Single-letter tag used in rendered lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Fatal => "F",
            Level::Error => "E",
            Level::Warn => "W",
            Level::Info => "I",
            Level::Debug => "D",
        }
    }

    /// Parse a level name, case-insensitive. Accepts full names and the
    /// single-letter tags.
    pub fn parse(s: &str) -> Option<Level> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fatal" | "f" => Some(Level::Fatal),
            "error" | "e" => Some(Level::Error),
            "warn" | "warning" | "w" => Some(Level::Warn),
            "info" | "i" => Some(Level::Info),
            "debug" | "d" => Some(Level::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of enabled levels.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LevelMask(u8);

impl LevelMask {
    pub const NONE: LevelMask = LevelMask(0);
    pub const ALL: LevelMask = LevelMask(0b1_1111);

    pub const fn from_bits(bits: u8) -> Self {
        LevelMask(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, level: Level) -> bool {
        self.0 & level.bit() != 0
    }

    /// Every level at least as severe as `level`.
    pub fn up_to(level: Level) -> Self {
        Level::ALL
            .iter()
            .filter(|l| **l <= level)
            .fold(LevelMask::NONE, |mask, l| mask | *l)
    }

    /// Parse either a threshold name (`"warn"`) or a `|`/`,` separated list
    /// (`"error|debug"`). `"all"` and `"off"` are accepted as well.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "all" => return Ok(LevelMask::ALL),
            "" | "off" | "none" => return Ok(LevelMask::NONE),
            _ => {}
        }
        if s.contains('|') || s.contains(',') {
            return s
                .split(['|', ','])
                .filter(|part| !part.trim().is_empty())
                .try_fold(LevelMask::NONE, |mask, part| {
                    Level::parse(part)
                        .map(|l| mask | l)
                        .ok_or_else(|| format!("invalid level: {}", part.trim()))
                });
        }
        Level::parse(s)
            .map(LevelMask::up_to)
            .ok_or_else(|| format!("invalid level: {}", s))
    }
}

impl From<Level> for LevelMask {
    fn from(level: Level) -> Self {
        LevelMask(level.bit())
    }
}

impl BitOr for Level {
    type Output = LevelMask;

    fn bitor(self, rhs: Level) -> LevelMask {
        LevelMask(self.bit() | rhs.bit())
    }
}

impl BitOr<Level> for LevelMask {
    type Output = LevelMask;

    fn bitor(self, rhs: Level) -> LevelMask {
        LevelMask(self.0 | rhs.bit())
    }
}

impl BitOr for LevelMask {
    type Output = LevelMask;

    fn bitor(self, rhs: LevelMask) -> LevelMask {
        LevelMask(self.0 | rhs.0)
    }
}

impl BitOrAssign<Level> for LevelMask {
    fn bitor_assign(&mut self, rhs: Level) {
        self.0 |= rhs.bit();
    }
}

impl BitAnd for LevelMask {
    type Output = LevelMask;

    fn bitand(self, rhs: LevelMask) -> LevelMask {
        LevelMask(self.0 & rhs.0)
    }
}

impl fmt::Debug for LevelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Level::ALL
            .iter()
            .filter(|l| self.contains(**l))
            .map(|l| l.as_str())
            .collect();
        write!(f, "LevelMask({})", names.join("|"))
    }
}

impl Serialize for LevelMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names: Vec<&str> = Level::ALL
            .iter()
            .filter(|l| self.contains(**l))
            .map(|l| match l {
                Level::Fatal => "fatal",
                Level::Error => "error",
                Level::Warn => "warn",
                Level::Info => "info",
                Level::Debug => "debug",
            })
            .collect();
        serializer.serialize_str(&names.join("|"))
    }
}

impl<'de> Deserialize<'de> for LevelMask {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum MaskInput {
            Name(String),
            List(Vec<String>),
            Bits(u8),
        }

        match MaskInput::deserialize(deserializer)? {
            MaskInput::Name(s) => LevelMask::parse(&s).map_err(de::Error::custom),
            MaskInput::List(names) => names.iter().try_fold(LevelMask::NONE, |mask, name| {
                Level::parse(name)
                    .map(|l| mask | l)
                    .ok_or_else(|| de::Error::custom(format!("invalid level: {}", name)))
            }),
            MaskInput::Bits(bits) => Ok(LevelMask::from_bits(bits)),
        }
    }
}
