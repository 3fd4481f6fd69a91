use std::ops::Deref;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::Deserialize;

/// The `[log]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    #[serde(default)]
    pub to: To,
    #[serde(default)]
    pub level: Level,
    #[serde(default = "Log::dir_default")]
    pub dir: String,
    #[serde(default = "Log::file_default")]
    pub file: String,
}

impl Default for Log {
    #[inline]
    fn default() -> Self {
        Self { to: To::default(), level: Level::default(), dir: Self::dir_default(), file: Self::file_default() }
    }
}

impl Log {
    #[inline]
    fn dir_default() -> String {
        "/var/log/jmsbus".into()
    }
    #[inline]
    fn file_default() -> String {
        "jmsbus.log".into()
    }

    /// Full path of the log file, or an empty string when no file is configured.
    #[inline]
    pub fn filename(&self) -> String {
        match (self.dir.trim_end_matches(['/', '\\']), self.file.as_str()) {
            (_, "") => String::new(),
            ("", file) => file.to_owned(),
            (dir, file) => format!("{dir}/{file}"),
        }
    }
}

/// Where log records go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum To {
    Off,
    File,
    #[default]
    Console,
    Both,
}

impl To {
    #[inline]
    pub fn file(&self) -> bool {
        matches!(self, To::Both | To::File)
    }
    #[inline]
    pub fn console(&self) -> bool {
        matches!(self, To::Both | To::Console)
    }
    #[inline]
    pub fn off(&self) -> bool {
        matches!(self, To::Off)
    }
}

impl<'de> Deserialize<'de> for To {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match String::deserialize(deserializer)?.to_ascii_lowercase().as_str() {
            "off" => Ok(To::Off),
            "file" => Ok(To::File),
            "console" => Ok(To::Console),
            "both" => Ok(To::Both),
            other => Err(de::Error::unknown_variant(other, &["off", "file", "console", "both"])),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Level {
    inner: slog::Level,
}

impl Default for Level {
    #[inline]
    fn default() -> Self {
        Level { inner: slog::Level::Info }
    }
}

impl Level {
    #[inline]
    pub fn inner(&self) -> slog::Level {
        self.inner
    }
}

impl From<slog::Level> for Level {
    #[inline]
    fn from(inner: slog::Level) -> Self {
        Level { inner }
    }
}

impl Deref for Level {
    type Target = slog::Level;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'de> Deserialize<'de> for Level {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level = String::deserialize(deserializer)?;
        let inner = slog::Level::from_str(&level)
            .map_err(|_e| de::Error::custom(format!("invalid log level `{level}`")))?;
        Ok(Level { inner })
    }
}
