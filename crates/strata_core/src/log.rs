//! # Logging Side Channel
//!
//! Systems can emit `(level, message)` pairs tagged with their layer. The
//! messages are forwarded to `tracing` and never affect simulation state.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, trace, warn};

use crate::ecs::Layer;
use crate::error::SimError;

/// Severity of a system log message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    /// Very fine-grained tracing.
    Trace = 0,
    /// Debugging detail.
    Debug = 1,
    /// Normal operation.
    Info = 2,
    /// Something looks wrong.
    Warn = 3,
    /// Something failed.
    Error = 4,
    /// Emitted regardless of filtering.
    Always = 6,
}

impl LogLevel {
    /// Lowercase level name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Always => "always",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "always" => Ok(Self::Always),
            other => Err(SimError::InvalidArgument(format!("unknown log level `{other}`"))),
        }
    }
}

/// Forwards a system log message to `tracing`.
///
/// `Always` messages are emitted at info level with `always = true`, so a
/// subscriber can let them through any level filter.
pub fn send_log_message(layer: &Layer, level: LogLevel, message: &str) {
    match level {
        LogLevel::Trace => trace!(layer = %layer, "{message}"),
        LogLevel::Debug => debug!(layer = %layer, "{message}"),
        LogLevel::Info => info!(layer = %layer, "{message}"),
        LogLevel::Warn => warn!(layer = %layer, "{message}"),
        LogLevel::Error => error!(layer = %layer, "{message}"),
        LogLevel::Always => info!(layer = %layer, always = true, "{message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Error < LogLevel::Always);
        assert_eq!(LogLevel::Always as u8, 6);
    }

    #[test]
    fn test_parse_levels() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("always".parse::<LogLevel>().unwrap(), LogLevel::Always);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Info.to_string(), "info");
    }

    #[test]
    fn test_send_without_subscriber_is_harmless() {
        let layer = Layer::new("movement");
        for level in [LogLevel::Trace, LogLevel::Warn, LogLevel::Always] {
            send_log_message(&layer, level, "hello");
        }
    }
}
