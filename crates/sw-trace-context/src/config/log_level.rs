// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log level of the crate's own diagnostics.
//!
//! Set with `SW_APM_LOG_LEVEL=debug` or `"logLevel": "debug"` in the JSON config file.
//! Invalid values are logged and fall back to the default, `WARN`.

use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::error;
use tracing_core::LevelFilter;

/// Verbosity of log output, from least to most verbose.
///
/// ```
/// use std::str::FromStr;
/// use sw_trace_context::config::log_level::LogLevel;
///
/// assert_eq!(LogLevel::from_str("DeBuG").unwrap(), LogLevel::Debug);
/// assert!(LogLevel::from_str("verbose").is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Logging disabled entirely.
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl AsRef<str> for LogLevel {
    fn as_ref(&self) -> &str {
        match self {
            LogLevel::Off => "OFF",
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

impl LogLevel {
    #[must_use]
    pub fn as_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Invalid log level: '{s}'. Valid levels are: off, error, warn, info, debug, trace",
            )),
        }
    }
}

/// Never fails: invalid input is logged and replaced by [`LogLevel::Warn`].
impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        if let Value::String(s) = value {
            match LogLevel::from_str(&s) {
                Ok(level) => Ok(level),
                Err(e) => {
                    error!("{e}");
                    Ok(LogLevel::Warn)
                }
            }
        } else {
            error!("Expected a string for log level, got {value:?}");
            Ok(LogLevel::Warn)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(LogLevel::from_str("TRACE").unwrap(), LogLevel::Trace);
        assert_eq!(LogLevel::from_str(" warning ").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("none").unwrap(), LogLevel::Off);
    }

    #[test]
    fn deserialize_falls_back_to_warn() {
        let level: LogLevel = serde_json::from_value(json!("debug")).unwrap();
        assert_eq!(level, LogLevel::Debug);

        let level: LogLevel = serde_json::from_value(json!("loud")).unwrap();
        assert_eq!(level, LogLevel::Warn);

        let level: LogLevel = serde_json::from_value(json!(3)).unwrap();
        assert_eq!(level, LogLevel::Warn);
    }

    #[test]
    fn level_filter_mapping() {
        assert_eq!(LogLevel::Off.as_level_filter(), LevelFilter::OFF);
        assert_eq!(LogLevel::Debug.as_level_filter(), LevelFilter::DEBUG);
        assert!(LogLevel::Error.as_level_filter() < LogLevel::Info.as_level_filter());
    }
}
