// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Local overrides passed to the decision oracle.
//!
//! `tracingMode` forces tracing on or off for the whole service; when unset, the oracle
//! follows the settings it receives from the backend. `triggerTrace` controls whether
//! `x-trace-options: trigger-trace` requests may start a trace.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracingMode {
    Enabled,
    Disabled,
}

impl FromStr for TracingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "enabled" => Ok(TracingMode::Enabled),
            "disabled" => Ok(TracingMode::Disabled),
            _ => Err(format!(
                "Invalid tracing mode: '{s}'. Valid modes are: enabled, disabled"
            )),
        }
    }
}

impl Display for TracingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TracingMode::Enabled => write!(f, "enabled"),
            TracingMode::Disabled => write!(f, "disabled"),
        }
    }
}

/// Invalid values are logged and leave the mode unset.
pub fn deserialize_tracing_mode<'de, D>(deserializer: D) -> Result<Option<TracingMode>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => match TracingMode::from_str(&s) {
            Ok(mode) => Ok(Some(mode)),
            Err(e) => {
                error!("{e}, ignoring");
                Ok(None)
            }
        },
        other => {
            error!("Expected a string for tracing mode, got {other:?}, ignoring");
            Ok(None)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerTraceMode {
    #[default]
    Enabled,
    Disabled,
}

impl FromStr for TriggerTraceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "enabled" => Ok(TriggerTraceMode::Enabled),
            "disabled" => Ok(TriggerTraceMode::Disabled),
            _ => Err(format!(
                "Invalid trigger trace mode: '{s}'. Valid modes are: enabled, disabled"
            )),
        }
    }
}

/// Never fails: invalid input is logged and replaced by [`TriggerTraceMode::Enabled`].
impl<'de> Deserialize<'de> for TriggerTraceMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        if let Value::String(s) = value {
            TriggerTraceMode::from_str(&s).or_else(|e| {
                error!("{e}, using enabled");
                Ok(TriggerTraceMode::Enabled)
            })
        } else {
            error!("Expected a string for trigger trace mode, got {value:?}, using enabled");
            Ok(TriggerTraceMode::Enabled)
        }
    }
}
