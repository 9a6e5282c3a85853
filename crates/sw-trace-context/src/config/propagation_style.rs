// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configured propagators, read from the standard `OTEL_PROPAGATORS` variable.
//!
//! ```text
//! OTEL_PROPAGATORS=tracecontext,baggage,solarwinds_propagator
//! ```
//!
//! The list is ordered. `tracecontext` is mandatory, and `solarwinds` must come after it
//! because it rewrites the `tracestate` header the W3C propagator writes.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer};
use tracing::error;

use crate::config::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationStyle {
    /// W3C `traceparent` / `tracestate`.
    TraceContext,
    /// W3C `baggage`, handled outside this crate.
    Baggage,
    /// The `sw` member of `tracestate`.
    SolarWinds,
    None,
}

/// Case-insensitive; unknown styles are logged and become [`PropagationStyle::None`].
impl FromStr for PropagationStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tracecontext" => Ok(PropagationStyle::TraceContext),
            "baggage" => Ok(PropagationStyle::Baggage),
            "solarwinds" | "solarwinds_propagator" => Ok(PropagationStyle::SolarWinds),
            "none" => Ok(PropagationStyle::None),
            _ => {
                error!("Propagation style is invalid: {s:?}, using None");
                Ok(PropagationStyle::None)
            }
        }
    }
}

impl Display for PropagationStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let style = match self {
            PropagationStyle::TraceContext => "tracecontext",
            PropagationStyle::Baggage => "baggage",
            PropagationStyle::SolarWinds => "solarwinds",
            PropagationStyle::None => "none",
        };
        write!(f, "{style}")
    }
}

#[must_use]
pub fn default_propagators() -> Vec<PropagationStyle> {
    vec![
        PropagationStyle::TraceContext,
        PropagationStyle::Baggage,
        PropagationStyle::SolarWinds,
    ]
}

/// Checks that `tracecontext` is configured and that `solarwinds` does not precede it.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPropagators`] describing the violated rule.
pub fn validate_propagators(styles: &[PropagationStyle]) -> Result<(), ConfigError> {
    let position = |wanted: PropagationStyle| styles.iter().position(|s| *s == wanted);

    match (
        position(PropagationStyle::TraceContext),
        position(PropagationStyle::SolarWinds),
    ) {
        (None, _) => Err(ConfigError::InvalidPropagators(
            "tracecontext propagator must be configured".to_string(),
        )),
        (Some(trace_context), Some(solarwinds)) if solarwinds < trace_context => {
            Err(ConfigError::InvalidPropagators(
                "tracecontext propagator must be configured before solarwinds".to_string(),
            ))
        }
        _ => Ok(()),
    }
}

/// Deserializes a comma-separated list such as `"tracecontext, baggage,solarwinds"`.
#[allow(clippy::module_name_repetitions)]
pub fn deserialize_propagation_styles<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<PropagationStyle>>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = String::deserialize(deserializer)?;

    Ok(Some(
        s.split(',')
            .map(str::trim)
            .filter(|style| !style.is_empty())
            .filter_map(|style| match PropagationStyle::from_str(style) {
                Ok(parsed_style) => Some(parsed_style),
                Err(e) => {
                    error!("Failed to parse propagation style: {e}, ignoring");
                    None
                }
            })
            .collect(),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use super::PropagationStyle::{Baggage, SolarWinds, TraceContext};

    #[derive(Deserialize)]
    struct Styles {
        #[serde(deserialize_with = "deserialize_propagation_styles")]
        propagators: Option<Vec<PropagationStyle>>,
    }

    #[test]
    fn parse_known_styles() {
        assert_eq!(PropagationStyle::from_str("TraceContext").unwrap(), TraceContext);
        assert_eq!(
            PropagationStyle::from_str("solarwinds_propagator").unwrap(),
            SolarWinds
        );
        assert_eq!(
            PropagationStyle::from_str("b3multi").unwrap(),
            PropagationStyle::None
        );
    }

    #[test]
    fn deserialize_comma_separated() {
        let styles: Styles =
            serde_json::from_value(json!({ "propagators": "tracecontext, baggage,solarwinds" }))
                .unwrap();
        assert_eq!(
            styles.propagators,
            Some(vec![TraceContext, Baggage, SolarWinds])
        );
    }

    #[test]
    fn validate_order() {
        assert!(validate_propagators(&default_propagators()).is_ok());
        assert!(validate_propagators(&[TraceContext]).is_ok());
        assert!(validate_propagators(&[Baggage, SolarWinds]).is_err());
        assert_eq!(
            validate_propagators(&[SolarWinds, TraceContext]),
            Err(ConfigError::InvalidPropagators(
                "tracecontext propagator must be configured before solarwinds".to_string()
            ))
        );
    }

    #[test]
    fn display_round_trips() {
        for style in [TraceContext, Baggage, SolarWinds, PropagationStyle::None] {
            assert_eq!(PropagationStyle::from_str(&style.to_string()).unwrap(), style);
        }
    }
}
