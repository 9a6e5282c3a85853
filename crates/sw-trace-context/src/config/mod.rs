// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration Module
//!
//! ## Configuration Priority
//!
//! Sources are applied in order, later sources override earlier ones:
//!
//! 1. **Defaults** - [`Config::default`]
//! 2. **JSON file** - `solarwinds-apm-config.json` (camelCase keys), if present
//! 3. **Environment variables** - `SW_APM_*`, plus `OTEL_PROPAGATORS`
//!
//! A source that fails to load is logged and skipped.
//!
//! ## Validation
//!
//! After merging, [`ConfigBuilder::build`] disables the agent when the service key is
//! missing or not of the form `<token>:<service>`, or when the propagator list is invalid.
//! A disabled agent answers every sampling request with a drop (see
//! [`NoopOracle`](crate::sampling::oracle::NoopOracle)).

use std::path::Path;

use serde::{Deserialize, Deserializer};
use serde_aux::prelude::deserialize_bool_from_anything;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use crate::config::{
    env::EnvConfigSource,
    json::JsonConfigSource,
    log_level::LogLevel,
    propagation_style::{default_propagators, validate_propagators, PropagationStyle},
    tracing_mode::{TracingMode, TriggerTraceMode},
};

pub mod env;
pub mod json;
pub mod log_level;
pub mod propagation_style;
pub mod tracing_mode;

/// Default name of the JSON configuration file.
pub const CONFIG_FILE_NAME: &str = "solarwinds-apm-config.json";

/// Helper macro to merge `Option<T>` fields into `Option<T>` fields when `Some`
#[macro_export]
macro_rules! merge_option {
    ($config:expr, $source:expr, $field:ident) => {
        if $source.$field.is_some() {
            $config.$field.clone_from(&$source.$field);
        }
    };
}

/// Helper macro to merge `Option<T>` fields into `T` fields when `Some`
///
/// Providing two field arguments merges the source field into a differently named config field.
#[macro_export]
macro_rules! merge_option_to_value {
    ($config:expr, $config_field:ident, $source:expr, $source_field:ident) => {
        if let Some(value) = &$source.$source_field {
            $config.$config_field = value.clone();
        }
    };
    ($config:expr, $source:expr, $field:ident) => {
        if let Some(value) = &$source.$field {
            $config.$field = value.clone();
        }
    };
}

#[derive(Debug, Error, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    ParseError(String),
    #[error("invalid propagators: {0}")]
    InvalidPropagators(String),
}

#[allow(clippy::module_name_repetitions)]
pub trait ConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError>;
}

#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct Config {
    /// `false` turns every sampling decision into a drop.
    pub agent_enabled: bool,
    /// `<token>:<service>`.
    pub service_key: Option<String>,
    /// Local override of the backend tracing mode; `None` defers to the backend.
    pub tracing_mode: Option<TracingMode>,
    pub trigger_trace: TriggerTraceMode,
    pub log_level: LogLevel,
    pub propagators: Vec<PropagationStyle>,
    /// Transaction name used when none was set for a span.
    pub transaction_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_enabled: true,
            service_key: None,
            tracing_mode: None,
            trigger_trace: TriggerTraceMode::default(),
            log_level: LogLevel::default(),
            propagators: default_propagators(),
            transaction_name: None,
        }
    }
}

impl Config {
    /// The service part of the service key.
    #[must_use]
    pub fn service_name(&self) -> Option<&str> {
        self.service_key
            .as_deref()
            .and_then(split_service_key)
            .map(|(_, service)| service)
    }
}

fn split_service_key(key: &str) -> Option<(&str, &str)> {
    let (token, service) = key.split_once(':')?;
    let (token, service) = (token.trim(), service.trim());
    (!token.is_empty() && !service.is_empty()).then_some((token, service))
}

#[derive(Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    config: Config,
}

#[allow(clippy::module_name_repetitions)]
impl ConfigBuilder {
    #[must_use]
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn build(&mut self) -> Config {
        let mut failed_sources = 0;
        for source in &self.sources {
            if let Err(e) = source.load(&mut self.config) {
                error!("Failed to load config: {e}");
                failed_sources += 1;
            }
        }

        if !self.sources.is_empty() && failed_sources == self.sources.len() {
            debug!("All sources failed to load config, using default config.");
        }

        if self.config.agent_enabled {
            match self.config.service_key.as_deref() {
                None => {
                    error!("Missing service key, disabling the agent");
                    self.config.agent_enabled = false;
                }
                Some(key) if split_service_key(key).is_none() => {
                    error!("Service key must be of the form <token>:<service>, disabling the agent");
                    self.config.agent_enabled = false;
                }
                Some(_) => (),
            }
        }

        if let Err(e) = validate_propagators(&self.config.propagators) {
            error!("{e}, disabling the agent");
            self.config.agent_enabled = false;
        }

        self.config.clone()
    }
}

/// Loads the JSON file at `config_file`, then the environment.
#[must_use]
pub fn get_config(config_file: &Path) -> Config {
    ConfigBuilder::default()
        .add_source(Box::new(JsonConfigSource {
            path: config_file.to_path_buf(),
        }))
        .add_source(Box::new(EnvConfigSource))
        .build()
}

/// Accepts strings and numbers; anything else is logged and ignored.
pub fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => {
            error!("Failed to parse value, expected a string, got: {other}, ignoring");
            Ok(None)
        }
    }
}

pub fn deserialize_optional_bool_from_anything<'de, D>(
    deserializer: D,
) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Value> = Option::deserialize(deserializer)?;

    match opt {
        None => Ok(None),
        Some(value) => match deserialize_bool_from_anything(value) {
            Ok(bool_result) => Ok(Some(bool_result)),
            Err(e) => {
                error!("Failed to parse bool value: {e}, ignoring");
                Ok(None)
            }
        },
    }
}
