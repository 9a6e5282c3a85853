// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON configuration file source.
//!
//! ```json
//! {
//!   "agentEnabled": true,
//!   "serviceKey": "<token>:my-service",
//!   "tracingMode": "enabled",
//!   "triggerTrace": "enabled",
//!   "logLevel": "info",
//!   "transactionName": "my-transaction"
//! }
//! ```
//!
//! A missing file is not an error; a malformed one is.

use std::path::PathBuf;

use figment::{
    providers::{Format, Json},
    Figment,
};
use serde::Deserialize;

use crate::{
    config::{
        deserialize_optional_bool_from_anything, deserialize_optional_string,
        log_level::LogLevel,
        tracing_mode::{deserialize_tracing_mode, TracingMode, TriggerTraceMode},
        Config, ConfigError, ConfigSource,
    },
    merge_option, merge_option_to_value,
};

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::module_name_repetitions)]
pub struct JsonConfig {
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub agent_enabled: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub service_key: Option<String>,
    #[serde(deserialize_with = "deserialize_tracing_mode")]
    pub tracing_mode: Option<TracingMode>,
    pub trigger_trace: Option<TriggerTraceMode>,
    pub log_level: Option<LogLevel>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub transaction_name: Option<String>,
}

fn merge_config(config: &mut Config, json_config: &JsonConfig) {
    merge_option_to_value!(config, json_config, agent_enabled);
    merge_option!(config, json_config, service_key);
    merge_option!(config, json_config, tracing_mode);
    merge_option_to_value!(config, json_config, trigger_trace);
    merge_option_to_value!(config, json_config, log_level);
    merge_option!(config, json_config, transaction_name);
}

#[derive(Debug, PartialEq, Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct JsonConfigSource {
    pub path: PathBuf,
}

impl ConfigSource for JsonConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Json::file(self.path.clone()));

        match figment.extract::<JsonConfig>() {
            Ok(json_config) => merge_config(config, &json_config),
            Err(e) => {
                return Err(ConfigError::ParseError(format!(
                    "Failed to parse config from json file: {e}, using default config."
                )));
            }
        }

        Ok(())
    }
}
