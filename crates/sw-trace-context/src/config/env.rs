// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Environment variable source: `SW_APM_*` and the standard `OTEL_PROPAGATORS`.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `SW_APM_AGENT_ENABLED` | `agent_enabled` |
//! | `SW_APM_SERVICE_KEY` | `service_key` |
//! | `SW_APM_TRACING_MODE` | `tracing_mode` |
//! | `SW_APM_TRIGGER_TRACE` | `trigger_trace` |
//! | `SW_APM_LOG_LEVEL` | `log_level` |
//! | `SW_APM_TRANSACTION_NAME` | `transaction_name` |
//! | `OTEL_PROPAGATORS` | `propagators` |

use figment::{providers::Env, Figment};
use serde::Deserialize;

use crate::{
    config::{
        deserialize_optional_bool_from_anything, deserialize_optional_string,
        log_level::LogLevel,
        propagation_style::{deserialize_propagation_styles, PropagationStyle},
        tracing_mode::{deserialize_tracing_mode, TracingMode, TriggerTraceMode},
        Config, ConfigError, ConfigSource,
    },
    merge_option, merge_option_to_value,
};

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfig {
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
    #[serde(deserialize_with = "deserialize_propagation_styles")]
    pub otel_propagators: Option<Vec<PropagationStyle>>,
}

fn merge_config(config: &mut Config, env_config: &EnvConfig) {
    merge_option_to_value!(config, env_config, agent_enabled);
    merge_option!(config, env_config, service_key);
    merge_option!(config, env_config, tracing_mode);
    merge_option_to_value!(config, env_config, trigger_trace);
    merge_option_to_value!(config, env_config, log_level);
    merge_option!(config, env_config, transaction_name);
    merge_option_to_value!(config, propagators, env_config, otel_propagators);
}

#[derive(Debug, PartialEq, Clone, Copy)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new()
            .merge(Env::prefixed("SW_APM_"))
            .merge(Env::raw().only(&["OTEL_PROPAGATORS"]));

        match figment.extract::<EnvConfig>() {
            Ok(env_config) => merge_config(config, &env_config),
            Err(e) => {
                return Err(ConfigError::ParseError(format!(
                    "Failed to parse config from environment variables: {e}, using default config."
                )));
            }
        }

        Ok(())
    }
}
