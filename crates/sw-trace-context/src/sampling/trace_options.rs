// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trigger-trace request options.
//!
//! Clients ask for a trace to be started with the `x-trace-options` header, optionally signed
//! with `x-trace-options-signature`:
//!
//! ```text
//! x-trace-options: trigger-trace;custom-from=lin;foo=bar;sw-keys=custom-sw-from:tammy;ts=1689784543
//! ```
//!
//! Options are separated by `;`, each option is split on its first `=`. Unknown keys and
//! malformed values are collected as *ignored* and reported back to the client.
//!
//! The outcome is reported in two encodings of the same `{auth, trigger-trace, ignored}`
//! triple:
//!
//! ```text
//! tracestate member:  xtrace_options_response=auth####ok;trigger-trace####ok;ignored####foo....bar
//! response header:    x-trace-options-response: auth=ok;trigger-trace=ok;ignored=foo,bar
//! ```
//!
//! The signature itself is opaque here; the decision oracle validates it and reports the
//! result through [`DecisionRecord::trigger_auth_msg`].

use std::collections::BTreeMap;

use tracing::debug;

use crate::propagation::carrier::Extractor;
use crate::propagation::text_map_propagator::{X_TRACE_OPTIONS_KEY, X_TRACE_OPTIONS_SIGNATURE_KEY};
use crate::sampling::oracle::DecisionRecord;
use crate::trace_state;

/// `tracestate` member carrying the trigger-trace response.
pub const XTRACE_OPTIONS_RESPONSE_KEY: &str = "xtrace_options_response";

const TRIGGER_TRACE_KEY: &str = "trigger-trace";
const SW_KEYS_KEY: &str = "sw-keys";
const CUSTOM_KEY_PREFIX: &str = "custom-";
const TIMESTAMP_KEY: &str = "ts";
const AUTH_KEY: &str = "auth";
const IGNORED_KEY: &str = "ignored";
const NOT_REQUESTED: &str = "not-requested";
const AUTH_OK: &str = "ok";

const TRACESTATE_KV_DELIMITER: &str = "####";
const TRACESTATE_LIST_DELIMITER: &str = "....";
const HEADER_KV_DELIMITER: &str = "=";
const HEADER_LIST_DELIMITER: &str = ",";
const ENTRY_DELIMITER: &str = ";";

/// Parsed `x-trace-options` header, borrowing from the inbound carrier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XTraceOptions<'a> {
    /// Raw header value, needed verbatim for signature validation.
    pub options: &'a str,
    pub signature: Option<&'a str>,
    pub trigger_trace: bool,
    pub sw_keys: Option<&'a str>,
    pub custom_kvs: BTreeMap<&'a str, &'a str>,
    pub timestamp: Option<i64>,
    /// Option keys that were not understood, in header order.
    pub ignored: Vec<&'a str>,
}

impl<'a> XTraceOptions<'a> {
    #[must_use]
    pub fn parse(options: &'a str, signature: Option<&'a str>) -> Self {
        let mut parsed = Self {
            options,
            signature,
            ..Self::default()
        };

        for option in options.split(';') {
            let (key, value) = match option.split_once('=') {
                Some((key, value)) => (key.trim(), Some(value.trim())),
                None => (option.trim(), None),
            };
            if key.is_empty() {
                continue;
            }

            match (key, value) {
                (TRIGGER_TRACE_KEY, None) => parsed.trigger_trace = true,
                (TRIGGER_TRACE_KEY, Some(_)) => {
                    debug!("trigger-trace must be a standalone flag, ignoring");
                    parsed.ignored.push(key);
                }
                (SW_KEYS_KEY, Some(value)) => parsed.sw_keys = Some(value),
                (TIMESTAMP_KEY, Some(value)) => match value.parse::<i64>() {
                    Ok(ts) => parsed.timestamp = Some(ts),
                    Err(_) => {
                        debug!("Invalid x-trace-options timestamp {value:?}, ignoring");
                        parsed.ignored.push(key);
                    }
                },
                (key, Some(value)) if is_custom_key(key) => {
                    parsed.custom_kvs.insert(key, value);
                }
                (key, _) => {
                    debug!("Ignoring unknown x-trace-options key {key:?}");
                    parsed.ignored.push(key);
                }
            }
        }

        parsed
    }

    /// Reads `x-trace-options` and its signature; `None` when the options header is absent.
    #[must_use]
    pub fn from_carrier(carrier: &'a dyn Extractor) -> Option<Self> {
        let options = carrier.get(X_TRACE_OPTIONS_KEY)?;
        Some(Self::parse(
            options,
            carrier.get(X_TRACE_OPTIONS_SIGNATURE_KEY),
        ))
    }
}

/// Request-scoped inputs of a sampling decision, read from the inbound carrier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InboundRequest<'a> {
    /// `None` when the request carried no `x-trace-options` header.
    pub trace_options: Option<XTraceOptions<'a>>,
}

impl<'a> InboundRequest<'a> {
    /// A request without trigger-trace options, e.g. a span started outside any request.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_carrier(carrier: &'a dyn Extractor) -> Self {
        Self {
            trace_options: XTraceOptions::from_carrier(carrier),
        }
    }
}

fn is_custom_key(key: &str) -> bool {
    key.len() > CUSTOM_KEY_PREFIX.len()
        && key.starts_with(CUSTOM_KEY_PREFIX)
        && !key.contains(char::is_whitespace)
}

/// Outcome of a trigger-trace request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XTraceOptionsResponse {
    pub auth: Option<String>,
    pub trigger_trace: Option<String>,
    pub ignored: Vec<String>,
}

impl XTraceOptionsResponse {
    /// Combines the request with the oracle's verdict.
    ///
    /// `auth` is reported only for signed requests. `trigger-trace` is left out when a
    /// signature was supplied and did not authenticate.
    #[must_use]
    pub fn new(options: &XTraceOptions<'_>, record: &DecisionRecord) -> Self {
        let auth = options
            .signature
            .map(|_| record.trigger_auth_msg.clone());

        let trigger_trace = match &auth {
            Some(auth) if auth != AUTH_OK => None,
            _ if options.trigger_trace => Some(record.trigger_response_msg.clone()),
            _ => Some(NOT_REQUESTED.to_string()),
        };

        Self {
            auth,
            trigger_trace,
            ignored: options.ignored.iter().map(ToString::to_string).collect(),
        }
    }

    /// `auth####ok;trigger-trace####ok;ignored####foo....bar`
    #[must_use]
    pub fn to_tracestate_value(&self) -> String {
        self.encode(TRACESTATE_KV_DELIMITER, TRACESTATE_LIST_DELIMITER)
    }

    /// `auth=ok;trigger-trace=ok;ignored=foo,bar`
    #[must_use]
    pub fn to_header_value(&self) -> String {
        self.encode(HEADER_KV_DELIMITER, HEADER_LIST_DELIMITER)
    }

    /// Whether the response can travel as a `tracestate` member and still convert to the
    /// exact header encoding. Ignored keys containing `####`, `....` or `,` cannot.
    #[must_use]
    pub fn fits_tracestate(&self) -> bool {
        let value = self.to_tracestate_value();
        trace_state::is_valid_value(&value)
            && tracestate_value_to_header(&value) == self.to_header_value()
    }

    fn encode(&self, kv_delimiter: &str, list_delimiter: &str) -> String {
        let mut entries = Vec::with_capacity(3);
        if let Some(auth) = &self.auth {
            entries.push(format!("{AUTH_KEY}{kv_delimiter}{auth}"));
        }
        if let Some(trigger_trace) = &self.trigger_trace {
            entries.push(format!("{TRIGGER_TRACE_KEY}{kv_delimiter}{trigger_trace}"));
        }
        if !self.ignored.is_empty() {
            entries.push(format!(
                "{IGNORED_KEY}{kv_delimiter}{}",
                self.ignored.join(list_delimiter)
            ));
        }
        entries.join(ENTRY_DELIMITER)
    }
}

/// Converts the `tracestate` encoding of a response into the header encoding.
#[must_use]
pub fn tracestate_value_to_header(value: &str) -> String {
    value
        .replace(TRACESTATE_KV_DELIMITER, HEADER_KV_DELIMITER)
        .replace(TRACESTATE_LIST_DELIMITER, HEADER_LIST_DELIMITER)
}
