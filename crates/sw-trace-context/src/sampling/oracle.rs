// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Contract with the external decision oracle.
//!
//! The oracle owns rate limiting, token buckets and the backend-provided settings. This
//! crate only hands it the inbound context and reads back a fixed-shape [`DecisionRecord`].
//! Records are produced fresh for every call and never cached.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::config::tracing_mode::{TracingMode, TriggerTraceMode};
use crate::sampling::trace_options::XTraceOptions;

/// Highest sample rate the oracle reports, in parts per million.
pub const MAX_SAMPLE_RATE: i32 = 1_000_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The call itself failed or was cancelled.
    #[error("decision oracle unavailable: {0}")]
    Unavailable(String),
    #[error("decision record field `{field}` out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
}

/// Inputs of one decision.
#[derive(Clone, Debug, Default)]
pub struct DecisionRequest<'a> {
    /// Formatted `traceparent` of the parent; `None` for a root span.
    pub traceparent: Option<String>,
    /// Value of the parent's `sw` tracestate member.
    pub sw_value: Option<&'a str>,
    pub trace_options: Option<&'a XTraceOptions<'a>>,
    pub tracing_mode: Option<TracingMode>,
    pub trigger_trace: TriggerTraceMode,
}

/// Verdict returned by the oracle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecisionRecord {
    pub do_metrics: bool,
    pub do_sample: bool,
    /// Parts per million, `-1` when unknown.
    pub sample_rate: i32,
    pub sample_source: i32,
    pub bucket_rate: f64,
    pub bucket_capacity: f64,
    pub trigger_compatible: i32,
    pub trigger_requested: i32,
    /// `ok` when the trigger-trace signature was accepted.
    pub trigger_auth_msg: String,
    pub trigger_response_msg: String,
    pub status: i32,
}

impl DecisionRecord {
    /// # Errors
    ///
    /// Returns [`OracleError::OutOfRange`] for the first field outside its domain.
    pub fn validate(&self) -> Result<(), OracleError> {
        let out_of_range = |field: &'static str, value: &dyn fmt::Display| {
            Err(OracleError::OutOfRange {
                field,
                value: value.to_string(),
            })
        };

        if !(-1..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return out_of_range("sample_rate", &self.sample_rate);
        }
        if !self.bucket_rate.is_finite() {
            return out_of_range("bucket_rate", &self.bucket_rate);
        }
        if !self.bucket_capacity.is_finite() {
            return out_of_range("bucket_capacity", &self.bucket_capacity);
        }
        if !(-1..=1).contains(&self.trigger_compatible) {
            return out_of_range("trigger_compatible", &self.trigger_compatible);
        }
        if !(-1..=1).contains(&self.trigger_requested) {
            return out_of_range("trigger_requested", &self.trigger_requested);
        }

        Ok(())
    }

    #[must_use]
    pub fn status(&self) -> DecisionStatus {
        DecisionStatus::from(self.status)
    }
}

/// Known `status` codes of a [`DecisionRecord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecisionStatus {
    Ok,
    NullOut,
    NoConfig,
    ReporterNotReady,
    NoValidSettings,
    QueueFull,
    Unknown(i32),
}

impl From<i32> for DecisionStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => DecisionStatus::Ok,
            -1 => DecisionStatus::NullOut,
            -2 => DecisionStatus::NoConfig,
            -3 => DecisionStatus::ReporterNotReady,
            -4 => DecisionStatus::NoValidSettings,
            -5 => DecisionStatus::QueueFull,
            other => {
                warn!("Unknown decision status code {other}");
                DecisionStatus::Unknown(other)
            }
        }
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionStatus::Ok => write!(f, "ok"),
            DecisionStatus::NullOut => write!(f, "null out"),
            DecisionStatus::NoConfig => write!(f, "no config"),
            DecisionStatus::ReporterNotReady => write!(f, "reporter not ready"),
            DecisionStatus::NoValidSettings => write!(f, "no valid settings"),
            DecisionStatus::QueueFull => write!(f, "queue full"),
            DecisionStatus::Unknown(code) => write!(f, "unknown status {code}"),
        }
    }
}

/// Readiness codes reported by [`DecisionOracle::is_ready`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ReadyCode {
    Unknown = 0,
    Ok = 1,
    TryLater = 2,
    LimitExceeded = 3,
    InvalidApiKey = 4,
    ConnectError = 5,
}

impl ReadyCode {
    #[must_use]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ReadyCode::Unknown),
            1 => Some(ReadyCode::Ok),
            2 => Some(ReadyCode::TryLater),
            3 => Some(ReadyCode::LimitExceeded),
            4 => Some(ReadyCode::InvalidApiKey),
            5 => Some(ReadyCode::ConnectError),
            _ => None,
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            ReadyCode::Unknown => "server response unknown",
            ReadyCode::Ok => "server ready",
            ReadyCode::TryLater => "server responded with try later",
            ReadyCode::LimitExceeded => "server responded with limit exceeded",
            ReadyCode::InvalidApiKey => "server responded with invalid API key",
            ReadyCode::ConnectError => "error connecting to server",
        }
    }
}

/// The external sampling decision source.
pub trait DecisionOracle {
    /// Computes a fresh decision.
    ///
    /// # Errors
    ///
    /// Any error, including a cancelled call, makes the caller drop the span.
    fn decide(&self, request: &DecisionRequest<'_>) -> Result<DecisionRecord, OracleError>;

    /// Blocks for up to `wait` until the oracle has settings, returning a raw
    /// [`ReadyCode`] value.
    fn is_ready(&self, _wait: Duration) -> i32 {
        ReadyCode::Ok as i32
    }
}

/// Oracle used when the agent is disabled: never records, never samples.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopOracle;

impl DecisionOracle for NoopOracle {
    fn decide(&self, _request: &DecisionRequest<'_>) -> Result<DecisionRecord, OracleError> {
        Ok(DecisionRecord {
            sample_rate: -1,
            sample_source: -1,
            trigger_compatible: -1,
            trigger_requested: -1,
            ..DecisionRecord::default()
        })
    }

    fn is_ready(&self, _wait: Duration) -> i32 {
        ReadyCode::Unknown as i32
    }
}
