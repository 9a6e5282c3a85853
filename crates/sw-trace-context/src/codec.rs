// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parsing and formatting of the W3C `traceparent` and `tracestate` headers.
//!
//! # Header Formats
//!
//! ```text
//! traceparent: 00-11112222333344445555666677778888-1000100010001000-01
//!              │  │                                │                └ flags (bit 0 = sampled)
//!              │  │                                └ span id (16 hex)
//!              │  └ trace id (32 hex)
//!              └ version
//! tracestate:  sw=1000100010001000-01,vendor1=foo
//! ```
//!
//! # Soft Failure
//!
//! Nothing in this module returns an error to the caller. A malformed `traceparent` yields
//! [`SpanContext::invalid`] and malformed `tracestate` members are dropped, so a broken
//! upstream header can never break the local request: the sampler simply treats the
//! request as having no parent.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use crate::context::{SpanContext, TraceFlags};
use crate::propagation::error::Error;
use crate::trace_state::TraceState;

/// The only `traceparent` version this crate emits.
pub const TRACEPARENT_VERSION: &str = "00";

lazy_static! {
    /// `version-traceId-spanId-flags[-extension]`, surrounded by optional blanks.
    static ref TRACEPARENT_REGEX: Regex = Regex::new(
        r"(?i)^[ \t]*([0-9a-f]{2})-([0-9a-f]{32})-([0-9a-f]{16})-([0-9a-f]{2})(-.*)?[ \t]*$"
    )
    .expect("failed creating regex");

    /// Detects the invalid all-zero trace and span ids.
    static ref INVALID_SEGMENT_REGEX: Regex = Regex::new(r"^0+$").expect("failed creating regex");
}

/// Parses a `traceparent` header into a remote [`SpanContext`].
///
/// Returns [`SpanContext::invalid`] when the header does not match the grammar, carries an
/// all-zero id, uses the forbidden version `ff`, or uses version `00` with trailing fields.
/// The returned context has an empty trace state; `tracestate` is parsed separately.
#[must_use]
pub fn parse_traceparent(header: &str) -> SpanContext {
    match extract_traceparent(header) {
        Ok(context) => context,
        Err(e) => {
            debug!("{e}: {header:?}");
            SpanContext::invalid()
        }
    }
}

fn extract_traceparent(header: &str) -> Result<SpanContext, Error> {
    let captures = TRACEPARENT_REGEX
        .captures(header)
        .ok_or_else(|| Error::extract("invalid traceparent", "traceparent"))?;

    let version = captures[1].to_ascii_lowercase();
    let trace_id = &captures[2];
    let span_id = &captures[3];
    let flags = &captures[4];
    let tail = captures.get(5).map_or("", |m| m.as_str());

    extract_version(&version, tail)?;

    Ok(SpanContext {
        trace_id: extract_trace_id(trace_id)?,
        span_id: extract_span_id(span_id)?,
        trace_flags: extract_trace_flags(flags)?,
        trace_state: TraceState::default(),
        is_remote: true,
    })
}

fn extract_version(version: &str, tail: &str) -> Result<(), Error> {
    match version {
        "ff" => Err(Error::extract(
            "`ff` is an invalid traceparent version",
            "traceparent",
        )),
        "00" if !tail.is_empty() => Err(Error::extract(
            "traceparent with version `00` should contain only 4 values delimited by `-`",
            "traceparent",
        )),
        "00" => Ok(()),
        _ => {
            warn!("Unsupported traceparent version {version}, still attempting to parse");
            Ok(())
        }
    }
}

fn extract_trace_id(trace_id: &str) -> Result<u128, Error> {
    if INVALID_SEGMENT_REGEX.is_match(trace_id) {
        return Err(Error::extract(
            "`0` value for trace_id is invalid",
            "traceparent",
        ));
    }

    u128::from_str_radix(trace_id, 16)
        .map_err(|_| Error::extract("failed to decode trace_id", "traceparent"))
}

fn extract_span_id(span_id: &str) -> Result<u64, Error> {
    if INVALID_SEGMENT_REGEX.is_match(span_id) {
        return Err(Error::extract(
            "`0` value for span_id is invalid",
            "traceparent",
        ));
    }

    u64::from_str_radix(span_id, 16)
        .map_err(|_| Error::extract("failed to decode span_id", "traceparent"))
}

fn extract_trace_flags(flags: &str) -> Result<TraceFlags, Error> {
    u8::from_str_radix(flags, 16)
        .map(TraceFlags::new)
        .map_err(|_| Error::extract("failed to decode trace_flags", "traceparent"))
}

/// Formats a context as a version `00` `traceparent` header in lowercase hex.
#[must_use]
pub fn format_traceparent(context: &SpanContext) -> String {
    format!(
        "{TRACEPARENT_VERSION}-{:032x}-{}-{}",
        context.trace_id,
        format_span_id(context.span_id),
        format_flags(context.trace_flags)
    )
}

/// Parses a `tracestate` header. See [`TraceState::from_header`].
#[must_use]
pub fn parse_tracestate(header: &str) -> TraceState {
    TraceState::from_header(header)
}

#[must_use]
pub fn format_tracestate(trace_state: &TraceState) -> String {
    trace_state.header()
}

/// Sets `key` to `value` and moves it to the front. See [`TraceState::update_or_insert`].
#[must_use]
pub fn update_or_insert(trace_state: &TraceState, key: &str, value: &str) -> TraceState {
    trace_state.update_or_insert(key, value)
}

/// 16 lowercase hex characters, zero padded.
#[must_use]
pub fn format_span_id(span_id: u64) -> String {
    format!("{span_id:016x}")
}

/// 2 lowercase hex characters, zero padded.
#[must_use]
pub fn format_flags(flags: TraceFlags) -> String {
    format!("{flags:02x}")
}

/// The `sw` tracestate value: `{span id}-{flags}`.
#[must_use]
pub fn sw_value(span_id: u64, flags: TraceFlags) -> String {
    format!("{}-{}", format_span_id(span_id), format_flags(flags))
}
