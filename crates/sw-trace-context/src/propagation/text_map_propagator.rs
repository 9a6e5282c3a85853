// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Text map propagators for the W3C `traceparent` and the SolarWinds `tracestate` entry.
//!
//! # W3C TraceContext Format
//!
//! The `TraceContextPropagator` reads and writes the standard headers:
//! - **`traceparent`**: version, trace ID, span ID and flags
//! - **`tracestate`**: ordered vendor entries, copied verbatim
//!
//! # SolarWinds Entry
//!
//! The `SolarWindsPropagator` only ever touches the `sw` member of `tracestate`. On injection
//! it writes `sw={span id}-{flags}` of the current span and moves it to the front, leaving
//! every other vendor's member where it was:
//!
//! ```text
//! traceparent: 00-11112222333344445555666677778888-2000200020002000-01
//! tracestate:  sw=2000200020002000-01,vendor1=foo,vendor2=bar
//! ```
//!
//! It must run after the `TraceContextPropagator`, which writes the raw `tracestate` first;
//! [`CompositePropagator::new`](super::CompositePropagator::new) enforces that order.

use tracing::{debug, error};

use crate::codec;
use crate::context::SpanContext;
use crate::propagation::{
    carrier::{Extractor, Injector},
    error::Error,
    Propagator,
};

pub const TRACEPARENT_KEY: &str = "traceparent";
pub const TRACESTATE_KEY: &str = "tracestate";
/// Trigger-trace request options sent by clients.
pub const X_TRACE_OPTIONS_KEY: &str = "x-trace-options";
/// HMAC signature of [`X_TRACE_OPTIONS_KEY`], validated by the decision oracle.
pub const X_TRACE_OPTIONS_SIGNATURE_KEY: &str = "x-trace-options-signature";
/// The `tracestate` member owned by this crate.
pub const SW_KEY: &str = "sw";

/// W3C TraceContext propagator.
///
/// Extraction parses `traceparent` with the codec and only then reads `tracestate`: a
/// `tracestate` without a valid `traceparent` is discarded, as W3C requires.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceContextPropagator;

impl Propagator for TraceContextPropagator {
    fn extract(&self, carrier: &dyn Extractor) -> Option<SpanContext> {
        Self::extract_context(carrier)
    }

    fn inject(&self, context: &SpanContext, carrier: &mut dyn Injector) {
        if let Err(e) = Self::inject_context(context, carrier) {
            debug!("{e}");
        }
    }

    fn fields(&self) -> &'static [&'static str] {
        &[TRACEPARENT_KEY, TRACESTATE_KEY]
    }
}

impl TraceContextPropagator {
    fn extract_context(carrier: &dyn Extractor) -> Option<SpanContext> {
        let traceparent = carrier.get(TRACEPARENT_KEY)?;

        let mut context = codec::parse_traceparent(traceparent);
        if !context.is_valid() {
            return None;
        }

        if let Some(tracestate) = carrier.get(TRACESTATE_KEY) {
            context.trace_state = codec::parse_tracestate(tracestate);
        } else {
            debug!("No tracestate found alongside traceparent");
        }

        Some(context)
    }

    fn inject_context(context: &SpanContext, carrier: &mut dyn Injector) -> Result<(), Error> {
        if !context.is_valid() {
            return Err(Error::inject("invalid span context", "traceparent"));
        }

        carrier.set(TRACEPARENT_KEY, codec::format_traceparent(context));
        if !context.trace_state.is_empty() {
            carrier.set(TRACESTATE_KEY, codec::format_tracestate(&context.trace_state));
        }

        Ok(())
    }
}

/// Injects the `sw` member of `tracestate` for outbound requests.
#[derive(Clone, Copy, Debug, Default)]
pub struct SolarWindsPropagator;

impl Propagator for SolarWindsPropagator {
    /// Extraction is handled entirely by [`TraceContextPropagator`].
    fn extract(&self, _carrier: &dyn Extractor) -> Option<SpanContext> {
        None
    }

    fn inject(&self, context: &SpanContext, carrier: &mut dyn Injector) {
        if !context.is_valid() {
            error!("{}", Error::inject("invalid span context", "solarwinds"));
            return;
        }

        let sw = codec::sw_value(context.span_id, context.trace_flags);
        if context.trace_state.contains_key(SW_KEY) {
            debug!("Updating tracestate with sw={sw}");
        } else if context.trace_state.is_empty() {
            debug!("Creating tracestate with sw={sw}");
        } else {
            debug!("Adding sw={sw} to tracestate");
        }

        let trace_state = codec::update_or_insert(&context.trace_state, SW_KEY, &sw);
        carrier.set(TRACESTATE_KEY, codec::format_tracestate(&trace_state));
    }

    fn fields(&self) -> &'static [&'static str] {
        &[TRACEPARENT_KEY, TRACESTATE_KEY]
    }
}
