// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace headers written on the response to an inbound request.
//!
//! ```text
//! x-trace:                       00-11112222333344445555666677778888-2000200020002000-01
//! x-trace-options-response:      auth=ok;trigger-trace=ok;ignored=foo
//! Access-Control-Expose-Headers: x-trace,x-trace-options-response
//! ```
//!
//! The trigger-trace response travels from the sampler to here inside the span's
//! `tracestate`, as the `xtrace_options_response` member.

use tracing::debug;

use crate::codec;
use crate::context::SpanContext;
use crate::propagation::{carrier::Injector, error::Error};
use crate::sampling::trace_options::{tracestate_value_to_header, XTRACE_OPTIONS_RESPONSE_KEY};

/// Traceparent of the span that served the request.
pub const X_TRACE_KEY: &str = "x-trace";
pub const X_TRACE_OPTIONS_RESPONSE_KEY: &str = "x-trace-options-response";
pub const ACCESS_CONTROL_EXPOSE_HEADERS_KEY: &str = "Access-Control-Expose-Headers";

#[derive(Clone, Copy, Debug, Default)]
pub struct ResponsePropagator;

impl ResponsePropagator {
    /// Writes the response headers for the entry span `context`.
    ///
    /// Nothing is written for an invalid context.
    pub fn inject(&self, context: &SpanContext, carrier: &mut dyn Injector) {
        if !context.is_valid() {
            debug!("{}", Error::inject("invalid span context", "response"));
            return;
        }

        let mut exposed = vec![X_TRACE_KEY];
        carrier.set(X_TRACE_KEY, codec::format_traceparent(context));

        if let Some(value) = context.trace_state.get(XTRACE_OPTIONS_RESPONSE_KEY) {
            carrier.set(
                X_TRACE_OPTIONS_RESPONSE_KEY,
                tracestate_value_to_header(value),
            );
            exposed.push(X_TRACE_OPTIONS_RESPONSE_KEY);
        }

        carrier.set(ACCESS_CONTROL_EXPOSE_HEADERS_KEY, exposed.join(","));
    }

    #[must_use]
    pub fn fields(&self) -> &'static [&'static str] {
        &[
            X_TRACE_KEY,
            X_TRACE_OPTIONS_RESPONSE_KEY,
            ACCESS_CONTROL_EXPOSE_HEADERS_KEY,
        ]
    }
}
