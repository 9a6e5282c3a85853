// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Span context structures carried across service boundaries.
//!
//! A [`SpanContext`] is the immutable identity of one span as seen by propagation and
//! sampling:
//! - **`trace_id`**: 128-bit identifier shared by every span of a distributed trace
//! - **`span_id`**: 64-bit identifier of this span
//! - **`trace_flags`**: W3C flags byte, bit 0 is the sampled bit
//! - **`trace_state`**: vendor entries from the `tracestate` header
//! - **`is_remote`**: whether the context was extracted from an inbound carrier
//!
//! # Lifecycle
//!
//! ```text
//! Inbound headers
//!   ↓
//! parse_traceparent / parse_tracestate  (remote SpanContext, or invalid sentinel)
//!   ↓
//! ParentBasedSampler                    (SamplingResult)
//!   ↓
//! SpanContext::from_sampling            (local SpanContext of the new span)
//!   ↓
//! SolarWindsPropagator::inject          (outbound tracestate)
//! ```
//!
//! Contexts are never mutated after creation; a new one is built for each span.

use std::fmt;

use crate::sampling::{Decision, SamplingResult};
use crate::trace_state::TraceState;

/// W3C trace flags byte.
///
/// Only bit 0 (`sampled`) has a defined meaning; other bits are carried through
/// untouched so that formatting an extracted context reproduces the inbound byte.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0x00);
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    #[must_use]
    pub const fn new(flags: u8) -> Self {
        TraceFlags(flags)
    }

    #[must_use]
    pub const fn is_sampled(self) -> bool {
        self.0 & Self::SAMPLED.0 == Self::SAMPLED.0
    }

    /// Returns a copy with the sampled bit set or cleared.
    #[must_use]
    pub const fn with_sampled(self, sampled: bool) -> Self {
        if sampled {
            TraceFlags(self.0 | Self::SAMPLED.0)
        } else {
            TraceFlags(self.0 & !Self::SAMPLED.0)
        }
    }

    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self.0
    }
}

impl From<bool> for TraceFlags {
    fn from(sampled: bool) -> Self {
        TraceFlags::NOT_SAMPLED.with_sampled(sampled)
    }
}

impl fmt::LowerHex for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// Distributed trace context of a single span.
///
/// # Validity
///
/// A context is valid only when both `trace_id` and `span_id` are non-zero. Header parsing
/// never fails loudly: malformed input produces [`SpanContext::invalid`], which the sampler
/// treats as "no parent".
///
/// # Example
///
/// ```
/// use sw_trace_context::context::{SpanContext, TraceFlags};
/// use sw_trace_context::trace_state::TraceState;
///
/// let context = SpanContext {
///     trace_id: 0x1111_2222_3333_4444_5555_6666_7777_8888,
///     span_id: 0x1000_1000_1000_1000,
///     trace_flags: TraceFlags::SAMPLED,
///     trace_state: TraceState::default(),
///     is_remote: true,
/// };
/// assert!(context.is_valid());
/// assert!(!SpanContext::invalid().is_valid());
/// ```
#[derive(Clone, Default, Debug, PartialEq, Eq)]
#[allow(clippy::module_name_repetitions)]
pub struct SpanContext {
    /// 128-bit trace identifier, zero for the invalid context.
    pub trace_id: u128,
    /// 64-bit span identifier, zero for the invalid context.
    pub span_id: u64,
    pub trace_flags: TraceFlags,
    /// Ordered vendor entries propagated through `tracestate`.
    pub trace_state: TraceState,
    /// `true` when the context was extracted from an inbound carrier.
    pub is_remote: bool,
}

impl SpanContext {
    /// The sentinel returned for missing or malformed `traceparent` headers.
    #[must_use]
    pub fn invalid() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.trace_id != 0 && self.span_id != 0
    }

    #[must_use]
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }

    /// Builds the local context of a span created from a sampling result.
    ///
    /// Identifier generation belongs to the tracer; this only combines the ids it minted
    /// with the sampling outcome. The sampled bit is set exactly when the decision is
    /// [`Decision::RecordAndSample`].
    #[must_use]
    pub fn from_sampling(trace_id: u128, span_id: u64, result: &SamplingResult) -> Self {
        Self {
            trace_id,
            span_id,
            trace_flags: TraceFlags::from(result.decision == Decision::RecordAndSample),
            trace_state: result.trace_state.clone(),
            is_remote: false,
        }
    }
}
