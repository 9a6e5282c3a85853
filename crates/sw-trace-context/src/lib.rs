// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # sw-trace-context
//!
//! W3C trace context propagation and sampling decisions for services reporting to a
//! SolarWinds-style backend, which owns the `sw` member of `tracestate`.
//!
//! ## Overview
//!
//! For every span the crate:
//! - parses the inbound `traceparent` / `tracestate` headers into a remote [`SpanContext`]
//! - asks an external [`DecisionOracle`] whether the span is recorded and sampled, merging
//!   the verdict with the parent's state
//! - rewrites `tracestate` so that `sw={span id}-{flags}` leads the list and every other
//!   vendor's member is kept in order
//!
//! ## Modules
//!
//! - [`codec`] and [`trace_state`]: header parsing and formatting
//! - [`context`]: span context and trace flags
//! - [`sampling`]: sampling engine, parent-based dispatch, the oracle contract
//! - [`propagation`]: extraction and injection through header carriers
//! - [`config`]: JSON file and environment configuration
//! - [`api`]: readiness check and transaction names
//! - [`logger`]: log formatting and subscriber setup
//!
//! Everything runs synchronously on the caller's stack; the only shared state is the oracle
//! handle.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_copy_implementations)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod codec;
pub mod config;
pub mod context;
pub mod logger;
pub mod propagation;
pub mod sampling;
pub mod trace_state;

pub use context::{SpanContext, TraceFlags};
pub use propagation::{CompositePropagator, Propagator};
pub use sampling::{
    oracle::{DecisionOracle, DecisionRecord, DecisionRequest},
    parent_based::{ParentBasedSampler, ParentSpan},
    trace_options::InboundRequest,
    Attributes, Decision, SamplingResult,
};
pub use trace_state::TraceState;
