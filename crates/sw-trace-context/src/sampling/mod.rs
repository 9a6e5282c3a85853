// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sampling decisions for new spans.
//!
//! # Components
//!
//! - [`oracle`]: the external decision oracle contract and its record type
//! - [`trace_options`]: `x-trace-options` parsing for trigger-trace requests
//! - [`engine`]: merges the oracle verdict with the parent context (root and remote parents)
//! - [`parent_based`]: chooses between the engine and plain inheritance from a local parent
//!
//! # Flow
//!
//! ```text
//! parent SpanContext + InboundRequest
//!   ↓
//! ParentKind::classify ──── LocalParent ──→ inherit decision and tracestate
//!   │ NoParent / RemoteParent
//!   ↓
//! SamplingEngine ──→ DecisionOracle::decide
//!   ↓
//! SamplingResult { decision, attributes, trace_state }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::sampling::oracle::DecisionRecord;

pub mod engine;
pub mod oracle;
pub mod parent_based;
pub mod trace_options;

/// Attribute holding the serialized `tracestate` seen by the entry span of a service.
pub const SW_W3C_TRACESTATE_KEY: &str = "sw.w3c.tracestate";
/// Attribute holding the formatted span id of the remote parent.
pub const SW_TRACESTATE_PARENT_ID_KEY: &str = "sw.tracestate_parent_id";

/// Outcome of a sampling decision, in increasing order of retention.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Decision {
    /// The span is neither recorded nor exported.
    Drop,
    /// The span is recorded for metrics but not sampled.
    RecordOnly,
    /// The span is recorded and the trace is sampled.
    RecordAndSample,
}

impl Decision {
    /// `do_sample` wins over `do_metrics`; neither flag means [`Decision::Drop`].
    #[must_use]
    pub fn from_record(record: &DecisionRecord) -> Self {
        if record.do_sample {
            Decision::RecordAndSample
        } else if record.do_metrics {
            Decision::RecordOnly
        } else {
            Decision::Drop
        }
    }

    #[must_use]
    pub fn is_recording(self) -> bool {
        !matches!(self, Decision::Drop)
    }

    #[must_use]
    pub fn is_sampled(self) -> bool {
        matches!(self, Decision::RecordAndSample)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    I64(i64),
    F64(f64),
}

impl AttributeValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::I64(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::F64(value)
    }
}

/// Immutable snapshot of span attributes.
///
/// Cloning is cheap and shares the underlying map. To derive a modified set, copy it out
/// with [`Attributes::to_map`] and build a new snapshot; the original is never changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attributes(Arc<BTreeMap<String, AttributeValue>>);

impl Attributes {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies the attributes into a new, owned map.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, AttributeValue> {
        self.0.as_ref().clone()
    }

    /// Whether both snapshots share the same underlying map.
    #[must_use]
    pub fn ptr_eq(&self, other: &Attributes) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<BTreeMap<String, AttributeValue>> for Attributes {
    fn from(map: BTreeMap<String, AttributeValue>) -> Self {
        Attributes(Arc::new(map))
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect::<BTreeMap<_, _>>()
            .into()
    }
}

/// Result handed to the tracer when a span is created.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingResult {
    pub decision: Decision,
    /// Attributes to set on the new span; always `None` for [`Decision::Drop`].
    pub attributes: Option<Attributes>,
    /// Trace state of the new span, used later for outbound propagation.
    pub trace_state: crate::trace_state::TraceState,
}
