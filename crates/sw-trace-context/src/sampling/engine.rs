// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sampling decisions for root spans and spans with a remote parent.
//!
//! # Algorithm
//!
//! ```text
//! parent SpanContext ─┬─ traceparent (valid parent only)
//!                     └─ sw tracestate value
//!   ↓
//! DecisionOracle::decide ── Err / out of range ──→ Drop, parent tracestate without sw update
//!   ↓
//! Decision (do_sample ⇒ RecordAndSample, do_metrics ⇒ RecordOnly, else Drop)
//!   ↓
//! tracestate: sw={parent span id}-{new flags} at position 0,
//!             xtrace_options_response after it only when this request sent x-trace-options
//!   ↓
//! attributes: sw.w3c.tracestate, sw.tracestate_parent_id (remote parent with tracestate)
//! ```
//!
//! The engine holds no per-request state: every call is a function of its inputs and of the
//! oracle's answer.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::codec;
use crate::config::{
    tracing_mode::{TracingMode, TriggerTraceMode},
    Config,
};
use crate::context::{SpanContext, TraceFlags};
use crate::propagation::text_map_propagator::SW_KEY;
use crate::sampling::{
    oracle::{DecisionOracle, DecisionRecord, DecisionRequest, DecisionStatus},
    trace_options::{InboundRequest, XTraceOptionsResponse, XTRACE_OPTIONS_RESPONSE_KEY},
    AttributeValue, Attributes, Decision, SamplingResult, SW_TRACESTATE_PARENT_ID_KEY,
    SW_W3C_TRACESTATE_KEY,
};
use crate::trace_state::TraceState;

#[derive(Clone)]
pub struct SamplingEngine {
    oracle: Arc<dyn DecisionOracle + Send + Sync>,
    tracing_mode: Option<TracingMode>,
    trigger_trace: TriggerTraceMode,
}

impl SamplingEngine {
    #[must_use]
    pub fn new(oracle: Arc<dyn DecisionOracle + Send + Sync>) -> Self {
        Self {
            oracle,
            tracing_mode: None,
            trigger_trace: TriggerTraceMode::default(),
        }
    }

    #[must_use]
    pub fn from_config(oracle: Arc<dyn DecisionOracle + Send + Sync>, config: &Config) -> Self {
        Self {
            oracle,
            tracing_mode: config.tracing_mode,
            trigger_trace: config.trigger_trace,
        }
    }

    /// Decides for a span whose parent is `parent`, or the root of a new trace when `parent`
    /// is invalid.
    ///
    /// `attributes` are the caller's span attributes; they are never modified, the returned
    /// snapshot is a copy.
    #[must_use]
    pub fn should_sample(
        &self,
        parent: &SpanContext,
        inbound: &InboundRequest<'_>,
        attributes: Option<&Attributes>,
    ) -> SamplingResult {
        let parent_valid = parent.is_valid();
        let request = DecisionRequest {
            traceparent: parent_valid.then(|| codec::format_traceparent(parent)),
            sw_value: if parent_valid {
                parent.trace_state.get(SW_KEY)
            } else {
                None
            },
            trace_options: inbound.trace_options.as_ref(),
            tracing_mode: self.tracing_mode,
            trigger_trace: self.trigger_trace,
        };
        debug!(
            "Requesting sampling decision with traceparent {:?}, sw {:?}",
            request.traceparent, request.sw_value
        );

        let record = match self
            .oracle
            .decide(&request)
            .and_then(|record| record.validate().map(|()| record))
        {
            Ok(record) => record,
            Err(e) => {
                error!("Sampling decision failed, dropping span: {e}");
                return SamplingResult {
                    decision: Decision::Drop,
                    attributes: None,
                    trace_state: if parent_valid {
                        parent.trace_state.delete(XTRACE_OPTIONS_RESPONSE_KEY)
                    } else {
                        TraceState::default()
                    },
                };
            }
        };

        match record.status() {
            DecisionStatus::Ok | DecisionStatus::Unknown(_) => (),
            status => debug!("Decision oracle reported {status}"),
        }

        let decision = Decision::from_record(&record);
        debug!("Sampling decision: {decision:?}");

        let sw = codec::sw_value(parent.span_id, TraceFlags::from(decision.is_sampled()));
        // a response member from an upstream hop never describes this request
        let mut trace_state =
            Self::calculate_trace_state(parent, &sw).delete(XTRACE_OPTIONS_RESPONSE_KEY);
        if let Some(options) = &inbound.trace_options {
            trace_state = Self::add_trace_options_response(
                &trace_state,
                &XTraceOptionsResponse::new(options, &record),
            );
        }

        let attributes = Self::calculate_attributes(decision, parent, &sw, attributes);

        SamplingResult {
            decision,
            attributes,
            trace_state,
        }
    }

    fn calculate_trace_state(parent: &SpanContext, sw: &str) -> TraceState {
        if parent.is_valid() {
            codec::update_or_insert(&parent.trace_state, SW_KEY, sw)
        } else {
            TraceState::from_key_value([(SW_KEY, sw)])
        }
    }

    fn add_trace_options_response(
        trace_state: &TraceState,
        response: &XTraceOptionsResponse,
    ) -> TraceState {
        let value = response.to_tracestate_value();
        if !response.fits_tracestate() {
            warn!("Cannot carry x-trace-options response {value:?} in tracestate, skipping");
            return trace_state.clone();
        }
        trace_state.insert_after(SW_KEY, XTRACE_OPTIONS_RESPONSE_KEY, &value)
    }

    fn calculate_attributes(
        decision: Decision,
        parent: &SpanContext,
        sw: &str,
        attributes: Option<&Attributes>,
    ) -> Option<Attributes> {
        if decision == Decision::Drop {
            debug!("Trace decision is to drop, not setting attributes");
            return None;
        }
        if !parent.is_valid() || parent.trace_state.is_empty() {
            debug!("No valid traceparent or no tracestate, not setting attributes");
            return None;
        }

        let mut new_attributes = attributes.map(Attributes::to_map).unwrap_or_default();

        let w3c_tracestate = match new_attributes
            .get(SW_W3C_TRACESTATE_KEY)
            .and_then(AttributeValue::as_str)
        {
            Some(existing) => {
                codec::update_or_insert(&codec::parse_tracestate(existing), SW_KEY, sw)
            }
            None => codec::update_or_insert(&parent.trace_state, SW_KEY, sw),
        };
        new_attributes.insert(
            SW_W3C_TRACESTATE_KEY.to_string(),
            codec::format_tracestate(&w3c_tracestate).into(),
        );
        new_attributes.insert(
            SW_TRACESTATE_PARENT_ID_KEY.to_string(),
            codec::format_span_id(parent.span_id).into(),
        );

        Some(Attributes::from(new_attributes))
    }

    pub(crate) fn oracle(&self) -> &(dyn DecisionOracle + Send + Sync) {
        self.oracle.as_ref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use tracing_test::traced_test;

    use super::*;
    use crate::sampling::oracle::OracleError;
    use crate::sampling::trace_options::XTraceOptions;

    const TRACE_ID: u128 = 0x1111_2222_3333_4444_5555_6666_7777_8888;
    const PARENT_SPAN_ID: u64 = 0x1000_1000_1000_1000;

    /// Answers with a fixed record and remembers what it was asked.
    struct ScriptedOracle {
        answer: Result<DecisionRecord, OracleError>,
        requests: Mutex<Vec<(Option<String>, Option<String>)>>,
    }

    impl ScriptedOracle {
        fn new(answer: Result<DecisionRecord, OracleError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn sampled() -> Arc<Self> {
            Self::new(Ok(record(true, true)))
        }
    }

    impl DecisionOracle for ScriptedOracle {
        fn decide(&self, request: &DecisionRequest<'_>) -> Result<DecisionRecord, OracleError> {
            self.requests.lock().unwrap().push((
                request.traceparent.clone(),
                request.sw_value.map(ToString::to_string),
            ));
            self.answer.clone()
        }
    }

    fn record(do_metrics: bool, do_sample: bool) -> DecisionRecord {
        DecisionRecord {
            do_metrics,
            do_sample,
            ..DecisionRecord::default()
        }
    }

    fn remote_parent(flags: TraceFlags, trace_state: &str) -> SpanContext {
        SpanContext {
            trace_id: TRACE_ID,
            span_id: PARENT_SPAN_ID,
            trace_flags: flags,
            trace_state: TraceState::from_header(trace_state),
            is_remote: true,
        }
    }

    fn engine(oracle: Arc<ScriptedOracle>) -> SamplingEngine {
        SamplingEngine::new(oracle)
    }

    #[test]
    fn root_span_gets_fresh_sw_only() {
        let oracle = ScriptedOracle::sampled();
        let result = engine(oracle.clone()).should_sample(
            &SpanContext::invalid(),
            &InboundRequest::none(),
            None,
        );

        assert_eq!(result.decision, Decision::RecordAndSample);
        assert_eq!(result.trace_state.header(), "sw=0000000000000000-01");
        assert_eq!(result.attributes, None);
        assert_eq!(*oracle.requests.lock().unwrap(), vec![(None, None)]);
    }

    #[test]
    fn remote_parent_inputs_are_passed_to_oracle() {
        let oracle = ScriptedOracle::sampled();
        let parent = remote_parent(TraceFlags::SAMPLED, "sw=e000baa4e000baa4-01");

        let _ = engine(oracle.clone()).should_sample(&parent, &InboundRequest::none(), None);

        assert_eq!(
            *oracle.requests.lock().unwrap(),
            vec![(
                Some("00-11112222333344445555666677778888-1000100010001000-01".to_string()),
                Some("e000baa4e000baa4-01".to_string())
            )]
        );
    }

    #[test]
    fn decision_priority() {
        let parent = remote_parent(TraceFlags::SAMPLED, "sw=e000baa4e000baa4-01");
        let cases = [
            (record(true, true), Decision::RecordAndSample),
            (record(false, true), Decision::RecordAndSample),
            (record(true, false), Decision::RecordOnly),
            (record(false, false), Decision::Drop),
        ];

        for (answer, expected) in cases {
            let result = engine(ScriptedOracle::new(Ok(answer))).should_sample(
                &parent,
                &InboundRequest::none(),
                None,
            );
            assert_eq!(result.decision, expected);
            assert_eq!(result.attributes.is_some(), expected != Decision::Drop);
        }
    }

    #[test]
    fn foreign_vendors_are_preserved() {
        let parent = remote_parent(TraceFlags::SAMPLED, "vendor1=foo,vendor2=bar");
        let result = engine(ScriptedOracle::sampled()).should_sample(
            &parent,
            &InboundRequest::none(),
            None,
        );

        assert_eq!(
            result.trace_state.header(),
            "sw=1000100010001000-01,vendor1=foo,vendor2=bar"
        );
    }

    #[test]
    fn existing_sw_is_replaced_and_moved_to_front() {
        let parent = remote_parent(
            TraceFlags::SAMPLED,
            "vendor1=foo,sw=e000baa4e000baa4-01,vendor2=bar",
        );
        let result = engine(ScriptedOracle::new(Ok(record(true, false)))).should_sample(
            &parent,
            &InboundRequest::none(),
            None,
        );

        assert_eq!(
            result.trace_state.header(),
            "sw=1000100010001000-00,vendor1=foo,vendor2=bar"
        );
    }

    #[test]
    fn attributes_are_set_for_remote_parent_with_tracestate() {
        let parent = remote_parent(TraceFlags::SAMPLED, "sw=e000baa4e000baa4-01,vendor1=foo");
        let caller: Attributes = [("http.method", "GET")].into_iter().collect();

        let result = engine(ScriptedOracle::sampled()).should_sample(
            &parent,
            &InboundRequest::none(),
            Some(&caller),
        );
        let attributes = result.attributes.unwrap();

        assert_eq!(
            attributes
                .get(SW_W3C_TRACESTATE_KEY)
                .and_then(AttributeValue::as_str),
            Some("sw=1000100010001000-01,vendor1=foo")
        );
        assert_eq!(
            attributes
                .get(SW_TRACESTATE_PARENT_ID_KEY)
                .and_then(AttributeValue::as_str),
            Some("1000100010001000")
        );
        assert_eq!(
            attributes.get("http.method").and_then(AttributeValue::as_str),
            Some("GET")
        );
        // the caller's snapshot is untouched
        assert_eq!(caller.len(), 1);
    }

    #[test]
    fn existing_w3c_tracestate_attribute_is_updated() {
        let parent = remote_parent(TraceFlags::SAMPLED, "sw=e000baa4e000baa4-01");
        let caller: Attributes = [(
            SW_W3C_TRACESTATE_KEY,
            "othervendor=abc,sw=aaaaaaaaaaaaaaaa-00",
        )]
        .into_iter()
        .collect();

        let result = engine(ScriptedOracle::sampled()).should_sample(
            &parent,
            &InboundRequest::none(),
            Some(&caller),
        );

        assert_eq!(
            result
                .attributes
                .unwrap()
                .get(SW_W3C_TRACESTATE_KEY)
                .and_then(AttributeValue::as_str),
            Some("sw=1000100010001000-01,othervendor=abc")
        );
    }

    #[test]
    fn no_attributes_without_parent_tracestate() {
        let parent = remote_parent(TraceFlags::SAMPLED, "");
        let result = engine(ScriptedOracle::sampled()).should_sample(
            &parent,
            &InboundRequest::none(),
            None,
        );

        assert_eq!(result.decision, Decision::RecordAndSample);
        assert_eq!(result.attributes, None);
        assert_eq!(result.trace_state.header(), "sw=1000100010001000-01");
    }

    #[test]
    #[traced_test]
    fn oracle_failure_drops_and_passes_tracestate_through() {
        let parent = remote_parent(TraceFlags::SAMPLED, "vendor1=foo,sw=e000baa4e000baa4-01");
        let oracle = ScriptedOracle::new(Err(OracleError::Unavailable("cancelled".to_string())));

        let result = engine(oracle).should_sample(&parent, &InboundRequest::none(), None);

        assert_eq!(result.decision, Decision::Drop);
        assert_eq!(result.attributes, None);
        assert_eq!(result.trace_state, parent.trace_state);
        assert!(logs_contain("Sampling decision failed, dropping span"));
    }

    #[test]
    fn out_of_range_record_drops() {
        let answer = DecisionRecord {
            do_sample: true,
            sample_rate: 2_000_000,
            ..DecisionRecord::default()
        };
        let result = engine(ScriptedOracle::new(Ok(answer))).should_sample(
            &SpanContext::invalid(),
            &InboundRequest::none(),
            None,
        );

        assert_eq!(result.decision, Decision::Drop);
        assert!(result.trace_state.is_empty());
    }

    #[test]
    #[traced_test]
    fn unknown_status_is_not_fatal() {
        let answer = DecisionRecord {
            do_sample: true,
            status: -99,
            ..DecisionRecord::default()
        };
        let result = engine(ScriptedOracle::new(Ok(answer))).should_sample(
            &SpanContext::invalid(),
            &InboundRequest::none(),
            None,
        );

        assert_eq!(result.decision, Decision::RecordAndSample);
        assert!(logs_contain("Unknown decision status code -99"));
    }

    #[test]
    fn trigger_trace_response_follows_sw() {
        let parent = remote_parent(TraceFlags::SAMPLED, "sw=e000baa4e000baa4-01,vendor1=foo");
        let answer = DecisionRecord {
            do_metrics: true,
            do_sample: true,
            trigger_auth_msg: "ok".to_string(),
            trigger_response_msg: "ok".to_string(),
            trigger_requested: 1,
            ..DecisionRecord::default()
        };
        let inbound = InboundRequest {
            trace_options: Some(XTraceOptions::parse("trigger-trace;foo=bar", Some("sig"))),
        };

        let result =
            engine(ScriptedOracle::new(Ok(answer))).should_sample(&parent, &inbound, None);

        assert_eq!(
            result.trace_state.header(),
            "sw=1000100010001000-01,xtrace_options_response=auth####ok;trigger-trace####ok;ignored####foo,vendor1=foo"
        );
    }

    #[test]
    fn trigger_trace_response_with_unencodable_key_is_skipped() {
        let inbound = InboundRequest {
            trace_options: Some(XTraceOptions::parse("trigger-trace;a,b=c", None)),
        };

        let result = engine(ScriptedOracle::sampled()).should_sample(
            &SpanContext::invalid(),
            &inbound,
            None,
        );

        assert_eq!(result.trace_state.header(), "sw=0000000000000000-01");
    }

    #[test]
    fn trigger_trace_response_with_reserved_delimiter_is_skipped() {
        let parent = remote_parent(
            TraceFlags::SAMPLED,
            "sw=e000baa4e000baa4-01,xtrace_options_response=trigger-trace####ok",
        );
        let inbound = InboundRequest {
            trace_options: Some(XTraceOptions::parse("trigger-trace;a####b=c", None)),
        };

        let result = engine(ScriptedOracle::sampled()).should_sample(&parent, &inbound, None);

        assert_eq!(result.trace_state.header(), "sw=1000100010001000-01");
    }

    #[test]
    fn upstream_trigger_trace_response_is_not_forwarded() {
        let parent = remote_parent(
            TraceFlags::SAMPLED,
            "sw=1000100010001000-01,xtrace_options_response=auth####ok;trigger-trace####ok,vendor1=foo",
        );

        let result = engine(ScriptedOracle::sampled()).should_sample(
            &parent,
            &InboundRequest::none(),
            None,
        );
        assert_eq!(
            result.trace_state.header(),
            "sw=1000100010001000-01,vendor1=foo"
        );

        let failing = ScriptedOracle::new(Err(OracleError::Unavailable("cancelled".to_string())));
        let result = engine(failing).should_sample(&parent, &InboundRequest::none(), None);
        assert_eq!(result.decision, Decision::Drop);
        assert_eq!(
            result.trace_state.header(),
            "sw=1000100010001000-01,vendor1=foo"
        );
    }

    #[test]
    fn config_overrides_are_sent_to_oracle() {
        struct ModeOracle;
        impl DecisionOracle for ModeOracle {
            fn decide(
                &self,
                request: &DecisionRequest<'_>,
            ) -> Result<DecisionRecord, OracleError> {
                Ok(record(
                    false,
                    request.tracing_mode == Some(TracingMode::Enabled)
                        && request.trigger_trace == TriggerTraceMode::Disabled,
                ))
            }
        }

        let config = Config {
            tracing_mode: Some(TracingMode::Enabled),
            trigger_trace: TriggerTraceMode::Disabled,
            ..Config::default()
        };
        let result = SamplingEngine::from_config(Arc::new(ModeOracle), &config).should_sample(
            &SpanContext::invalid(),
            &InboundRequest::none(),
            None,
        );

        assert_eq!(result.decision, Decision::RecordAndSample);
    }
}
