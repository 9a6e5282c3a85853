// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parent-based sampling.
//!
//! The decision for a new span depends on where its parent lives:
//!
//! - **No parent** (absent or invalid): root policy, asks the oracle
//! - **Remote parent** (extracted from an inbound carrier): asks the oracle, whatever the
//!   parent's sampled flag says
//! - **Local parent** (in-process span): inherits the parent's decision without asking the
//!   oracle, so a trace is decided once per service

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::api::{self, ReadyCode};
use crate::config::Config;
use crate::context::SpanContext;
use crate::sampling::{
    engine::SamplingEngine,
    oracle::{DecisionOracle, NoopOracle},
    trace_options::InboundRequest,
    Attributes, Decision, SamplingResult,
};

/// In-process parent span as seen by the sampler.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParentSpan {
    pub context: SpanContext,
    /// Whether the parent records events, which may be true for an unsampled span.
    pub is_recording: bool,
}

impl ParentSpan {
    #[must_use]
    pub fn new(context: SpanContext, is_recording: bool) -> Self {
        Self {
            context,
            is_recording,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentKind<'a> {
    NoParent,
    RemoteParent(&'a SpanContext),
    LocalParent(&'a ParentSpan),
}

impl<'a> ParentKind<'a> {
    #[must_use]
    pub fn classify(parent: Option<&'a ParentSpan>) -> Self {
        match parent {
            Some(parent) if parent.context.is_valid() => {
                if parent.context.is_remote {
                    ParentKind::RemoteParent(&parent.context)
                } else {
                    ParentKind::LocalParent(parent)
                }
            }
            _ => ParentKind::NoParent,
        }
    }
}

/// Single entry point for sampling decisions.
#[derive(Clone)]
pub struct ParentBasedSampler {
    engine: SamplingEngine,
}

impl ParentBasedSampler {
    /// Uses `oracle` when the agent is enabled, otherwise [`NoopOracle`], which drops
    /// every span.
    #[must_use]
    pub fn new(oracle: Arc<dyn DecisionOracle + Send + Sync>, config: &Config) -> Self {
        let oracle: Arc<dyn DecisionOracle + Send + Sync> = if config.agent_enabled {
            oracle
        } else {
            debug!("Agent disabled, every span will be dropped");
            Arc::new(NoopOracle)
        };

        Self {
            engine: SamplingEngine::from_config(oracle, config),
        }
    }

    #[must_use]
    pub fn should_sample(
        &self,
        parent: Option<&ParentSpan>,
        inbound: &InboundRequest<'_>,
        attributes: Option<&Attributes>,
    ) -> SamplingResult {
        match ParentKind::classify(parent) {
            ParentKind::NoParent => {
                self.engine
                    .should_sample(&SpanContext::invalid(), inbound, attributes)
            }
            ParentKind::RemoteParent(context) => {
                self.engine.should_sample(context, inbound, attributes)
            }
            ParentKind::LocalParent(parent) => Self::inherit(parent, attributes),
        }
    }

    /// Waits for up to `wait` until the oracle consulted for root and remote-parent spans
    /// can make decisions.
    #[must_use]
    pub fn ready(&self, wait: Duration) -> ReadyCode {
        api::solarwinds_ready(self.engine.oracle(), wait)
    }

    fn inherit(parent: &ParentSpan, attributes: Option<&Attributes>) -> SamplingResult {
        let decision = if parent.context.is_sampled() {
            Decision::RecordAndSample
        } else if parent.is_recording {
            Decision::RecordOnly
        } else {
            Decision::Drop
        };

        SamplingResult {
            decision,
            attributes: if decision == Decision::Drop {
                None
            } else {
                attributes.cloned()
            },
            trace_state: parent.context.trace_state.clone(),
        }
    }
}
