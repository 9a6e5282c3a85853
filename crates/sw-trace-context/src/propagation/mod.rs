// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Distributed trace context propagation across service boundaries.
//!
//! # Propagators
//!
//! - **`tracecontext`**: W3C `traceparent` / `tracestate` ([`TraceContextPropagator`])
//! - **`solarwinds`**: the `sw` member of `tracestate` ([`SolarWindsPropagator`])
//! - **response**: `x-trace` and `x-trace-options-response` on the inbound request's
//!   response ([`response::ResponsePropagator`])
//!
//! # Trace Context Flow
//!
//! ```text
//! Incoming Request Headers
//!   ↓
//! Extract (first propagator yielding a valid context)
//!   ↓
//! SpanContext (remote parent)
//!   ↓
//! Sample and create child span
//!   ↓
//! Inject (every propagator, configured order)
//!   ↓
//! Outgoing Request Headers
//! ```
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//!
//! use sw_trace_context::config::propagation_style::PropagationStyle;
//! use sw_trace_context::propagation::{CompositePropagator, Propagator};
//!
//! let propagator =
//!     CompositePropagator::new(&[PropagationStyle::TraceContext, PropagationStyle::SolarWinds])
//!         .expect("valid propagator order");
//!
//! let headers = HashMap::from([(
//!     "traceparent".to_string(),
//!     "00-11112222333344445555666677778888-1000100010001000-01".to_string(),
//! )]);
//! let context = propagator.extract(&headers).expect("remote parent");
//! assert_eq!(context.span_id, 0x1000_1000_1000_1000);
//! ```

use tracing::debug;

use crate::config::{
    propagation_style::{validate_propagators, PropagationStyle},
    ConfigError,
};
use crate::context::SpanContext;
use carrier::{Extractor, Injector};
use text_map_propagator::{SolarWindsPropagator, TraceContextPropagator};

pub mod carrier;
pub mod error;
pub mod response;
pub mod text_map_propagator;

/// Reads trace context from inbound carriers and writes it to outbound ones.
pub trait Propagator {
    /// Returns `Some` only for a valid remote context.
    fn extract(&self, carrier: &dyn Extractor) -> Option<SpanContext>;

    fn inject(&self, context: &SpanContext, carrier: &mut dyn Injector);

    /// Header names this propagator may write.
    fn fields(&self) -> &'static [&'static str];
}

/// Runs the configured propagators in order.
///
/// Extraction returns the first valid context; injection runs every propagator, so later
/// ones may overwrite headers written by earlier ones. That is how the `sw` entry ends up in
/// front of the raw `tracestate` written by the W3C propagator.
pub struct CompositePropagator {
    propagators: Vec<Box<dyn Propagator + Send + Sync>>,
    styles: Vec<PropagationStyle>,
}

impl CompositePropagator {
    /// Builds the composite from configured styles.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPropagators`] unless `tracecontext` is configured and
    /// comes before `solarwinds`.
    pub fn new(styles: &[PropagationStyle]) -> Result<Self, ConfigError> {
        validate_propagators(styles)?;

        let mut propagators: Vec<Box<dyn Propagator + Send + Sync>> = Vec::new();
        let mut kept = Vec::new();
        for style in styles {
            match style {
                PropagationStyle::TraceContext => {
                    propagators.push(Box::new(TraceContextPropagator));
                }
                PropagationStyle::SolarWinds => {
                    propagators.push(Box::new(SolarWindsPropagator));
                }
                // Baggage has its own collaborator outside this crate
                PropagationStyle::Baggage | PropagationStyle::None => {
                    debug!("Propagation style {style} is not handled here, skipping");
                    continue;
                }
            }
            kept.push(*style);
        }

        Ok(Self {
            propagators,
            styles: kept,
        })
    }

    /// The handled styles, in injection order.
    #[must_use]
    pub fn styles(&self) -> &[PropagationStyle] {
        &self.styles
    }
}

impl Propagator for CompositePropagator {
    fn extract(&self, carrier: &dyn Extractor) -> Option<SpanContext> {
        self.propagators
            .iter()
            .find_map(|propagator| propagator.extract(carrier))
    }

    fn inject(&self, context: &SpanContext, carrier: &mut dyn Injector) {
        for propagator in &self.propagators {
            propagator.inject(context, carrier);
        }
    }

    fn fields(&self) -> &'static [&'static str] {
        &[
            text_map_propagator::TRACEPARENT_KEY,
            text_map_propagator::TRACESTATE_KEY,
        ]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::context::TraceFlags;
    use crate::trace_state::TraceState;

    use crate::config::propagation_style::PropagationStyle::{Baggage, SolarWinds, TraceContext};

    #[test]
    fn requires_tracecontext() {
        assert!(matches!(
            CompositePropagator::new(&[SolarWinds]),
            Err(ConfigError::InvalidPropagators(_))
        ));
        assert!(matches!(
            CompositePropagator::new(&[]),
            Err(ConfigError::InvalidPropagators(_))
        ));
    }

    #[test]
    fn requires_tracecontext_before_solarwinds() {
        assert!(matches!(
            CompositePropagator::new(&[SolarWinds, TraceContext]),
            Err(ConfigError::InvalidPropagators(_))
        ));

        let propagator = CompositePropagator::new(&[TraceContext, Baggage, SolarWinds]).unwrap();
        assert_eq!(propagator.styles(), &[TraceContext, SolarWinds]);
    }

    #[test]
    fn tracecontext_alone_is_valid() {
        let propagator = CompositePropagator::new(&[TraceContext]).unwrap();
        assert_eq!(propagator.styles(), &[TraceContext]);
    }

    #[test]
    fn inject_runs_in_order() {
        let propagator = CompositePropagator::new(&[TraceContext, SolarWinds]).unwrap();
        let context = SpanContext {
            trace_id: 0x1111_2222_3333_4444_5555_6666_7777_8888,
            span_id: 0x2000_2000_2000_2000,
            trace_flags: TraceFlags::NOT_SAMPLED,
            trace_state: TraceState::from_header("vendor1=foo,sw=1000100010001000-00"),
            is_remote: false,
        };

        let mut carrier: HashMap<String, String> = HashMap::new();
        propagator.inject(&context, &mut carrier);

        assert_eq!(
            carrier.get("traceparent").unwrap(),
            "00-11112222333344445555666677778888-2000200020002000-00"
        );
        assert_eq!(
            carrier.get("tracestate").unwrap(),
            "sw=2000200020002000-00,vendor1=foo"
        );
    }

    #[test]
    fn extract_uses_first_valid_context() {
        let propagator = CompositePropagator::new(&[TraceContext, SolarWinds]).unwrap();
        let carrier = HashMap::from([
            (
                "traceparent".to_string(),
                "00-11112222333344445555666677778888-1000100010001000-01".to_string(),
            ),
            ("tracestate".to_string(), "vendor1=foo".to_string()),
        ]);

        let context = propagator.extract(&carrier).unwrap();
        assert_eq!(context.trace_state.header(), "vendor1=foo");

        let empty: HashMap<String, String> = HashMap::new();
        assert_eq!(propagator.extract(&empty), None);
    }
}
