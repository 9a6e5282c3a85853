// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error type for header extraction and injection.
//!
//! These errors never escape the propagation layer. Extraction failures are logged and
//! turned into [`SpanContext::invalid`](crate::context::SpanContext::invalid), so the
//! sampler falls back to the root policy; injection failures are logged and the carrier is
//! left untouched.

use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
#[error("Cannot {operation} {propagator_name}: {message}")]
pub struct Error {
    message: &'static str,
    propagator_name: &'static str,
    operation: &'static str,
}

impl Error {
    #[must_use]
    pub fn extract(message: &'static str, propagator_name: &'static str) -> Self {
        Self {
            message,
            propagator_name,
            operation: "extract",
        }
    }

    #[must_use]
    pub fn inject(message: &'static str, propagator_name: &'static str) -> Self {
        Self {
            message,
            propagator_name,
            operation: "inject",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_operation_and_propagator() {
        assert_eq!(
            Error::extract("invalid traceparent", "traceparent").to_string(),
            "Cannot extract traceparent: invalid traceparent"
        );
        assert_eq!(
            Error::inject("invalid span context", "solarwinds").to_string(),
            "Cannot inject solarwinds: invalid span context"
        );
    }
}
