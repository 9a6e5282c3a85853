// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Application-facing helpers.
//!
//! - [`solarwinds_ready`]: waits for the decision oracle to receive its settings
//! - [`TransactionNames`]: custom transaction names keyed by span

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

pub use crate::sampling::oracle::ReadyCode;

use crate::config::Config;
use crate::context::SpanContext;
use crate::sampling::oracle::DecisionOracle;

/// Blocks for up to `wait` until `oracle` is ready to make decisions.
///
/// Codes the oracle reports outside of [`ReadyCode`] are treated as
/// [`ReadyCode::Unknown`].
pub fn solarwinds_ready(oracle: &dyn DecisionOracle, wait: Duration) -> ReadyCode {
    let code = oracle.is_ready(wait);
    let Some(ready) = ReadyCode::from_code(code) else {
        warn!("Unknown readiness code {code}");
        return ReadyCode::Unknown;
    };

    if ready == ReadyCode::Ok {
        debug!("Decision oracle ready");
    } else {
        warn!("Decision oracle not ready: {}", ready.description());
    }
    ready
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionNameError {
    #[error("transaction name must not be empty")]
    EmptyName,
    #[error("cannot set a transaction name on an invalid span context")]
    InvalidContext,
}

/// Custom transaction names of in-flight spans, keyed by `(trace_id, span_id)`.
///
/// Names are set by the application while a span is open and taken by whatever exports the
/// span. Spans without a custom name resolve to the configured default, if any.
#[derive(Debug, Default)]
pub struct TransactionNames {
    default: Option<String>,
    names: Mutex<HashMap<(u128, u64), String>>,
}

impl TransactionNames {
    #[must_use]
    pub fn new(default: Option<String>) -> Self {
        Self {
            default,
            names: Mutex::default(),
        }
    }

    /// Names falling back to the configured `transaction_name`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.transaction_name.clone())
    }

    /// # Errors
    ///
    /// Rejects an empty (or whitespace-only) name and an invalid span context.
    pub fn set(&self, context: &SpanContext, name: &str) -> Result<(), TransactionNameError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TransactionNameError::EmptyName);
        }
        if !context.is_valid() {
            return Err(TransactionNameError::InvalidContext);
        }

        self.lock()
            .insert((context.trace_id, context.span_id), name.to_string());
        Ok(())
    }

    #[must_use]
    pub fn get(&self, context: &SpanContext) -> Option<String> {
        self.lock()
            .get(&(context.trace_id, context.span_id))
            .cloned()
    }

    /// Removes and returns the custom name of `context`.
    pub fn take(&self, context: &SpanContext) -> Option<String> {
        self.lock().remove(&(context.trace_id, context.span_id))
    }

    /// Takes the custom name of `context`, falling back to the default.
    pub fn resolve(&self, context: &SpanContext) -> Option<String> {
        self.take(context).or_else(|| self.default.clone())
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<(u128, u64), String>> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
