// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log output of the crate's own diagnostics.
//!
//! Every line is prefixed with `SW_APM` so it can be told apart from the application's
//! logs:
//!
//! ```text
//! SW_APM | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! ```text
//! SW_APM | WARN | Decision oracle not ready: server responded with try later
//! SW_APM | DEBUG | Sampling decision: RecordOnly
//! ```
//!
//! Applications that install their own subscriber can use [`Formatter`] directly; otherwise
//! [`init`] installs a global one at the configured [`LogLevel`].

use std::fmt;

use thiserror::Error;
use tracing::debug;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields, MakeWriter,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::{log_level::LogLevel, Config};

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("failed to set global subscriber: {0}")]
    AlreadyInitialized(String),
}

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "SW_APM | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                // formatted by the fmt layer when the span was created
                let ext = span.extensions();
                let fields = &ext
                    .get::<FormattedFields<N>>()
                    .expect("will never be `None`");

                if !fields.is_empty() {
                    write!(writer, "{{{fields}}}")?;
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Installs a global subscriber writing to stderr at `config.log_level`.
///
/// # Errors
///
/// Fails when a global subscriber was already installed.
pub fn init(config: &Config) -> Result<(), LoggerError> {
    tracing::subscriber::set_global_default(subscriber(config.log_level, std::io::stderr))
        .map_err(|e| LoggerError::AlreadyInitialized(e.to_string()))?;

    debug!("Logging subsystem enabled at {}", config.log_level.as_ref());
    Ok(())
}

// Plain text only: escape codes would end up inside the formatted span fields.
fn subscriber<W>(level: LogLevel, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::default().add_directive(level.as_level_filter().into());

    tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(writer)
        .event_format(Formatter)
        .finish()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing::{info_span, warn};

    use super::*;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Buffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(level: LogLevel, log: impl FnOnce()) -> String {
        let buffer = Buffer::default();
        tracing::subscriber::with_default(subscriber(level, buffer.clone()), log);
        buffer.contents()
    }

    #[test]
    fn prefixes_level() {
        let output = capture(LogLevel::Warn, || warn!("oracle not ready"));
        assert_eq!(output, "SW_APM | WARN | oracle not ready\n");
    }

    #[test]
    fn includes_span_and_event_fields() {
        let output = capture(LogLevel::Debug, || {
            let span = info_span!("should_sample", attempt = 3);
            let _entered = span.enter();
            debug!(members = 2, "tracestate updated");
        });
        assert_eq!(
            output,
            "SW_APM | DEBUG | should_sample{attempt=3}: tracestate updated members=2\n"
        );
        assert!(!output.contains('\u{1b}'));
    }

    #[test]
    fn filters_below_configured_level() {
        let output = capture(LogLevel::Warn, || debug!("hidden"));
        assert!(output.is_empty());

        let output = capture(LogLevel::Off, || warn!("hidden"));
        assert!(output.is_empty());
    }
}
