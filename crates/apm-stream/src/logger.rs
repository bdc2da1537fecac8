// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log line format of the collector:
//!
//! ```text
//! APM_COLLECTOR | LEVEL | [span{fields}: ]message fields
//! ```

use std::{env, fmt};

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;

/// Filter directive from `APM_LOG_LEVEL`, lowercased, `info` when unset.
/// Read before [`crate::config::Config::new`] so its warnings are not lost.
#[must_use]
pub fn level_from_env() -> String {
    env::var("APM_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or_else(|_| "info".to_string())
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
        write!(&mut writer, "APM_COLLECTOR | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                // Filled in by the fmt layer when the span is created.
                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::{info, info_span};
    use serial_test::serial;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

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

    #[test]
    fn test_prefix_and_span_scope() {
        let buffer = Buffer::default();
        let subscriber = tracing_subscriber::fmt()
            .event_format(Formatter)
            .with_writer(buffer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let span = info_span!("flush", worker = "jvm_cpu_aggregation");
            let _guard = span.enter();
            info!(records = 3, "Flushed window");
        });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert!(output.starts_with("APM_COLLECTOR | INFO | flush{"), "{output}");
        assert!(output.contains("jvm_cpu_aggregation"), "{output}");
        assert!(output.contains("}: Flushed window"), "{output}");
        assert!(output.ends_with("records=3\n"), "{output}");
    }

    #[test]
    #[serial]
    fn test_level_from_env() {
        env::remove_var("APM_LOG_LEVEL");
        assert_eq!(level_from_env(), "info");
        env::set_var("APM_LOG_LEVEL", "DEBUG");
        assert_eq!(level_from_env(), "debug");
        env::remove_var("APM_LOG_LEVEL");
    }
}
