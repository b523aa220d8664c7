// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Append-only log file shared by records and diagnostics
//!
//! Open records are written directly; `tracing` diagnostics reach the same
//! file through a `tracing-subscriber` fmt layer using [`PrefixedFormat`].
//! Both paths produce one `write` per line, so concurrent writers never
//! interleave within a line.

use crate::error::{Error, Result};
use crate::record::{OpenRecord, COMPONENT};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::{FmtContext, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_PATH: &str = "/tmp/file_open.log";

#[derive(Debug, Clone)]
pub struct LogSink {
    file: Arc<File>,
    path: PathBuf,
}

impl LogSink {
    /// Opens `path` for appending, creating it with mode 0644 if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o644)
            .open(&path)
            .map_err(|source| Error::LogSink {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            file: Arc::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, record: &OpenRecord) -> std::io::Result<()> {
        let line = format!("{record}\n");
        (&*self.file).write_all(line.as_bytes())
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = &'a File;

    fn make_writer(&'a self) -> Self::Writer {
        &*self.file
    }
}

/// `[file-open-interceptor] <level>: <message> <fields>`
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefixedFormat;

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "error",
        Level::WARN => "warn",
        Level::INFO => "info",
        Level::DEBUG => "debug",
        Level::TRACE => "trace",
    }
}

impl<S, N> FormatEvent<S, N> for PrefixedFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(writer, "[{COMPONENT}] {}: ", level_name(event.metadata().level()))?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

pub fn build_subscriber(sink: LogSink, filter: EnvFilter) -> impl Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_writer(sink)
        .event_format(PrefixedFormat)
        .with_env_filter(filter)
        .finish()
}

/// Installs the process-wide subscriber writing diagnostics into `sink`.
pub fn init_tracing(sink: LogSink, directive: &str) -> Result<()> {
    let filter = EnvFilter::try_new(directive)
        .map_err(|e| Error::Config(format!("invalid log level '{directive}': {e}")))?;
    tracing::subscriber::set_global_default(build_subscriber(sink, filter))
        .map_err(|e| Error::Tracing(e.to_string()))
}
