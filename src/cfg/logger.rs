// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tracing setup for the hub client.
//!
//! Logging is configured from a small YAML document:
//!
//! ```yaml
//! logger:
//!   level: debug          # EnvFilter directive
//!   output: stdout        # stdout | stderr | file
//!   show_line: true
//!   show_module_path: false
//!   show_target: false
//!   file:                 # only read when output is file
//!     path: logs/hub.log
//!     rotate: daily
//! ```
//!
//! Events are written as one JSON object per line through a non-blocking
//! writer; the returned guard must stay alive until shutdown or buffered
//! lines are lost.

use std::{fmt::Debug, fs, io, path::Path};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use fastrace::collector::{Config, ConsoleReporter};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{Event, Subscriber, field::Field};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, FmtContext, FormatEvent, FormatFields, format::Writer, writer::BoxMakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
};

#[derive(Debug, Deserialize)]
struct LoggerFile {
    logger: LoggerSettings,
}

#[derive(Debug, Deserialize)]
struct LoggerSettings {
    /// EnvFilter directive, e.g. `info` or `hubrpc_client_rs=debug`.
    level: String,
    output: Sink,
    show_line: bool,
    show_module_path: bool,
    show_target: bool,
    file: Option<FileSink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Sink {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Deserialize)]
struct FileSink {
    path: String,
    #[serde(default)]
    rotate: Option<Frequency>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Frequency {
    Minutely,
    Hourly,
    Daily,
    Never,
}

impl Frequency {
    fn rotation(&self) -> Rotation {
        match self {
            Frequency::Minutely => Rotation::MINUTELY,
            Frequency::Hourly => Rotation::HOURLY,
            Frequency::Daily => Rotation::DAILY,
            Frequency::Never => Rotation::NEVER,
        }
    }
}

/// One JSON object per event: timestamp, level, the location fields the
/// config asked for, then every event field under `fields`.
struct HubJsonFormat {
    show_line: bool,
    show_module_path: bool,
    show_target: bool,
}

impl HubJsonFormat {
    fn from_settings(s: &LoggerSettings) -> Self {
        Self {
            show_line: s.show_line,
            show_module_path: s.show_module_path,
            show_target: s.show_target,
        }
    }
}

impl<S, N> FormatEvent<S, N> for HubJsonFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let meta = event.metadata();

        let mut line = Map::new();
        line.insert(
            "timestamp".into(),
            json!(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        line.insert("level".into(), json!(meta.level().as_str()));
        if self.show_target {
            line.insert("target".into(), json!(meta.target()));
        }
        if self.show_module_path {
            line.insert("module_path".into(), json!(meta.module_path().unwrap_or("")));
        }
        if self.show_line
            && let Some(no) = meta.line()
        {
            line.insert("line".into(), json!(no));
        }

        let mut fields = FieldMap::default();
        event.record(&mut fields);
        line.insert("fields".into(), Value::Object(fields.0));

        writeln!(writer, "{}", Value::Object(line))
    }
}

#[derive(Default)]
struct FieldMap(Map<String, Value>);

impl FieldMap {
    fn put(&mut self, field: &Field, value: Value) {
        self.0.insert(field.name().to_owned(), value);
    }
}

impl tracing::field::Visit for FieldMap {
    fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
        self.put(field, json!(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, json!(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, json!(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, json!(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, json!(value));
    }
}

/// Install the global tracing subscriber described by the YAML file at
/// `config_path`.
///
/// Returns the guard keeping the non-blocking writer alive; drop it on
/// shutdown to flush buffered lines.
pub fn init_logger(config_path: &str) -> Result<WorkerGuard> {
    let raw = fs::read_to_string(config_path)
        .with_context(|| format!("cannot read logger config {config_path}"))?;
    let LoggerFile { logger } = serde_yaml::from_str(&raw)
        .with_context(|| format!("cannot parse logger config {config_path}"))?;

    let filter = EnvFilter::try_new(&logger.level)
        .or_else(|_| EnvFilter::try_from_default_env())
        .context("no usable log level in config or environment")?;

    let (writer, guard) = sink_writer(&logger)?;

    fastrace::set_reporter(ConsoleReporter, Config::default());

    let subscriber = Registry::default()
        .with(filter)
        .with(fastrace_tracing::FastraceCompatLayer::new())
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .event_format(HubJsonFormat::from_settings(&logger)),
        );

    tracing::subscriber::set_global_default(subscriber)
        .context("global tracing subscriber already installed")?;

    Ok(guard)
}

fn sink_writer(settings: &LoggerSettings) -> Result<(BoxMakeWriter, WorkerGuard)> {
    let (writer, guard) = match settings.output {
        Sink::Stdout => {
            let (w, g) = tracing_appender::non_blocking(io::stdout());
            (BoxMakeWriter::new(w), g)
        },
        Sink::Stderr => {
            let (w, g) = tracing_appender::non_blocking(io::stderr());
            (BoxMakeWriter::new(w), g)
        },
        Sink::File => {
            let file = settings
                .file
                .as_ref()
                .context("logger.file is required when output is file")?;
            let path = Path::new(&file.path);
            let rotation = file
                .rotate
                .as_ref()
                .map_or(Rotation::NEVER, Frequency::rotation);

            let appender = RollingFileAppender::new(
                rotation,
                path.parent().unwrap_or_else(|| Path::new(".")),
                path.file_name().unwrap_or_default(),
            );
            let (w, g) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(w), g)
        },
    };
    Ok((writer, guard))
}
