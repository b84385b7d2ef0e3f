//! Logging setup for Postal.
//!
//! Built on `tracing-subscriber`. Buses emit a DEBUG `dispatch` span per
//! message and DEBUG events for every handler invocation, so span events are
//! the quickest way to see a middleware chain at work.
//!
//! ```rust,ignore
//! use postal_runtime::{config::load_config, logging};
//!
//! let config = load_config()?;
//! logging::init_from_config(&config.logging);
//! ```
//!
//! Or without a configuration file:
//!
//! ```rust,ignore
//! use postal_runtime::logging::{LoggingBuilder, SpanEvents};
//!
//! LoggingBuilder::new()
//!     .directive("postal_core=debug")
//!     .span_events(SpanEvents::DISPATCH)
//!     .init();
//! ```
//!
//! `RUST_LOG`, when set, replaces the configured base level. Per-target
//! directives are applied on top of it.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogOutput, LogRotation, LoggingConfig, SpanEventConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

// =============================================================================
// Span events
// =============================================================================

/// Span lifecycle events written to the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpanEvents {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    /// Includes the busy and idle time of the span.
    pub close: bool,
}

impl SpanEvents {
    pub const NONE: Self = Self {
        new: false,
        enter: false,
        exit: false,
        close: false,
    };

    /// One line when a dispatch starts and one with its timing when it ends.
    pub const DISPATCH: Self = Self {
        new: true,
        enter: false,
        exit: false,
        close: true,
    };

    pub const FULL: Self = Self {
        new: true,
        enter: true,
        exit: true,
        close: true,
    };

    fn to_fmt_span(self) -> FmtSpan {
        [
            (self.new, FmtSpan::NEW),
            (self.enter, FmtSpan::ENTER),
            (self.exit, FmtSpan::EXIT),
            (self.close, FmtSpan::CLOSE),
        ]
        .into_iter()
        .filter(|(enabled, _)| *enabled)
        .fold(FmtSpan::NONE, |acc, (_, span)| acc | span)
    }
}

impl From<&SpanEventConfig> for SpanEvents {
    fn from(config: &SpanEventConfig) -> Self {
        Self {
            new: config.new,
            enter: config.enter,
            exit: config.exit,
            close: config.close,
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Minutely => Rotation::MINUTELY,
        }
    }
}

/// Installs the global subscriber described by `config`.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

// =============================================================================
// LoggingBuilder
// =============================================================================

/// Builds and installs the global `tracing` subscriber.
#[derive(Debug)]
pub struct LoggingBuilder {
    level: tracing::Level,
    directives: Vec<String>,
    span_events: SpanEvents,
    format: LogFormat,
    output: LogOutput,
    file: Option<PathBuf>,
    rotation: LogRotation,
    show_target: bool,
    show_thread_ids: bool,
    show_source: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    /// INFO level, compact lines on stdout, targets shown.
    pub fn new() -> Self {
        Self {
            level: tracing::Level::INFO,
            directives: Vec::new(),
            span_events: SpanEvents::NONE,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file: None,
            rotation: LogRotation::Never,
            show_target: true,
            show_thread_ids: false,
            show_source: false,
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        let directives = config
            .filters
            .iter()
            .map(|(target, level)| format!("{target}={level}"))
            .collect();

        Self {
            level: config.level.to_tracing_level(),
            directives,
            span_events: SpanEvents::from(&config.span_events),
            format: config.format,
            output: config.output,
            file: config.file_path.clone(),
            rotation: config.rotation,
            show_thread_ids: config.thread_ids,
            show_source: config.file_location,
            ..Self::new()
        }
    }

    /// Base level for every target without its own directive.
    pub fn level(mut self, level: tracing::Level) -> Self {
        self.level = level;
        self
    }

    /// Adds a filter directive such as `postal_core=trace`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    pub fn span_events(mut self, events: SpanEvents) -> Self {
        self.span_events = events;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Log file for [`LogOutput::File`]. The file name becomes the prefix of
    /// rotated files.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn show_target(mut self, enabled: bool) -> Self {
        self.show_target = enabled;
        self
    }

    pub fn show_thread_ids(mut self, enabled: bool) -> Self {
        self.show_thread_ids = enabled;
        self
    }

    /// Adds the source file and line of every event.
    pub fn show_source(mut self, enabled: bool) -> Self {
        self.show_source = enabled;
        self
    }

    /// Installs the subscriber, ignoring an already installed one.
    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the subscriber.
    ///
    /// An unusable log file falls back to stdout and invalid directives are
    /// skipped; both are logged once the subscriber is active.
    pub fn try_init(self) -> Result<(), TryInitError> {
        let (writer, fallback) = self.writer();
        let (filter, rejected) = self.filter();
        let result = tracing_subscriber::registry()
            .with(self.fmt_layer(writer))
            .with(filter)
            .try_init();

        if let Some(reason) = fallback {
            warn!("{reason}, logging to stdout");
        }
        for (directive, error) in rejected {
            warn!(%directive, %error, "Ignoring log directive");
        }
        result
    }

    /// Returns the filter and every directive that failed to parse.
    fn filter(&self) -> (EnvFilter, Vec<(String, String)>) {
        let mut filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(self.level).into())
            .from_env_lossy();

        let mut rejected = Vec::new();
        for directive in &self.directives {
            match directive.parse() {
                Ok(parsed) => filter = filter.add_directive(parsed),
                Err(e) => rejected.push((directive.clone(), e.to_string())),
            }
        }
        (filter, rejected)
    }

    fn writer(&self) -> (BoxMakeWriter, Option<String>) {
        match (self.output, self.file.as_deref()) {
            (LogOutput::Stdout, _) => (BoxMakeWriter::new(std::io::stdout), None),
            (LogOutput::Stderr, _) => (BoxMakeWriter::new(std::io::stderr), None),
            (LogOutput::File, Some(path)) => match rolling_appender(path, self.rotation) {
                Ok(appender) => (BoxMakeWriter::new(appender), None),
                Err(e) => (
                    BoxMakeWriter::new(std::io::stdout),
                    Some(format!("Cannot open log file {}: {e}", path.display())),
                ),
            },
            (LogOutput::File, None) => (
                BoxMakeWriter::new(std::io::stdout),
                Some("File output requested without a file path".to_string()),
            ),
        }
    }

    fn fmt_layer(&self, writer: BoxMakeWriter) -> BoxedLayer {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_span_events(self.span_events.to_fmt_span())
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_file(self.show_source)
            .with_line_number(self.show_source);

        match self.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => layer.json().boxed(),
            // Without `json-log`, JSON degrades to the full format.
            _ => layer.boxed(),
        }
    }
}

fn rolling_appender(
    path: &Path,
    rotation: LogRotation,
) -> Result<RollingFileAppender, tracing_appender::rolling::InitError> {
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let prefix = path.file_name().unwrap_or_else(|| OsStr::new("postal.log"));
    RollingFileAppender::builder()
        .rotation(rotation.into())
        .filename_prefix(prefix.to_string_lossy())
        .build(directory)
}
