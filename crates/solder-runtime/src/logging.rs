//! Logging initialization from configuration.
//!
//! Thin builder over `tracing-subscriber`: an [`EnvFilter`] seeded from the
//! configured level (the `RUST_LOG` environment variable wins when set) plus
//! extra directives, a format layer chosen by [`LogFormat`], and a writer
//! chosen by [`LogOutput`] (file output via `tracing-appender`).
//!
//! # Example
//!
//! ```rust,ignore
//! use solder_runtime::logging::LoggingBuilder;
//!
//! LoggingBuilder::new()
//!     .level("debug")
//!     .directive("solder_pubsub=trace")
//!     .try_init()?;
//! ```

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use crate::config::{LogFormat, LogOutput, LoggingConfig, SpanEventConfig};
use crate::error::{RuntimeError, RuntimeResult};

fn fmt_span(config: SpanEventConfig) -> FmtSpan {
    match config {
        SpanEventConfig::None => FmtSpan::NONE,
        SpanEventConfig::Lifecycle => FmtSpan::NEW | FmtSpan::CLOSE,
        SpanEventConfig::Active => FmtSpan::ACTIVE,
        SpanEventConfig::Full => FmtSpan::FULL,
    }
}

/// Builder for the global tracing subscriber.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: String,
    directives: Vec<String>,
    format: LogFormat,
    output: LogOutput,
    file_path: Option<PathBuf>,
    span_events: SpanEventConfig,
    with_target: bool,
    with_thread_ids: bool,
    with_location: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    /// Creates a builder with the default settings (info, compact, stdout).
    pub fn new() -> Self {
        Self {
            level: "info".to_string(),
            directives: Vec::new(),
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            span_events: SpanEventConfig::None,
            with_target: true,
            with_thread_ids: false,
            with_location: false,
        }
    }

    /// Creates a builder from a [`LoggingConfig`].
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            directives: config.directives.clone(),
            format: config.format,
            output: config.output,
            file_path: config.file_path.clone(),
            span_events: config.span_events,
            with_target: config.with_target,
            with_thread_ids: config.with_thread_ids,
            with_location: config.with_location,
        }
    }

    /// Sets the base level.
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Adds an extra filter directive, e.g. `"solder_pubsub=trace"`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Sets the line format.
    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the output destination.
    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Sets the log file path (implies [`LogOutput::File`]).
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = LogOutput::File;
        self.file_path = Some(path.into());
        self
    }

    /// Sets which span lifecycle events are emitted.
    pub fn span_events(mut self, events: SpanEventConfig) -> Self {
        self.span_events = events;
        self
    }

    /// Builds the env filter: `RUST_LOG` when set, the configured level
    /// otherwise, plus any extra directives.
    fn build_filter(&self) -> RuntimeResult<EnvFilter> {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        for directive in &self.directives {
            let parsed = directive.parse().map_err(|e| {
                RuntimeError::Logging(format!("Bad filter directive '{directive}': {e}"))
            })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }

    /// Installs the global subscriber.
    ///
    /// Fails when a directive does not parse, when file output has no path,
    /// or when a global subscriber is already installed.
    pub fn try_init(self) -> RuntimeResult<()> {
        let filter = self.build_filter()?;
        let span_events = fmt_span(self.span_events);

        macro_rules! init_with_writer {
            ($writer:expr) => {{
                let builder = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_span_events(span_events)
                    .with_target(self.with_target)
                    .with_thread_ids(self.with_thread_ids)
                    .with_file(self.with_location)
                    .with_line_number(self.with_location)
                    .with_writer($writer);
                match self.format {
                    LogFormat::Compact => builder.compact().try_init(),
                    LogFormat::Full => builder.try_init(),
                    LogFormat::Pretty => builder.pretty().try_init(),
                }
            }};
        }

        let result = match self.output {
            LogOutput::Stdout => init_with_writer!(std::io::stdout),
            LogOutput::Stderr => init_with_writer!(std::io::stderr),
            LogOutput::File => {
                let path = self.file_path.clone().ok_or_else(|| {
                    RuntimeError::Logging("File output selected without a file path".to_string())
                })?;
                let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
                let name = path.file_name().ok_or_else(|| {
                    RuntimeError::Logging(format!("Not a file path: {}", path.display()))
                })?;
                init_with_writer!(tracing_appender::rolling::never(dir, name))
            }
        };

        result.map_err(|e| RuntimeError::Logging(e.to_string()))
    }
}

/// Initializes logging from a [`LoggingConfig`].
///
/// Safe to call more than once; a subscriber that is already installed stays
/// installed.
pub fn init_from_config(config: &LoggingConfig) {
    if let Err(e) = LoggingBuilder::from_config(config).try_init() {
        eprintln!("Warning: logging not initialized: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_directive_is_rejected() {
        let result = LoggingBuilder::new().directive("not a directive!").build_filter();
        assert!(result.is_err());
    }

    #[test]
    fn directives_stack_on_the_base_level() {
        let filter = LoggingBuilder::new()
            .level("warn")
            .directive("solder_core=debug")
            .build_filter()
            .unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("solder_core=debug"));
    }

    #[test]
    fn file_output_without_path_fails() {
        let mut builder = LoggingBuilder::new();
        builder.output = LogOutput::File;
        assert!(builder.try_init().is_err());
    }
}
