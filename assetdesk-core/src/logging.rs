//! Logging setup
//!
//! One global `tracing` subscriber per process. `RUST_LOG` overrides the
//! configured level; `filter_directives` are always applied on top.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
    /// File and line of the call site
    pub include_location: bool,
    pub include_thread: bool,
    pub include_timestamp: bool,
    /// Append to this file instead of stderr
    pub log_file: Option<PathBuf>,
    /// Emit span close events with their busy/idle time
    pub span_timing: bool,
    pub filter_directives: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
            include_location: false,
            include_thread: false,
            include_timestamp: true,
            log_file: None,
            span_timing: false,
            filter_directives: vec![
                "assetdesk_core=info".to_string(),
                "assetdesk_auth=info".to_string(),
                "reqwest=warn".to_string(),
            ],
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid filter directive '{directive}': {source}")]
    InvalidDirective {
        directive: String,
        #[source]
        source: ParseError,
    },

    #[error("cannot open log file {path}: {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("a global subscriber is already installed")]
    AlreadyInitialized(#[from] TryInitError),
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    let base = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    config
        .filter_directives
        .iter()
        .try_fold(base, |filter, directive| {
            let parsed = directive
                .parse()
                .map_err(|source| LoggingError::InvalidDirective {
                    directive: directive.clone(),
                    source,
                })?;
            Ok(filter.add_directive(parsed))
        })
}

fn build_writer(config: &LoggingConfig) -> Result<BoxMakeWriter, LoggingError> {
    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::OpenFile {
                    path: path.clone(),
                    source,
                })?;
            Ok(BoxMakeWriter::new(Mutex::new(file)))
        }
        None => Ok(BoxMakeWriter::new(std::io::stderr)),
    }
}

fn build_layer(
    config: &LoggingConfig,
    writer: BoxMakeWriter,
) -> Box<dyn Layer<Registry> + Send + Sync> {
    let spans = if config.span_timing {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_span_events(spans)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread)
        .with_thread_names(config.include_thread)
        .with_ansi(config.log_file.is_none());

    match (config.format, config.include_timestamp) {
        (LogFormat::Json, true) => layer.json().boxed(),
        (LogFormat::Json, false) => layer.json().without_time().boxed(),
        (LogFormat::Pretty, true) => layer.pretty().boxed(),
        (LogFormat::Pretty, false) => layer.pretty().without_time().boxed(),
        (LogFormat::Compact, true) => layer.compact().boxed(),
        (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
    }
}

/// Install the global subscriber
///
/// Returns [`LoggingError::AlreadyInitialized`] instead of panicking when
/// called twice.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;
    let writer = build_writer(config)?;

    tracing_subscriber::registry()
        .with(build_layer(config, writer))
        .with(filter)
        .try_init()?;

    tracing::debug!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}

#[macro_export]
macro_rules! log_operation_start {
    ($operation:expr $(, $($field:tt)+)?) => {
        $crate::tracing::debug!(operation = $operation, $($($field)+,)? "Operation started")
    };
}

#[macro_export]
macro_rules! log_operation_success {
    ($operation:expr $(, $($field:tt)+)?) => {
        $crate::tracing::info!(operation = $operation, $($($field)+,)? "Operation completed")
    };
}

#[macro_export]
macro_rules! log_operation_error {
    ($operation:expr, $error:expr $(, $($field:tt)+)?) => {
        $crate::tracing::warn!(
            operation = $operation,
            error = %$error,
            $($($field)+,)?
            "Operation failed"
        )
    };
}
