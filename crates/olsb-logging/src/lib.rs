//! Structured logging for OLSB nodes and simulations
//!
//! This crate sets up the `tracing` subscriber used by OLSB binaries and
//! tests. Many routing engines share one process in a simulation, so logs
//! can be attributed to the node that produced them.
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines for log processing (default)
//! - **Pretty Output**: Human-readable console output for development
//! - **Node Context**: Spans tagged with the active node's address
//! - **File Rotation**: Daily/hourly log rotation via tracing-appender
//!
//! # Quick Start
//!
//! ```ignore
//! use olsb_logging::{LogConfig, OlsbSubscriberBuilder};
//!
//! // JSONL to console
//! let _guard = OlsbSubscriberBuilder::new().init()?;
//!
//! // Pretty human-readable output
//! let _guard = OlsbSubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init()?;
//! ```

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleFormat, FileConfig, LogConfig, PROTOCOL_TARGETS, RotationStrategy};
pub use context::{NodeContextData, NodeContextGuard, node_span};
pub use layers::{NodeContextExtension, NodeContextLayer};

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors setting up logging
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to open log file {path}: {reason}")]
    File { path: String, reason: String },

    #[error("A global subscriber is already set")]
    AlreadyInitialized,
}

/// Builder for configuring and initializing the OLSB logging subscriber
///
/// By default console output uses JSONL format. Use
/// [`LogConfig::development`] for human-readable output, or
/// [`LogConfig::protocol`] to see only OLSB events.
pub struct OlsbSubscriberBuilder {
    config: LogConfig,
}

impl OlsbSubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the base log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// Set the console format
    pub fn with_console(mut self, console: ConsoleFormat) -> Self {
        self.config.console = console;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Initialize the subscriber globally
    ///
    /// Returns the file writer's guard when file output is enabled; keep it
    /// alive for the duration of the program.
    pub fn init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.directives()));

        let registry = Registry::default()
            .with(env_filter)
            .with(NodeContextLayer::new());

        let location = self.config.include_location;
        let file = match &self.config.file {
            Some(file_config) => Some(create_file_writer(file_config)?),
            None => None,
        };

        // Separate arms keep each layer stack's type concrete
        let (result, guard) = match (self.config.console, file) {
            (ConsoleFormat::Pretty { ansi }, Some((writer, guard))) => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_ansi(ansi)
                    .with_target(true);
                let file_layer = layers::jsonl_file_layer(writer, location);
                (registry.with(console_layer).with(file_layer).try_init(), Some(guard))
            }

            (ConsoleFormat::Json, Some((writer, guard))) => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .flatten_event(true)
                    .with_file(location)
                    .with_line_number(location);
                let file_layer = layers::jsonl_file_layer(writer, location);
                (registry.with(console_layer).with(file_layer).try_init(), Some(guard))
            }

            (ConsoleFormat::Pretty { ansi }, None) => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_ansi(ansi)
                    .with_target(true);
                (registry.with(console_layer).try_init(), None)
            }

            (ConsoleFormat::Json, None) => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .flatten_event(true)
                    .with_file(location)
                    .with_line_number(location);
                (registry.with(console_layer).try_init(), None)
            }

            (ConsoleFormat::Off, Some((writer, guard))) => {
                let file_layer = layers::jsonl_file_layer(writer, location);
                (registry.with(file_layer).try_init(), Some(guard))
            }

            (ConsoleFormat::Off, None) => (registry.try_init(), None),
        };

        result.map_err(|_| LoggingError::AlreadyInitialized)?;
        Ok(guard)
    }
}

impl Default for OlsbSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Open the file writer; single files are truncated, rotated ones appended
fn create_file_writer(
    file_config: &FileConfig,
) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let file_error = |e: std::io::Error| LoggingError::File {
        path: file_config.directory.display().to_string(),
        reason: e.to_string(),
    };

    fs::create_dir_all(&file_config.directory).map_err(file_error)?;
    let rotation = match file_config.rotation {
        RotationStrategy::Never => {
            let path = file_config
                .directory
                .join(format!("{}.log", file_config.prefix));
            let file = File::create(&path).map_err(file_error)?;
            return Ok(tracing_appender::non_blocking(file));
        }
        RotationStrategy::Daily => Rotation::DAILY,
        RotationStrategy::Hourly => Rotation::HOURLY,
    };
    let appender = RollingFileAppender::new(rotation, &file_config.directory, &file_config.prefix);
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Result<(), LoggingError> {
    OlsbSubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
        .map(|_| ())
}

/// Initialize logging for testing (minimal output, repeat calls ignored)
pub fn init_testing() {
    let _ = OlsbSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}
