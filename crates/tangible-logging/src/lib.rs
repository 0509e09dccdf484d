//! Structured logging for the tangible runtime
//!
//! Sets up a `tracing` subscriber for hosts of the tangible engine. Engine
//! and transport code only emit `tracing` events; this crate decides where
//! they go.
//!
//! # Features
//!
//! - **Pretty console output** (default), plain or JSONL on request
//! - **JSONL log files**, rotated daily via tracing-appender
//! - **`RUST_LOG` override** of the configured level
//!
//! # Quick Start
//!
//! ```ignore
//! use tangible_logging::{ConsoleFormat, FileConfig, TangibleSubscriberBuilder};
//!
//! // Pretty console output at info
//! let _guard = TangibleSubscriberBuilder::new().init()?;
//!
//! // JSONL files under ./logs, rotated daily, console off
//! let _guard = TangibleSubscriberBuilder::new()
//!     .with_console(ConsoleFormat::Off)
//!     .with_file_output(FileConfig::in_directory("./logs"))
//!     .init()?;
//! ```
//!
//! Keep the returned guard alive for as long as file output should flush.

pub mod config;
pub mod layers;

pub use config::{ConsoleFormat, FileConfig, LogConfig, RotationStrategy};
pub use tracing_appender::non_blocking::WorkerGuard;

use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::layers::BoxedLayer;

/// Errors raised while setting up logging
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Log file error at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

/// A built subscriber and the guard flushing its file output
pub type BuiltSubscriber = (Box<dyn Subscriber + Send + Sync>, Option<WorkerGuard>);

/// Builder for configuring and initializing the logging subscriber
pub struct TangibleSubscriberBuilder {
    config: LogConfig,
}

impl TangibleSubscriberBuilder {
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

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    pub fn with_console(mut self, format: ConsoleFormat) -> Self {
        self.config.console = format;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Ignore `RUST_LOG` and use the configured level only
    pub fn without_env_override(mut self) -> Self {
        self.config.use_env = false;
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        if self.config.use_env {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return Ok(filter);
            }
        }
        EnvFilter::try_new(&self.config.level)
            .map_err(|e| LoggingError::Filter(e.to_string()))
    }

    /// Build the subscriber without installing it
    pub fn build(self) -> Result<BuiltSubscriber, LoggingError> {
        let filter = self.filter()?;

        let mut outputs: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        outputs.extend(layers::console_layer(self.config.console));
        if let Some(file) = &self.config.file {
            let (writer, file_guard) = layers::file_writer(file)?;
            outputs.push(layers::jsonl_layer(writer));
            guard = Some(file_guard);
        }

        let subscriber = Registry::default().with(outputs).with(filter);
        Ok((Box::new(subscriber), guard))
    }

    /// Install the subscriber globally
    ///
    /// Returns the file guard, if file output is enabled. Fails if a global
    /// subscriber has already been set.
    pub fn init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let (subscriber, guard) = self.build()?;
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
        Ok(guard)
    }
}

impl Default for TangibleSubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize logging for tests; a second call is a no-op
pub fn init_testing() {
    let _ = TangibleSubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creation() {
        let builder = TangibleSubscriberBuilder::new();
        assert_eq!(builder.config().level, "info");
        assert_eq!(builder.config().console, ConsoleFormat::Pretty);
    }

    #[test]
    fn test_builder_with_config() {
        let builder = TangibleSubscriberBuilder::new().with_config(LogConfig::testing());
        assert_eq!(builder.config().level, "warn");
    }

    #[test]
    fn test_builder_setters() {
        let builder = TangibleSubscriberBuilder::new()
            .with_level("trace")
            .with_console(ConsoleFormat::Json)
            .without_env_override();
        assert_eq!(builder.config().level, "trace");
        assert_eq!(builder.config().console, ConsoleFormat::Json);
        assert!(!builder.config().use_env);
    }

    #[test]
    fn test_console_only_has_no_guard() {
        let (_subscriber, guard) = TangibleSubscriberBuilder::new()
            .without_env_override()
            .build()
            .unwrap();
        assert!(guard.is_none());
    }
}
