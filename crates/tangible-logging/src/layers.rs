//! Formatting layers for console and file output
//!
//! Each builder returns a boxed layer so the subscriber can be assembled
//! from whichever outputs the configuration enables.

use std::fs::{self, File};
use std::io::IsTerminal;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{Layer, Registry};

use crate::LoggingError;
use crate::config::{ConsoleFormat, FileConfig, RotationStrategy};

/// A layer over the bare registry
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Create a JSONL formatting layer writing to `writer`
pub fn jsonl_layer<W>(writer: W) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .flatten_event(true)
        .with_thread_names(true)
        .with_writer(writer)
        .boxed()
}

/// Console layer on stdout, or `None` when the console is off
pub fn console_layer(format: ConsoleFormat) -> Option<BoxedLayer> {
    let readable = |ansi: bool| -> BoxedLayer {
        tracing_subscriber::fmt::layer()
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_names(true)
            .boxed()
    };

    match format {
        ConsoleFormat::Pretty => Some(readable(std::io::stdout().is_terminal())),
        ConsoleFormat::Plain => Some(readable(false)),
        ConsoleFormat::Json => Some(jsonl_layer(std::io::stdout)),
        ConsoleFormat::Off => None,
    }
}

/// Non-blocking writer for the configured log file
///
/// `Never` truncates a single `<prefix>.log`; `Daily` appends to rolled
/// files.
pub fn file_writer(file: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let io_error = |e: std::io::Error| LoggingError::Io {
        path: file.directory.display().to_string(),
        reason: e.to_string(),
    };

    fs::create_dir_all(&file.directory).map_err(io_error)?;
    match file.rotation {
        RotationStrategy::Never => {
            let path = file.directory.join(format!("{}.log", file.prefix));
            let handle = File::create(&path).map_err(io_error)?;
            Ok(tracing_appender::non_blocking(handle))
        }
        RotationStrategy::Daily => Ok(tracing_appender::non_blocking(RollingFileAppender::new(
            Rotation::DAILY,
            &file.directory,
            &file.prefix,
        ))),
    }
}
