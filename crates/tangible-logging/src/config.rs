//! Logging configuration for engine hosts
//!
//! A host picks a level, how the console shows events, and optionally a
//! directory for JSON-lines log files. Everything else is fixed: JSON output
//! flattens event fields and carries span and thread names, since transport
//! tasks and the engine owner thread interleave in one stream.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level or filter directive, e.g. `info` or `tangible_sync=trace`
    pub level: String,
    /// Let `RUST_LOG` override `level`
    pub use_env: bool,
    pub console: ConsoleFormat,
    pub file: Option<FileConfig>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::at_level("info")
    }
}

impl LogConfig {
    /// Pretty console output at `level`, no files
    pub fn at_level(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            use_env: true,
            console: ConsoleFormat::Pretty,
            file: None,
        }
    }

    /// Warnings only, plain console output
    pub fn testing() -> Self {
        Self {
            console: ConsoleFormat::Plain,
            ..Self::at_level("warn")
        }
    }
}

/// How events are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    /// Human-readable, colored when stdout is a terminal
    #[default]
    Pretty,
    /// Human-readable without colors
    Plain,
    /// One JSON object per line
    Json,
    Off,
}

/// JSON-lines log files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    pub prefix: String,
    pub rotation: RotationStrategy,
}

impl FileConfig {
    pub fn in_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "tangible".to_string(),
            rotation: RotationStrategy::Daily,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    /// One `<prefix>.log`, truncated on start
    Never,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_pretty_info() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert!(config.use_env);
        assert_eq!(config.console, ConsoleFormat::Pretty);
        assert!(config.file.is_none());
    }

    #[test]
    fn test_testing_is_quiet() {
        let config = LogConfig::testing();
        assert_eq!(config.level, "warn");
        assert_eq!(config.console, ConsoleFormat::Plain);
    }

    #[test]
    fn test_file_in_directory_keeps_defaults() {
        let file = FileConfig::in_directory("/var/log/tangible");
        assert_eq!(file.directory, PathBuf::from("/var/log/tangible"));
        assert_eq!(file.prefix, "tangible");
        assert_eq!(file.rotation, RotationStrategy::Daily);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: LogConfig = serde_json::from_str(
            r#"{"level":"trace","console":"json","file":{"prefix":"table","rotation":"never"}}"#,
        )
        .unwrap();
        assert_eq!(config.level, "trace");
        assert_eq!(config.console, ConsoleFormat::Json);

        let file = config.file.unwrap();
        assert_eq!(file.prefix, "table");
        assert_eq!(file.rotation, RotationStrategy::Never);
        assert_eq!(file.directory, PathBuf::from("./logs"));
    }
}
