//! Engine configuration
//!
//! Loadable from TOML:
//!
//! ```toml
//! mode = "service"
//! host = "127.0.0.1"
//! port = 4949
//! connect_timeout_ms = 2000
//! max_frame_size = 1048576
//! log_level = "info"
//! # profile_path = "profiles/table.json"   # simulator only
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tangible_core::{ConfigError, DEFAULT_PORT, Destination};
use tangible_transport::{ClientConfig, MAX_FRAME_SIZE};

/// Which provider backs the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    /// The recognition service over TCP
    #[default]
    Service,
    /// The offline simulator
    Simulator,
}

impl fmt::Display for ProviderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service => write!(f, "service"),
            Self::Simulator => write!(f, "simulator"),
        }
    }
}

/// Configuration for a [`TangibleEngine`](crate::TangibleEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: ProviderMode,
    /// Host of the recognition service
    pub host: String,
    /// Port of the recognition service
    pub port: u16,
    /// Bound on one connection attempt
    pub connect_timeout_ms: u64,
    /// Largest accepted frame payload
    pub max_frame_size: usize,
    /// Engine profile for the simulator
    pub profile_path: Option<PathBuf>,
    /// Default log level (overridden by `RUST_LOG`)
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ProviderMode::Service,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            connect_timeout_ms: 2000,
            max_frame_size: MAX_FRAME_SIZE,
            profile_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Configuration for the offline simulator
    pub fn simulator() -> Self {
        Self {
            mode: ProviderMode::Simulator,
            ..Self::default()
        }
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must not be 0".into()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("connect_timeout_ms must be positive".into()));
        }
        if self.max_frame_size == 0 || self.max_frame_size > u32::MAX as usize {
            return Err(ConfigError::Invalid(format!(
                "max_frame_size must be between 1 and {}",
                u32::MAX
            )));
        }
        Ok(())
    }

    pub fn with_mode(mut self, mode: ProviderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn with_profile_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_path = Some(path.into());
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn destination(&self) -> Destination {
        Destination::new(self.host.clone(), self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Settings for the protocol client
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_destination(self.destination())
            .with_max_frame_size(self.max_frame_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.mode, ProviderMode::Service);
        assert_eq!(config.destination(), Destination::default());
        assert_eq!(config.connect_timeout(), Duration::from_secs(2));
        assert_eq!(config.max_frame_size, 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            mode = "simulator"
            port = 5000
            profile_path = "table.json"
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, ProviderMode::Simulator);
        assert_eq!(config.port, 5000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.profile_path, Some(PathBuf::from("table.json")));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            EngineConfig::from_toml_str("port = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("mode = \"carrier-pigeon\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("host = \"  \""),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "host = \"10.0.0.5\"\nconnect_timeout_ms = 500\n").unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.connect_timeout(), Duration::from_millis(500));

        let missing = EngineConfig::from_file(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_builders_and_client_config() {
        let config = EngineConfig::default()
            .with_host("192.168.1.20")
            .with_port(7000)
            .with_max_frame_size(4096);
        let client = config.client_config();
        assert_eq!(client.destination, Destination::new("192.168.1.20", 7000));
        assert_eq!(client.max_frame_size, 4096);
    }
}
