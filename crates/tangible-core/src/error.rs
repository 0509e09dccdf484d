//! Error types for the tangible runtime

use thiserror::Error;

/// Top-level error type for the tangible runtime
#[derive(Debug, Error)]
pub enum TangibleError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors related to the byte channel to the recognition service
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection to {destination} timed out after {timeout_ms}ms")]
    ConnectTimeout { destination: String, timeout_ms: u64 },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Framing error: {0}")]
    Framing(String),
}

/// Errors related to envelope encoding and decoding
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid message type: {0}")]
    InvalidMessageType(i64),

    #[error("Malformed data: {0}")]
    MalformedData(String),
}

/// Errors raised by the engine and its providers
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine not initialized")]
    NotInitialized,

    #[error("No provider attached")]
    NoProvider,

    #[error("Profile error: {0}")]
    Profile(String),

    #[error("Dispatched action panicked: {0}")]
    ActionPanicked(String),
}

/// Errors related to loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for tangible runtime operations
pub type TangibleResult<T> = Result<T, TangibleError>;
