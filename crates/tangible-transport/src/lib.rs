//! # Tangible Transport
//!
//! Transport layer between the tangible runtime and the recognition service.
//!
//! Turns a duplex byte channel into typed envelopes and back, and drives
//! the connection lifecycle on behalf of the engine.
//!
//! ## Features
//!
//! - Length-prefixed framing that tolerates arbitrary chunking
//! - JSON envelopes with lossless decode classification
//! - Session-tagged connection management with exactly-once close reporting
//! - tokio-backed TCP channel with non-blocking sends
//! - [`ProtocolClient`], the live [`Provider`](tangible_core::Provider)
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tangible_core::{Destination, Provider};
//! use tangible_transport::{ClientConfig, ProtocolClient, TcpConnector};
//!
//! let connector = Arc::new(TcpConnector::new(runtime.handle().clone()));
//! let config = ClientConfig::default().with_destination(Destination::localhost(4949));
//! let client = ProtocolClient::new(connector, config, sink);
//!
//! client.start_provider();
//! client.request_patterns();
//! ```

pub mod client;
pub mod codec;
pub mod connection;
pub mod protocol;
pub mod tcp;

// Re-export main types
pub use client::{ClientConfig, ProtocolClient, next_message_id};
pub use codec::{FRAME_HEADER_LEN, FrameCodec, FramingError, MAX_FRAME_SIZE, encode_frame};
pub use connection::{ConnectionEvents, ConnectionManager};
pub use protocol::{DecodeResult, Envelope, MessageKind};
pub use tcp::{DEFAULT_CONNECT_TIMEOUT, TcpChannel, TcpConnector};
