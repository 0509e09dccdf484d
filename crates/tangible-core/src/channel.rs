//! Duplex byte channel abstraction
//!
//! The [`Channel`] trait is the boundary between the protocol stack and
//! whatever actually moves bytes to the recognition service (a TCP socket,
//! a named pipe, an in-memory pipe for tests). Incoming data, closure and
//! faults are delivered through [`ChannelHandlers`] from the channel's own
//! transport thread.
//!
//! ## Implementations
//!
//! - [`MockChannel`](crate::mock_channel::MockChannel): in-memory channel for tests
//! - `TcpChannel`: tokio-backed TCP socket (in tangible-transport)

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Default port of the local recognition service
pub const DEFAULT_PORT: u16 = 4949;

/// Where a channel connects to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub host: String,
    pub port: u16,
}

impl Destination {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The service on the loopback interface
    pub fn localhost(port: u16) -> Self {
        Self::new("127.0.0.1", port)
    }
}

impl Default for Destination {
    fn default() -> Self {
        Self::localhost(DEFAULT_PORT)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Called with every chunk of bytes read from the channel
pub type ReceiveHandler = Box<dyn Fn(&[u8]) + Send + Sync>;
/// Called when the channel closes
pub type ClosedHandler = Box<dyn Fn() + Send + Sync>;
/// Called when the channel hits a transport fault
pub type ErrorHandler = Box<dyn Fn(TransportError) + Send + Sync>;

/// Callbacks a channel invokes from its transport thread
pub struct ChannelHandlers {
    pub on_receive: ReceiveHandler,
    pub on_closed: ClosedHandler,
    pub on_error: ErrorHandler,
}

impl ChannelHandlers {
    /// Handlers that drop everything
    pub fn noop() -> Self {
        Self {
            on_receive: Box::new(|_| {}),
            on_closed: Box::new(|| {}),
            on_error: Box::new(|_| {}),
        }
    }
}

impl fmt::Debug for ChannelHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandlers").finish_non_exhaustive()
    }
}

/// An open duplex byte channel
///
/// Implementations may invoke the bound handlers concurrently from their
/// own threads; callers must tolerate that.
pub trait Channel: Send + Sync {
    /// Install the callbacks for incoming bytes, closure and faults
    ///
    /// Replaces previously bound handlers. Bytes received before the first
    /// bind may be dropped.
    fn bind(&self, handlers: ChannelHandlers);

    /// Queue bytes for transmission
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed or the write fails.
    fn send(&self, data: Bytes) -> Result<(), TransportError>;

    /// Close the channel. Safe to call more than once.
    fn close(&self);

    /// Whether the channel has been closed, locally or by the remote end
    fn is_closed(&self) -> bool;

    /// The remote end this channel is connected to
    fn destination(&self) -> &Destination;
}

/// Opens fresh channels to a destination
///
/// One call is one bounded connection attempt; retry policy lives with
/// the caller.
pub trait Connector: Send + Sync {
    /// Open a new channel
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    fn open(&self, destination: &Destination) -> Result<Arc<dyn Channel>, TransportError>;
}
