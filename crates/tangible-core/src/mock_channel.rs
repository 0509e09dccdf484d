//! Mock channel implementation for testing
//!
//! Provides an in-memory [`Channel`] and [`Connector`] so the connection
//! manager, protocol client and engine can be exercised without a running
//! recognition service.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tangible_core::{Connector, Destination, MockConnector};
//!
//! let connector = MockConnector::new();
//! let channel = connector.open(&Destination::default()).unwrap();
//!
//! // Bytes "arriving" from the service
//! connector.last_channel().unwrap().inject(b"...");
//!
//! // Everything the client wrote
//! let frames = connector.last_channel().unwrap().sent();
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use crate::channel::{Channel, ChannelHandlers, Connector, Destination};
use crate::error::TransportError;

/// An in-memory channel
///
/// Handlers run synchronously on the thread that calls [`inject`],
/// [`remote_close`] or [`raise_error`], which stands in for the transport
/// thread in tests.
///
/// [`inject`]: MockChannel::inject
/// [`remote_close`]: MockChannel::remote_close
/// [`raise_error`]: MockChannel::raise_error
pub struct MockChannel {
    destination: Destination,
    handlers: RwLock<Option<Arc<ChannelHandlers>>>,
    sent: Mutex<Vec<Bytes>>,
    closed: AtomicBool,
    fail_sends: AtomicBool,
}

impl MockChannel {
    pub fn new(destination: Destination) -> Self {
        Self {
            destination,
            handlers: RwLock::new(None),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
        }
    }

    fn handlers(&self) -> Option<Arc<ChannelHandlers>> {
        self.handlers.read().clone()
    }

    /// Deliver bytes as if they were read from the remote end
    pub fn inject(&self, data: &[u8]) {
        if self.is_closed() {
            return;
        }
        if let Some(handlers) = self.handlers() {
            (handlers.on_receive)(data);
        }
    }

    /// Simulate the remote end closing the connection
    pub fn remote_close(&self) {
        self.mark_closed();
    }

    /// Simulate a transport fault without closing the channel
    pub fn raise_error(&self, error: TransportError) {
        if let Some(handlers) = self.handlers() {
            (handlers.on_error)(error);
        }
    }

    /// Make subsequent sends fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Every chunk written so far, in order
    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    /// Drain the record of written chunks
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.sent.lock())
    }

    fn mark_closed(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handlers) = self.handlers() {
            (handlers.on_closed)();
        }
    }
}

impl Channel for MockChannel {
    fn bind(&self, handlers: ChannelHandlers) {
        *self.handlers.write() = Some(Arc::new(handlers));
    }

    fn send(&self, data: Bytes) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("mock send failure".into()));
        }
        self.sent.lock().push(data);
        Ok(())
    }

    fn close(&self) {
        // A local close ends the read loop, which reports closure like a real socket
        self.mark_closed();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn destination(&self) -> &Destination {
        &self.destination
    }
}

/// Connector handing out [`MockChannel`]s
#[derive(Default)]
pub struct MockConnector {
    channels: Mutex<Vec<Arc<MockChannel>>>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent connection attempts fail
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of `open` calls, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Every channel opened so far
    pub fn channels(&self) -> Vec<Arc<MockChannel>> {
        self.channels.lock().clone()
    }

    /// The most recently opened channel
    pub fn last_channel(&self) -> Option<Arc<MockChannel>> {
        self.channels.lock().last().cloned()
    }
}

impl Connector for MockConnector {
    fn open(&self, destination: &Destination) -> Result<Arc<dyn Channel>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(format!(
                "{} refused the connection",
                destination
            )));
        }
        let channel = Arc::new(MockChannel::new(destination.clone()));
        self.channels.lock().push(Arc::clone(&channel));
        Ok(channel)
    }
}
