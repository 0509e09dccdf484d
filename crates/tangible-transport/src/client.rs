//! Protocol client for the recognition service
//!
//! [`ProtocolClient`] is the live [`Provider`]: it opens connections through
//! a [`Connector`], stamps and sends envelopes, and routes what the service
//! reports to a [`ProviderSink`].
//!
//! ## Recovery
//!
//! - A transport fault on the current connection closes it (reporting
//!   disconnected if it was still open) and makes one reconnect attempt.
//! - A clean close is reported as disconnected; reconnecting is left to
//!   the owner, typically through [`ProtocolClient::heartbeat`].
//! - Parse errors are logged and the connection stays open.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, trace, warn};

use tangible_core::{
    Connector, Destination, Pattern, Pointer, ProtocolError, Provider, ProviderSink,
    TransportError,
};

use crate::codec::MAX_FRAME_SIZE;
use crate::connection::{ConnectionEvents, ConnectionManager};
use crate::protocol::{Envelope, MessageKind};

/// Process-wide message id counter, never reset
static NEXT_MESSAGE_ID: AtomicU32 = AtomicU32::new(0);

/// Take the next outgoing message id
pub fn next_message_id() -> u32 {
    NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Configuration for a [`ProtocolClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub destination: Destination,
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            destination: Destination::default(),
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

struct ClientShared {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    sink: Weak<dyn ProviderSink>,
    connection: Mutex<Option<Arc<ConnectionManager>>>,
    disposed: AtomicBool,
    this: Weak<ClientShared>,
}

/// Live provider talking to the recognition service
pub struct ProtocolClient {
    shared: Arc<ClientShared>,
}

impl ProtocolClient {
    pub fn new(
        connector: Arc<dyn Connector>,
        config: ClientConfig,
        sink: Weak<dyn ProviderSink>,
    ) -> Self {
        let shared = Arc::new_cyclic(|this| ClientShared {
            config,
            connector,
            sink,
            connection: Mutex::new(None),
            disposed: AtomicBool::new(false),
            this: this.clone(),
        });
        Self { shared }
    }

    /// Whether a connection is currently open
    pub fn is_connected(&self) -> bool {
        self.shared.current().is_some_and(|c| !c.is_closed())
    }

    /// Session id of the current connection
    pub fn session(&self) -> Option<u64> {
        self.shared.current().map(|c| c.session())
    }

    /// Probe the connection, or try to reconnect when there is none
    pub fn heartbeat(&self) {
        if self.is_connected() {
            self.shared.send(Envelope::ping());
        } else {
            warn!(destination = %self.shared.config.destination, "Ping failed, reconnecting");
            self.reconnect();
        }
    }

    /// Drop the current connection, if any, and make one connection attempt
    ///
    /// Returns whether the attempt succeeded.
    pub fn reconnect(&self) -> bool {
        self.shared.drop_connection();
        self.shared.connect()
    }
}

impl ClientShared {
    fn sink(&self) -> Option<Arc<dyn ProviderSink>> {
        self.sink.upgrade()
    }

    fn current(&self) -> Option<Arc<ConnectionManager>> {
        self.connection.lock().clone()
    }

    /// Take the connection out if `session` is still the current one
    fn take_if_current(&self, session: u64) -> Option<Arc<ConnectionManager>> {
        let mut connection = self.connection.lock();
        if connection.as_ref().is_some_and(|c| c.session() == session) {
            connection.take()
        } else {
            None
        }
    }

    fn is_current(&self, session: u64) -> bool {
        self.connection
            .lock()
            .as_ref()
            .is_some_and(|c| c.session() == session)
    }

    #[instrument(skip(self), fields(destination = %self.config.destination))]
    fn connect(&self) -> bool {
        if self.disposed.load(Ordering::SeqCst) {
            debug!("Client disposed, not connecting");
            return false;
        }

        match self.connector.open(&self.config.destination) {
            Ok(channel) => {
                let events: Weak<dyn ConnectionEvents> = self.this.clone();
                let manager = Arc::new(ConnectionManager::with_max_frame_size(
                    channel,
                    events,
                    self.config.max_frame_size,
                ));
                let session = manager.session();

                let previous = self.connection.lock().replace(Arc::clone(&manager));
                if let Some(previous) = previous {
                    previous.close();
                }
                manager.start();

                info!(session, "Connected to recognition service");
                if let Some(sink) = self.sink() {
                    sink.connected();
                }
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to recognition service");
                if let Some(sink) = self.sink() {
                    sink.failed_to_connect();
                }
                false
            }
        }
    }

    /// Close and forget the current connection, reporting the disconnect
    fn drop_connection(&self) {
        let Some(manager) = self.connection.lock().take() else {
            return;
        };
        if !manager.is_closed() {
            manager.close();
            info!(session = manager.session(), "Connection closed");
            if let Some(sink) = self.sink() {
                sink.disconnected();
            }
        }
    }

    fn send(&self, envelope: Envelope) {
        let connection = self.current().filter(|c| !c.is_closed());
        let Some(connection) = connection else {
            error!(kind = %envelope.kind, "Failed to send message, not connected");
            return;
        };

        let envelope = envelope.with_id(next_message_id());
        if let Err(e) = connection.send(&envelope) {
            warn!(
                session = connection.session(),
                message_id = envelope.id,
                error = %e,
                "Failed to send message"
            );
        }
    }

    fn route(&self, session: u64, envelope: Envelope) {
        if !envelope.status {
            error!(
                session,
                kind = %envelope.kind,
                message_id = envelope.id,
                debug_text = envelope.debug_text.as_deref().unwrap_or(""),
                "Service reported failure"
            );
            return;
        }

        let Some(sink) = self.sink() else {
            return;
        };

        match envelope.kind {
            MessageKind::Update => {
                let tangibles = envelope.tangibles.unwrap_or_default();
                trace!(session, count = tangibles.len(), "Tangible snapshot");
                sink.tangibles_updated(tangibles);
            }
            MessageKind::Patterns => {
                let patterns = envelope.patterns.unwrap_or_default();
                debug!(session, count = patterns.len(), "Pattern set received");
                sink.patterns_updated(patterns);
            }
            MessageKind::None => trace!(session, "Keep-alive"),
            other => debug!(session, kind = %other, "Ignoring message"),
        }
    }
}

impl ConnectionEvents for ClientShared {
    fn on_message(&self, session: u64, envelope: Envelope) {
        if !self.is_current(session) {
            trace!(session, "Ignoring message from stale session");
            return;
        }
        self.route(session, envelope);
    }

    fn on_parse_error(&self, session: u64, error: ProtocolError, raw: String) {
        error!(session, error = %error, raw = %raw, "Parse error");
    }

    fn on_closed(&self, session: u64) {
        if self.take_if_current(session).is_none() {
            return;
        }
        info!(session, "Connection closed by the service");
        if let Some(sink) = self.sink() {
            sink.disconnected();
        }
    }

    fn on_error(&self, session: u64, error: TransportError) {
        let Some(manager) = self.take_if_current(session) else {
            return;
        };
        error!(session, error = %error, "Unhandled connection error");

        if !manager.is_closed() {
            manager.close();
            if let Some(sink) = self.sink() {
                sink.disconnected();
            }
        }
        self.connect();
    }
}

impl Provider for ProtocolClient {
    fn start_provider(&self) {
        self.shared.disposed.store(false, Ordering::SeqCst);
        if self.is_connected() {
            debug!("Already connected");
            return;
        }
        self.shared.connect();
    }

    fn set_patterns(&self, patterns: Vec<Pattern>) {
        self.shared
            .send(Envelope::new(MessageKind::Patterns).with_patterns(patterns));
    }

    fn request_patterns(&self) {
        self.shared.send(Envelope::new(MessageKind::Patterns));
    }

    fn update_pointers(&self, pointers: Vec<Pointer>) {
        self.shared
            .send(Envelope::new(MessageKind::Update).with_pointers(pointers));
    }

    fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.drop_connection();
    }
}

impl Drop for ProtocolClient {
    fn drop(&mut self) {
        self.dispose();
    }
}
