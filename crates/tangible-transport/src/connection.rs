//! Connection management for the recognition service
//!
//! A [`ConnectionManager`] turns one raw [`Channel`] into a stream of
//! [`Envelope`]s. It owns the frame codec for that channel, decodes every
//! completed payload and hands the outcome to a [`ConnectionEvents`]
//! handler tagged with the manager's session id.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use tangible_core::{
    Channel, ChannelHandlers, Destination, ProtocolError, TangibleResult, TransportError,
};

use crate::codec::{FrameCodec, MAX_FRAME_SIZE, encode_frame};
use crate::protocol::{DecodeResult, Envelope};

/// Source of unique session ids
static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Receiver of everything a [`ConnectionManager`] observes
///
/// Methods are called from the channel's transport thread. The `session`
/// argument identifies the manager, so a handler that has replaced its
/// connection can recognize and ignore callbacks from the old one.
pub trait ConnectionEvents: Send + Sync {
    /// A payload decoded into an envelope
    fn on_message(&self, session: u64, envelope: Envelope);

    /// A payload could not be decoded; the connection stays open
    fn on_parse_error(&self, session: u64, error: ProtocolError, raw: String);

    /// The channel closed. Fires at most once per session.
    fn on_closed(&self, session: u64);

    /// A transport fault, a framing fault, or a failed send
    fn on_error(&self, session: u64, error: TransportError);

    /// Every non-empty payload before it is decoded
    fn on_raw_payload(&self, _session: u64, _payload: &[u8]) {}
}

/// State shared with the channel callbacks
struct ManagerInner {
    session: u64,
    codec: Mutex<FrameCodec>,
    max_frame_size: usize,
    events: Weak<dyn ConnectionEvents>,
    closed_reported: AtomicBool,
}

impl ManagerInner {
    fn events(&self) -> Option<Arc<dyn ConnectionEvents>> {
        self.events.upgrade()
    }

    fn receive(&self, data: &[u8]) {
        let mut payloads = Vec::new();
        let framing = {
            let mut codec = self.codec.lock();
            codec.consume(data, |payload| payloads.push(payload))
        };

        for payload in payloads {
            self.handle_payload(payload);
        }

        if let Err(e) = framing {
            warn!(session = self.session, error = %e, "Discarding corrupt stream data");
            if let Some(events) = self.events() {
                events.on_error(self.session, TransportError::Framing(e.to_string()));
            }
        }
    }

    fn handle_payload(&self, payload: Bytes) {
        if payload.is_empty() {
            trace!(session = self.session, "Keep-alive frame");
            return;
        }

        let Some(events) = self.events() else {
            return;
        };
        events.on_raw_payload(self.session, &payload);

        match Envelope::try_deserialize(&payload) {
            DecodeResult::Decoded(envelope) => {
                trace!(
                    session = self.session,
                    kind = %envelope.kind,
                    message_id = envelope.id,
                    "Envelope received"
                );
                events.on_message(self.session, envelope);
            }
            failure => {
                let raw = String::from_utf8_lossy(&payload).into_owned();
                if let Err(error) = failure.into_result() {
                    events.on_parse_error(self.session, error, raw);
                }
            }
        }
    }

    fn closed(&self) {
        if self.closed_reported.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(session = self.session, "Channel closed");
        if let Some(events) = self.events() {
            events.on_closed(self.session);
        }
    }

    fn error(&self, error: TransportError) {
        if let Some(events) = self.events() {
            events.on_error(self.session, error);
        }
    }
}

/// Translates between a raw channel and envelopes
pub struct ConnectionManager {
    channel: Arc<dyn Channel>,
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    /// Wrap a channel with the default frame size limit
    ///
    /// Nothing is read until [`start`](Self::start) binds the channel.
    pub fn new(channel: Arc<dyn Channel>, events: Weak<dyn ConnectionEvents>) -> Self {
        Self::with_max_frame_size(channel, events, MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(
        channel: Arc<dyn Channel>,
        events: Weak<dyn ConnectionEvents>,
        max_frame_size: usize,
    ) -> Self {
        let session = NEXT_SESSION.fetch_add(1, Ordering::Relaxed);
        Self {
            channel,
            inner: Arc::new(ManagerInner {
                session,
                codec: Mutex::new(FrameCodec::with_max_frame_size(max_frame_size)),
                max_frame_size,
                events,
                closed_reported: AtomicBool::new(false),
            }),
        }
    }

    /// Bind the channel callbacks and begin receiving
    pub fn start(&self) {
        let on_receive = Arc::clone(&self.inner);
        let on_closed = Arc::clone(&self.inner);
        let on_error = Arc::clone(&self.inner);

        self.channel.bind(ChannelHandlers {
            on_receive: Box::new(move |data| on_receive.receive(data)),
            on_closed: Box::new(move || on_closed.closed()),
            on_error: Box::new(move |error| on_error.error(error)),
        });

        debug!(
            session = self.inner.session,
            destination = %self.channel.destination(),
            "Connection started"
        );
    }

    /// Unique id of this connection
    pub fn session(&self) -> u64 {
        self.inner.session
    }

    pub fn destination(&self) -> &Destination {
        self.channel.destination()
    }

    /// Serialize, frame and send an envelope
    ///
    /// Transport failures are also reported through
    /// [`ConnectionEvents::on_error`].
    pub fn send(&self, envelope: &Envelope) -> TangibleResult<()> {
        let text = envelope.serialize()?;
        let frame = encode_frame(text.as_bytes(), self.inner.max_frame_size)
            .map_err(|e| TransportError::Framing(e.to_string()))?;

        if let Err(e) = self.channel.send(frame) {
            warn!(
                session = self.inner.session,
                message_id = envelope.id,
                error = %e,
                "Send failed"
            );
            self.inner.error(e.clone());
            return Err(e.into());
        }

        trace!(
            session = self.inner.session,
            kind = %envelope.kind,
            message_id = envelope.id,
            "Envelope sent"
        );
        Ok(())
    }

    /// Close the underlying channel. Safe to call more than once.
    pub fn close(&self) {
        self.channel.close();
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("session", &self.inner.session)
            .field("destination", self.channel.destination())
            .field("closed", &self.channel.is_closed())
            .finish()
    }
}
