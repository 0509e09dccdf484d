//! Length-prefixed frame codec
//!
//! ## Frame Wire Format
//! ```text
//! [payload_len: u32 BE (4 bytes)][payload: payload_len bytes]
//! ```
//!
//! The codec accumulates raw bytes across reads and yields complete payloads
//! regardless of how the transport chunked them. Decode state spans calls,
//! so a codec must only be fed from one place at a time.

use bytes::{Buf, Bytes, BytesMut};

/// Size of the length prefix
pub const FRAME_HEADER_LEN: usize = 4;

/// Default upper bound for a single payload (1 MB)
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors that can occur during framing
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// Stateful decoder and stateless encoder for length-prefixed frames
#[derive(Debug)]
pub struct FrameCodec {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a codec with the default size limit
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create a codec rejecting payloads larger than `max_frame_size`
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Feed raw bytes and emit every payload completed by them, in order
    ///
    /// Partial data is kept for the next call. When a header announces a
    /// payload above the limit the stream cannot be resynchronized, so all
    /// buffered bytes are discarded and an error is returned; payloads
    /// completed earlier in the same call have already been emitted and
    /// the next call starts from a clean state.
    pub fn consume<F>(&mut self, data: &[u8], mut on_payload: F) -> Result<(), FramingError>
    where
        F: FnMut(Bytes),
    {
        self.buffer.extend_from_slice(data);

        while self.buffer.len() >= FRAME_HEADER_LEN {
            let len = u32::from_be_bytes([
                self.buffer[0],
                self.buffer[1],
                self.buffer[2],
                self.buffer[3],
            ]) as usize;

            if len > self.max_frame_size {
                self.buffer.clear();
                return Err(FramingError::FrameTooLarge {
                    size: len,
                    max: self.max_frame_size,
                });
            }

            if self.buffer.len() < FRAME_HEADER_LEN + len {
                break;
            }

            self.buffer.advance(FRAME_HEADER_LEN);
            on_payload(self.buffer.split_to(len).freeze());
        }

        Ok(())
    }

    /// Encode a payload as a frame
    pub fn create_frame(&self, payload: &[u8]) -> Result<Bytes, FramingError> {
        encode_frame(payload, self.max_frame_size)
    }

    /// Bytes held from an incomplete frame
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Length-prefix a payload for transmission
pub fn encode_frame(payload: &[u8], max_frame_size: usize) -> Result<Bytes, FramingError> {
    if payload.len() > max_frame_size {
        return Err(FramingError::FrameTooLarge {
            size: payload.len(),
            max: max_frame_size,
        });
    }

    let len = payload.len() as u32;
    let mut framed = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(payload);

    Ok(framed.freeze())
}
