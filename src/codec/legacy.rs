//! Byte framing for pre-RFC 6455 WebSocket drafts (hixie-75 and hixie-76).
//!
//! Text frames are `0x00 <utf-8 bytes> 0xFF`. The closing handshake is the
//! two-byte sequence `0xFF 0x00`, after which the decoder reports end of
//! stream. Binary (length-prefixed) frames were never used by clients of this
//! protocol and are rejected.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{CodecError, FramingError, ProtocolError, clamp_frame_length};

const FRAME_START: u8 = 0x00;
const FRAME_END: u8 = 0xFF;

/// `tokio_util` codec for legacy WebSocket text frames.
#[derive(Clone, Debug)]
pub struct LegacyFrameCodec {
    max_frame_length: usize,
    closed: bool,
}

impl LegacyFrameCodec {
    /// Construct a codec accepting frames up to `max_frame_length` bytes.
    ///
    /// The limit is clamped to
    /// [`MIN_FRAME_LENGTH`](super::MIN_FRAME_LENGTH)..=[`MAX_FRAME_LENGTH`](super::MAX_FRAME_LENGTH).
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: clamp_frame_length(max_frame_length),
            closed: false,
        }
    }

    /// Return the maximum frame length accepted by this codec.
    #[must_use]
    pub fn max_frame_length(&self) -> usize { self.max_frame_length }

    /// Whether the peer sent the closing handshake.
    #[must_use]
    pub fn is_closed(&self) -> bool { self.closed }
}

impl Default for LegacyFrameCodec {
    fn default() -> Self { Self::new(64 * 1024) }
}

impl Decoder for LegacyFrameCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.closed {
            src.clear();
            return Ok(None);
        }
        let Some(&frame_type) = src.first() else {
            return Ok(None);
        };
        match frame_type {
            FRAME_START => {}
            FRAME_END => {
                if src.len() < 2 {
                    return Ok(None);
                }
                if src[1] == FRAME_START {
                    tracing::debug!("legacy websocket closing handshake received");
                    self.closed = true;
                    src.clear();
                    return Ok(None);
                }
                return Err(CodecError::Protocol(ProtocolError::invalid_payload(
                    "binary legacy frames are not supported",
                ))
                .into());
            }
            other => {
                return Err(CodecError::Protocol(ProtocolError::invalid_payload(format!(
                    "unexpected legacy frame type {other:#04x}"
                )))
                .into());
            }
        }

        match src.iter().skip(1).position(|b| *b == FRAME_END) {
            Some(len) => {
                if len > self.max_frame_length {
                    return Err(oversized(len, self.max_frame_length));
                }
                src.advance(1);
                let payload = src.split_to(len).freeze();
                src.advance(1);
                Ok(Some(payload))
            }
            None => {
                let buffered = src.len() - 1;
                if buffered > self.max_frame_length {
                    return Err(oversized(buffered, self.max_frame_length));
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                tracing::debug!(
                    bytes_received = src.len(),
                    "legacy websocket closed mid-frame"
                );
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "legacy websocket closed mid-frame",
                ))
            }
        }
    }
}

fn oversized(size: usize, max: usize) -> io::Error {
    CodecError::Framing(FramingError::OversizedFrame { size, max }).into()
}

impl Encoder<Bytes> for LegacyFrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_length {
            return Err(oversized(item.len(), self.max_frame_length));
        }
        dst.reserve(item.len() + 2);
        dst.put_u8(FRAME_START);
        dst.put_slice(&item);
        dst.put_u8(FRAME_END);
        Ok(())
    }
}
