//! Wire codec for the colon-delimited frame format.
//!
//! Every frame has the shape `type:id:namespace:data`. Several frames may be
//! multiplexed into one transport payload by prefixing each with
//! `\u{fffd}<byte length>\u{fffd}`; older clients use the raw `\xff\xfd`
//! delimiter instead, which is accepted on decode but never emitted.
//!
//! # Error Handling
//!
//! Decoding failures are reported as [`CodecError`]. None of them alter
//! session state: the transport drops the offending request or connection and
//! the session survives until its liveness deadline. See the [`error`] module.
//!
//! The [`legacy`] module provides a `tokio_util` codec for the byte framing
//! used by pre-RFC 6455 WebSocket drafts.

use std::{borrow::Cow, fmt::Write as _};

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Message, MessageId, MessageKind, Payload, is_reserved_event};

pub mod error;
pub mod legacy;

pub use error::{CodecError, FramingError, ProtocolError, RecoveryPolicy};
pub use legacy::LegacyFrameCodec;

/// Batch delimiter emitted by this codec: U+FFFD encoded as UTF-8.
pub const FRAME_DELIMITER: &[u8] = b"\xef\xbf\xbd";

/// Raw two-byte batch delimiter sent by older clients.
pub const RAW_FRAME_DELIMITER: &[u8] = b"\xff\xfd";

/// Minimum frame length in bytes.
///
/// Frame lengths passed to codec constructors are clamped to at least this
/// value.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Maximum frame length in bytes (16 MiB).
///
/// Frame lengths passed to codec constructors are clamped to at most this
/// value to prevent unbounded memory allocation.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

#[derive(Serialize)]
struct EventBody<'a> {
    name: &'a str,
    args: &'a [Value],
}

#[derive(Deserialize)]
struct EventFrame {
    name: String,
    args: Vec<Value>,
}

fn malformed(reason: &'static str) -> CodecError {
    FramingError::MalformedFrame { reason }.into()
}

fn header_segment(raw: &[u8]) -> Result<&str, CodecError> {
    std::str::from_utf8(raw).map_err(|_| malformed("header segment is not valid UTF-8"))
}

fn parse_json(data: &str) -> Result<Value, CodecError> {
    serde_json::from_str(data.trim_start())
        .map_err(|e| ProtocolError::invalid_payload(e.to_string()).into())
}

/// Decode a single frame.
///
/// # Errors
///
/// Returns [`FramingError::MalformedFrame`] when the segment layout is wrong,
/// [`ProtocolError::UnknownMessageType`] for a type digit outside `0..=8`, and
/// [`ProtocolError::InvalidPayload`] or [`ProtocolError::ReservedEventName`]
/// when the data segment cannot be interpreted.
///
/// # Examples
///
/// ```
/// use socketframe::{codec, message::Payload};
///
/// let msg = codec::decode(b"2::").unwrap();
/// assert_eq!(msg.payload, Payload::Heartbeat);
/// ```
pub fn decode(frame: &[u8]) -> Result<Message, CodecError> {
    let mut segments = frame.splitn(4, |b| *b == b':');
    let kind = match segments.next() {
        Some([digit]) if digit.is_ascii_digit() => MessageKind::try_from(digit - b'0')?,
        _ => return Err(malformed("type must be a single digit")),
    };
    let id = segments
        .next()
        .ok_or_else(|| malformed("missing id separator"))?;
    let id = MessageId::parse(header_segment(id)?);
    let endpoint = match segments.next() {
        Some(raw) => header_segment(raw)?,
        None => return Err(malformed("missing namespace separator")),
    };
    let data = segments.next();
    if kind.requires_data() && data.is_none() {
        return Err(malformed("missing data segment"));
    }
    let data: Cow<'_, str> = String::from_utf8_lossy(data.unwrap_or_default());

    let (namespace, payload) = match kind {
        MessageKind::Disconnect => (endpoint, Payload::Disconnect),
        MessageKind::Connect => match endpoint.split_once('?') {
            Some((ns, query)) => (
                ns,
                Payload::Connect {
                    query: Some(query.to_owned()),
                },
            ),
            None => (endpoint, Payload::Connect { query: None }),
        },
        MessageKind::Heartbeat => (endpoint, Payload::Heartbeat),
        MessageKind::Noop => (endpoint, Payload::Noop),
        MessageKind::Text => (endpoint, Payload::Text(data.into_owned())),
        MessageKind::Json => (endpoint, Payload::Json(parse_json(&data)?)),
        MessageKind::Event => (endpoint, decode_event(&data)?),
        MessageKind::Ack => (endpoint, decode_ack(&data)?),
        MessageKind::Error => {
            let (reason, advice) = match data.split_once('+') {
                Some((reason, advice)) => (reason.to_owned(), Some(advice.to_owned())),
                None => (data.to_string(), None),
            };
            (endpoint, Payload::Error { reason, advice })
        }
    };

    Ok(Message {
        id,
        namespace: namespace.to_owned(),
        payload,
    })
}

fn decode_event(data: &str) -> Result<Payload, CodecError> {
    let frame: EventFrame = serde_json::from_str(data.trim_start())
        .map_err(|e| ProtocolError::invalid_payload(format!("improper event: {e}")))?;
    if frame.name.is_empty() || is_reserved_event(&frame.name) {
        return Err(ProtocolError::ReservedEventName { name: frame.name }.into());
    }
    Ok(Payload::Event {
        name: frame.name,
        args: frame.args,
    })
}

fn decode_ack(data: &str) -> Result<Payload, CodecError> {
    let Some((ack_id, raw_args)) = data.split_once('+') else {
        return Ok(Payload::Ack {
            ack_id: data.to_owned(),
            args: None,
        });
    };
    let args = match parse_json(raw_args)? {
        Value::Array(args) => args,
        other => vec![other],
    };
    Ok(Payload::Ack {
        ack_id: ack_id.to_owned(),
        args: Some(args),
    })
}

/// Encode a single message into its frame text.
///
/// # Examples
///
/// ```
/// use socketframe::{codec, message::Message};
///
/// let event = Message::event("foo", vec![]).unwrap();
/// assert_eq!(&codec::encode(&event)[..], br#"5:::{"name":"foo","args":[]}"#);
/// assert_eq!(&codec::encode(&Message::heartbeat())[..], b"2::");
/// ```
#[must_use]
pub fn encode(message: &Message) -> Bytes {
    let mut out = String::with_capacity(16);
    out.push(message.kind().as_digit());
    out.push(':');
    if let Some(id) = &message.id {
        let _ = write!(out, "{id}");
    }
    out.push(':');
    out.push_str(&message.namespace);

    match &message.payload {
        Payload::Disconnect | Payload::Heartbeat | Payload::Noop => {}
        Payload::Connect { query } => {
            if let Some(query) = query {
                out.push('?');
                out.push_str(query);
            }
        }
        Payload::Text(text) => {
            out.push(':');
            out.push_str(text);
        }
        Payload::Json(value) => {
            out.push(':');
            out.push_str(&value.to_string());
        }
        Payload::Event { name, args } => {
            out.push(':');
            let body = EventBody { name, args };
            // Serialising borrowed strings and `Value`s cannot fail.
            out.push_str(&serde_json::to_string(&body).unwrap_or_default());
        }
        Payload::Ack { ack_id, args } => {
            out.push(':');
            out.push_str(ack_id);
            if let Some(args) = args {
                out.push('+');
                out.push_str(&Value::Array(args.clone()).to_string());
            }
        }
        Payload::Error { reason, advice } => {
            out.push(':');
            out.push_str(reason);
            if let Some(advice) = advice {
                out.push('+');
                out.push_str(advice);
            }
        }
    }
    Bytes::from(out)
}

/// Split a transport payload into its messages.
///
/// A payload that does not start with a batch delimiter is decoded as one
/// frame. Otherwise the delimiter found at the start is used for the whole
/// payload and every sub-frame length is interpreted in bytes.
///
/// # Errors
///
/// Returns [`FramingError::InvalidLength`] for a non-numeric or zero length,
/// [`FramingError::FrameLengthMismatch`] when a declared length does not line
/// up with the following delimiter, and any error from [`decode`].
pub fn decode_batch(buffer: &[u8]) -> Result<Vec<Message>, CodecError> {
    let delimiter = if buffer.starts_with(FRAME_DELIMITER) {
        FRAME_DELIMITER
    } else if buffer.starts_with(RAW_FRAME_DELIMITER) {
        RAW_FRAME_DELIMITER
    } else {
        return Ok(vec![decode(buffer)?]);
    };

    let mut messages = Vec::new();
    let mut rest = buffer;
    while !rest.is_empty() {
        let Some(after_open) = rest.strip_prefix(delimiter) else {
            return Err(malformed("batch frame does not start with a delimiter"));
        };
        let close = find(after_open, delimiter).ok_or(FramingError::InvalidLength)?;
        let declared = std::str::from_utf8(&after_open[..close])
            .ok()
            .and_then(|digits| digits.parse::<usize>().ok())
            .filter(|len| *len > 0)
            .ok_or(FramingError::InvalidLength)?;
        let body = &after_open[close + delimiter.len()..];
        let Some(frame) = body.get(..declared) else {
            return Err(FramingError::FrameLengthMismatch {
                declared,
                actual: body.len(),
            }
            .into());
        };
        let tail = &body[declared..];
        if !tail.is_empty() && !tail.starts_with(delimiter) {
            let actual = declared + find(tail, delimiter).unwrap_or(tail.len());
            return Err(FramingError::FrameLengthMismatch { declared, actual }.into());
        }
        messages.push(decode(frame)?);
        rest = tail;
    }
    Ok(messages)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Combine messages into one transport payload.
///
/// A single message is returned as its bare frame; two or more are framed
/// with [`FRAME_DELIMITER`] and their byte lengths.
///
/// # Errors
///
/// Returns [`FramingError::EmptyBatch`] if `messages` is empty.
pub fn encode_batch(messages: &[Message]) -> Result<Bytes, CodecError> {
    match messages {
        [] => Err(FramingError::EmptyBatch.into()),
        [single] => Ok(encode(single)),
        many => {
            let mut out = BytesMut::new();
            for message in many {
                let frame = encode(message);
                out.put_slice(FRAME_DELIMITER);
                out.put_slice(frame.len().to_string().as_bytes());
                out.put_slice(FRAME_DELIMITER);
                out.put_slice(&frame);
            }
            Ok(out.freeze())
        }
    }
}
