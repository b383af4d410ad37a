//! Typed protocol messages.
//!
//! A [`Message`] is the decoded form of one `type:id:namespace:data` frame.
//! The numeric frame type is recoverable through [`Message::kind`]; the data
//! segment is represented by a [`Payload`] variant so handlers never need to
//! re-parse wire text.

use std::fmt;

use serde_json::Value;

use crate::codec::ProtocolError;

/// Event names the client library reserves for its own lifecycle signals.
///
/// Inbound events carrying one of these names are rejected by the codec and
/// outbound events cannot be constructed with them.
pub const RESERVED_EVENTS: [&str; 8] = [
    "message",
    "connect",
    "disconnect",
    "open",
    "close",
    "error",
    "retry",
    "reconnect",
];

/// Return `true` if `name` may not be used as an application event name.
#[must_use]
pub fn is_reserved_event(name: &str) -> bool { RESERVED_EVENTS.contains(&name) }

/// Numeric frame type carried in the first segment of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// `0`: close the session or leave a namespace.
    Disconnect = 0,
    /// `1`: connect (and join a namespace).
    Connect = 1,
    /// `2`: liveness signal.
    Heartbeat = 2,
    /// `3`: opaque text message.
    Text = 3,
    /// `4`: JSON message.
    Json = 4,
    /// `5`: named event with JSON arguments.
    Event = 5,
    /// `6`: acknowledgement of an earlier message id.
    Ack = 6,
    /// `7`: error report.
    Error = 7,
    /// `8`: no-op, used to complete an idle poll.
    Noop = 8,
}

impl MessageKind {
    /// The ASCII digit used on the wire.
    #[must_use]
    pub fn as_digit(self) -> char { char::from(b'0' + self as u8) }

    /// Whether frames of this kind must carry a data segment.
    #[must_use]
    pub fn requires_data(self) -> bool {
        matches!(
            self,
            Self::Text | Self::Json | Self::Event | Self::Ack | Self::Error
        )
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, ProtocolError> {
        Ok(match value {
            0 => Self::Disconnect,
            1 => Self::Connect,
            2 => Self::Heartbeat,
            3 => Self::Text,
            4 => Self::Json,
            5 => Self::Event,
            6 => Self::Ack,
            7 => Self::Error,
            8 => Self::Noop,
            other => {
                return Err(ProtocolError::UnknownMessageType {
                    type_id: u32::from(other),
                });
            }
        })
    }
}

/// Message id segment.
///
/// A trailing `+` on the wire means the sender wants the acknowledgement to
/// carry data rather than merely confirm receipt.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MessageId {
    value: String,
    wants_data: bool,
}

impl MessageId {
    /// Create an id that only requests a bare acknowledgement.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            wants_data: false,
        }
    }

    /// Create an id whose acknowledgement should carry data.
    #[must_use]
    pub fn with_data(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            wants_data: true,
        }
    }

    /// Parse the raw id segment, stripping a trailing `+`.
    #[must_use]
    pub fn parse(segment: &str) -> Option<Self> {
        if segment.is_empty() {
            return None;
        }
        Some(match segment.strip_suffix('+') {
            Some(value) => Self::with_data(value),
            None => Self::new(segment),
        })
    }

    /// The id without the `+` marker.
    #[must_use]
    pub fn value(&self) -> &str { &self.value }

    /// Whether the sender asked for a data-carrying acknowledgement.
    #[must_use]
    pub fn wants_data(&self) -> bool { self.wants_data }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)?;
        if self.wants_data {
            f.write_str("+")?;
        }
        Ok(())
    }
}

/// Decoded data segment of a frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Disconnect,
    Connect {
        /// Query string appended to the namespace (`/chat?token=x`).
        query: Option<String>,
    },
    Heartbeat,
    Text(String),
    Json(Value),
    Event {
        name: String,
        args: Vec<Value>,
    },
    Ack {
        /// Id of the message being acknowledged.
        ack_id: String,
        /// Arguments returned to the original sender, if any.
        args: Option<Vec<Value>>,
    },
    Error {
        reason: String,
        advice: Option<String>,
    },
    Noop,
}

impl Payload {
    /// The frame type this payload is carried in.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Disconnect => MessageKind::Disconnect,
            Self::Connect { .. } => MessageKind::Connect,
            Self::Heartbeat => MessageKind::Heartbeat,
            Self::Text(_) => MessageKind::Text,
            Self::Json(_) => MessageKind::Json,
            Self::Event { .. } => MessageKind::Event,
            Self::Ack { .. } => MessageKind::Ack,
            Self::Error { .. } => MessageKind::Error,
            Self::Noop => MessageKind::Noop,
        }
    }
}

/// A single protocol message.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Optional message id used for acknowledgements.
    pub id: Option<MessageId>,
    /// Namespace endpoint; empty for the default namespace.
    pub namespace: String,
    /// Typed data segment.
    pub payload: Payload,
}

impl Message {
    /// Build a message in the default namespace without an id.
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self {
            id: None,
            namespace: String::new(),
            payload,
        }
    }

    /// Attach a message id.
    #[must_use]
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }

    /// Move the message into `namespace`.
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Frame type of this message.
    #[must_use]
    pub fn kind(&self) -> MessageKind { self.payload.kind() }

    #[must_use]
    pub fn heartbeat() -> Self { Self::new(Payload::Heartbeat) }

    #[must_use]
    pub fn noop() -> Self { Self::new(Payload::Noop) }

    #[must_use]
    pub fn connect() -> Self { Self::new(Payload::Connect { query: None }) }

    #[must_use]
    pub fn disconnect() -> Self { Self::new(Payload::Disconnect) }

    /// Plain text message.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self { Self::new(Payload::Text(text.into())) }

    /// JSON message.
    #[must_use]
    pub fn json(value: Value) -> Self { Self::new(Payload::Json(value)) }

    /// Named event carrying `args`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::ReservedEventName`] if `name` is empty or
    /// reserved by the client library.
    pub fn event(name: impl Into<String>, args: Vec<Value>) -> Result<Self, ProtocolError> {
        let name = name.into();
        if name.is_empty() || is_reserved_event(&name) {
            return Err(ProtocolError::ReservedEventName { name });
        }
        Ok(Self::new(Payload::Event { name, args }))
    }

    /// Acknowledge message `ack_id`, optionally returning data.
    #[must_use]
    pub fn ack(ack_id: impl Into<String>, args: Option<Vec<Value>>) -> Self {
        Self::new(Payload::Ack {
            ack_id: ack_id.into(),
            args,
        })
    }

    /// Error report with an optional advice string.
    #[must_use]
    pub fn error(reason: impl Into<String>, advice: Option<String>) -> Self {
        Self::new(Payload::Error {
            reason: reason.into(),
            advice,
        })
    }
}
