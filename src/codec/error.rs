//! Error types for the codec layer.
//!
//! This module separates framing errors (batch delimiters, length prefixes and
//! segment layout) from protocol errors (semantic violations once a frame has
//! been split into its segments). I/O errors only arise from the legacy byte
//! codec.
//!
//! # Recovery Policies
//!
//! Each error has a default recovery policy accessible via
//! [`CodecError::default_recovery_policy`]:
//!
//! - [`RecoveryPolicy::Drop`]: Discard the offending request or connection but keep the session.
//! - [`RecoveryPolicy::Disconnect`]: Terminate the connection; the transport is unusable.
//!
//! No codec error ever changes session state.

use std::io;

use thiserror::Error;

/// Recovery policies for codec errors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecoveryPolicy {
    /// Drop the malformed input and leave the session untouched.
    #[default]
    Drop,
    /// Close the underlying connection.
    Disconnect,
}

/// Framing-level errors raised while splitting frames or batches.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The frame does not follow the `type:id:namespace:data` layout.
    #[error("malformed frame: {reason}")]
    MalformedFrame {
        /// Short description of the violated rule.
        reason: &'static str,
    },

    /// A batch length prefix disagrees with the bytes that follow it.
    #[error("batch frame length mismatch: declared {declared}, found {actual}")]
    FrameLengthMismatch {
        /// Length declared by the prefix.
        declared: usize,
        /// Bytes actually available before the next delimiter.
        actual: usize,
    },

    /// A batch length prefix is not a positive decimal number.
    #[error("invalid batch length prefix")]
    InvalidLength,

    /// An empty batch was submitted for encoding.
    #[error("cannot encode an empty batch")]
    EmptyBatch,

    /// Legacy frame exceeded the configured maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Bytes buffered so far.
        size: usize,
        /// Maximum allowed frame size.
        max: usize,
    },
}

/// Protocol-level errors occurring after the frame segments are known.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Type digit outside `0..=8`.
    #[error("unknown message type: {type_id}")]
    UnknownMessageType {
        /// Message type identifier that was not recognised.
        type_id: u32,
    },

    /// Data segment could not be interpreted for the frame type.
    #[error("invalid payload: {reason}")]
    InvalidPayload {
        /// Description of the payload problem.
        reason: String,
    },

    /// Event name is empty or reserved by the client library.
    #[error("reserved or empty event name: {name:?}")]
    ReservedEventName {
        /// Rejected event name.
        name: String,
    },
}

impl ProtocolError {
    pub(crate) fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }
}

/// Top-level codec error taxonomy.
///
/// # Examples
///
/// ```
/// use socketframe::codec::{CodecError, FramingError, RecoveryPolicy};
///
/// let err = CodecError::Framing(FramingError::InvalidLength);
/// assert_eq!(err.default_recovery_policy(), RecoveryPolicy::Drop);
/// assert!(!err.should_disconnect());
/// ```
#[derive(Debug, Error)]
pub enum CodecError {
    /// Framing layer error.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// Protocol layer error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Transport layer I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Returns the recommended recovery policy for this error.
    ///
    /// | Error Type | Policy |
    /// |------------|--------|
    /// | `Framing::OversizedFrame` | `Disconnect` |
    /// | Other `Framing` errors | `Drop` |
    /// | All `Protocol` errors | `Drop` |
    /// | All `Io` errors | `Disconnect` |
    #[must_use]
    pub fn default_recovery_policy(&self) -> RecoveryPolicy {
        match self {
            Self::Framing(FramingError::OversizedFrame { .. }) | Self::Io(_) => {
                RecoveryPolicy::Disconnect
            }
            Self::Framing(_) | Self::Protocol(_) => RecoveryPolicy::Drop,
        }
    }

    /// Returns true if the connection should be terminated.
    #[must_use]
    pub fn should_disconnect(&self) -> bool {
        self.default_recovery_policy() == RecoveryPolicy::Disconnect
    }

    /// Returns the error category as a string for logging and metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Framing(_) => "framing",
            Self::Protocol(_) => "protocol",
            Self::Io(_) => "io",
        }
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => e,
            CodecError::Framing(e) => io::Error::new(io::ErrorKind::InvalidData, e),
            CodecError::Protocol(e) => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}
