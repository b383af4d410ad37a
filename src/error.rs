//! Top-level error type for [`SocketServer`](crate::server::SocketServer).
//!
//! `ServerError` wraps handshake and transport failures and maps each to the
//! HTTP status the host should answer with.

use http::StatusCode;
use thiserror::Error;

use crate::{handshake::HandshakeError, response::HttpReply, transport::TransportError};

/// Errors surfaced to the host web layer.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ServerError {
    /// HTTP status matching this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Handshake(err) => match err {
                HandshakeError::NamespaceMismatch { .. } => StatusCode::NOT_FOUND,
                HandshakeError::Unauthenticated => StatusCode::UNAUTHORIZED,
                HandshakeError::UpgradeRequired => StatusCode::UPGRADE_REQUIRED,
                HandshakeError::LegacyChallenge(_)
                | HandshakeError::MissingHeader(_)
                | HandshakeError::InvalidHeader(_)
                | HandshakeError::UnsupportedVersion(_) => StatusCode::BAD_REQUEST,
            },
            Self::Transport(err) => match err {
                TransportError::Unsupported(_) | TransportError::Codec(_) => StatusCode::BAD_REQUEST,
                TransportError::TransportMismatch(_) => StatusCode::FORBIDDEN,
                TransportError::SessionNotFound(_) => StatusCode::NOT_FOUND,
                TransportError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
                TransportError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Reply with [`status_code`](Self::status_code) and a short diagnostic.
    #[must_use]
    pub fn to_reply(&self) -> HttpReply { HttpReply::error(self.status_code(), self.to_string()) }
}
