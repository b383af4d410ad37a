//! Session handshake and WebSocket upgrade negotiation.
//!
//! A client first requests `/<namespace>/1/`. [`HandshakeNegotiator`]
//! validates the namespace and principal, registers a new session and answers
//! with the capability string
//! `sessionId:heartbeatTimeout:closeTimeout:transport,transport`. The client
//! then reconnects on one of the advertised transports.

use std::sync::Arc;

use thiserror::Error;

use crate::{
    config::ServerConfig,
    registry::SessionRegistry,
    request::HandshakeRequest,
    session::Session,
};

mod legacy;

pub use legacy::{
    LegacyChallengeError,
    ProtocolVersion,
    detect_legacy_version,
    legacy_challenge,
    upgrade_response,
};

/// Handshake and upgrade failures.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// The request path names a namespace this server does not serve.
    #[error("namespace {actual:?} is not served (expected {expected:?})")]
    NamespaceMismatch { expected: String, actual: String },

    /// No authenticated principal accompanied the request.
    #[error("handshake requires an authenticated principal")]
    Unauthenticated,

    #[error("legacy challenge failed: {0}")]
    LegacyChallenge(#[from] LegacyChallengeError),

    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// A reply header could not be built from request data.
    #[error("invalid value for header {0}")]
    InvalidHeader(&'static str),

    /// `Sec-WebSocket-Version` named a draft this server does not speak.
    #[error("unsupported websocket version: {0}")]
    UnsupportedVersion(String),

    /// The request did not ask for a WebSocket upgrade.
    #[error("websocket upgrade required")]
    UpgradeRequired,
}

/// Outcome of a successful handshake.
#[derive(Clone, Debug)]
pub struct Handshake {
    session: Arc<Session>,
    capabilities: String,
}

impl Handshake {
    /// The freshly registered session.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> { &self.session }

    /// The capability line sent to the client.
    #[must_use]
    pub fn capabilities(&self) -> &str { &self.capabilities }
}

/// Creates sessions for valid handshake requests.
#[derive(Clone, Debug)]
pub struct HandshakeNegotiator {
    config: Arc<ServerConfig>,
    registry: SessionRegistry,
}

impl HandshakeNegotiator {
    #[must_use]
    pub fn new(config: Arc<ServerConfig>, registry: SessionRegistry) -> Self {
        Self { config, registry }
    }

    /// Validate `request` and register a session owned by its principal.
    ///
    /// No session is created when validation fails.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::NamespaceMismatch`] or
    /// [`HandshakeError::Unauthenticated`].
    pub fn negotiate(&self, request: &HandshakeRequest) -> Result<Handshake, HandshakeError> {
        if request.namespace != self.config.namespace() {
            tracing::debug!(namespace = %request.namespace, "handshake for unknown namespace");
            return Err(HandshakeError::NamespaceMismatch {
                expected: self.config.namespace().to_owned(),
                actual: request.namespace.clone(),
            });
        }
        let principal = request
            .principal
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(HandshakeError::Unauthenticated)?;

        let session = self.registry.create(self.config.disconnect_timeout());
        // A freshly generated session cannot already have an owner.
        let _ = session.set_owner(principal);
        let capabilities = self.capabilities(session.id().as_str());
        tracing::info!(session_id = %session.id(), owner = principal, "handshake accepted");
        Ok(Handshake {
            session,
            capabilities,
        })
    }

    fn capabilities(&self, session_id: &str) -> String {
        let timeout = self.config.disconnect_timeout().as_secs();
        let transports = self
            .config
            .transports()
            .iter()
            .map(|t| t.name())
            .collect::<Vec<_>>()
            .join(",");
        format!("{session_id}:{timeout}:{timeout}:{transports}")
    }
}
