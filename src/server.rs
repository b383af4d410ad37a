//! Facade wiring handshake, registry, transports and workers together.
//!
//! The host web layer owns sockets and HTTP parsing. It hands each request to
//! one of the [`SocketServer`] entry points:
//!
//! - `GET /<namespace>/1/` goes to [`SocketServer::handshake`];
//! - polling transport requests go to [`SocketServer::serve_polling`];
//! - WebSocket requests go to [`SocketServer::upgrade`], and once the `101`
//!   reply is written the upgraded socket goes to
//!   [`SocketServer::serve_stream`].

use std::sync::Arc;

use crate::{
    codec::LegacyFrameCodec,
    config::{ConfigError, ServerConfig},
    error::ServerError,
    handshake::{
        HandshakeError,
        HandshakeNegotiator,
        ProtocolVersion,
        detect_legacy_version,
        upgrade_response,
    },
    registry::SessionRegistry,
    request::{HandshakeRequest, Method, TransportRequest},
    response::HttpReply,
    session::Session,
    transport::{
        LegacyWebSocket,
        PollingBinding,
        StreamConnection,
        StreamingBinding,
        TransportError,
        TransportKind,
        UnsupportedTransport,
    },
    worker::{WorkerDispatch, WorkerFactory},
};

/// Serves handshakes and transport requests for one namespace.
pub struct SocketServer {
    config: Arc<ServerConfig>,
    registry: SessionRegistry,
    negotiator: HandshakeNegotiator,
    dispatch: WorkerDispatch,
    factory: WorkerFactory,
}

impl SocketServer {
    /// Create a server; `factory` builds the worker for each new session.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `config` fails
    /// [`ServerConfig::validate`].
    pub fn new(config: ServerConfig, factory: WorkerFactory) -> Result<Self, ConfigError> {
        let config = Arc::new(config.validate()?);
        let registry = SessionRegistry::new();
        let negotiator = HandshakeNegotiator::new(Arc::clone(&config), registry.clone());
        Ok(Self {
            config,
            registry,
            negotiator,
            dispatch: WorkerDispatch::new(),
            factory,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig { &self.config }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry { &self.registry }

    /// Tracker for the session workers this server started.
    #[must_use]
    pub fn dispatch(&self) -> &WorkerDispatch { &self.dispatch }

    /// Answer a handshake with the capability line or a diagnostic.
    #[must_use]
    pub fn handshake(&self, request: &HandshakeRequest) -> HttpReply {
        match self.negotiator.negotiate(request) {
            Ok(handshake) => HttpReply::text(handshake.capabilities().to_owned()),
            Err(err) => {
                let err = ServerError::from(err);
                tracing::debug!(
                    error = %err,
                    status = err.status_code().as_u16(),
                    "handshake rejected"
                );
                err.to_reply()
            }
        }
    }

    /// Validate a WebSocket request and build its `101` reply.
    ///
    /// # Errors
    ///
    /// Fails with the resolution errors of [`serve_stream`](Self::serve_stream)
    /// or a [`HandshakeError`] when the upgrade headers are unusable.
    pub fn upgrade(
        &self,
        request: &TransportRequest,
    ) -> Result<(ProtocolVersion, HttpReply), ServerError> {
        self.resolve(request, true)?;
        let version = detect_legacy_version(&request.headers)?;
        let reply = upgrade_response(version, request)?;
        tracing::debug!(session_id = %request.session_id, ?version, "websocket upgrade accepted");
        Ok((version, reply))
    }

    /// Serve one polling request.
    pub async fn serve_polling(&self, request: &TransportRequest) -> HttpReply {
        match self.poll(request).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::debug!(
                    session_id = %request.session_id,
                    transport = %request.transport,
                    error = %err,
                    status = err.status_code().as_u16(),
                    "polling request failed"
                );
                err.to_reply()
            }
        }
    }

    async fn poll(&self, request: &TransportRequest) -> Result<HttpReply, ServerError> {
        let (kind, session) = self.resolve(request, false)?;
        self.dispatch.ensure_worker_running(&session, &self.factory);
        let binding = PollingBinding::new(kind, request.clone(), self.config.poll_timeout())?;
        Ok(binding.connect(&session).await?)
    }

    /// Bind an upgraded socket to its session and serve it until any of the
    /// connection's jobs stops.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the request does not resolve to a live
    /// session, the connect frame cannot be written, or a job stopped on a
    /// malformed frame or socket error. The session survives all of these.
    pub async fn serve_stream<C: StreamConnection>(
        &self,
        request: &TransportRequest,
        connection: C,
    ) -> Result<(), ServerError> {
        let (_, session) = self.resolve(request, true)?;
        self.dispatch.ensure_worker_running(&session, &self.factory);
        let jobs = StreamingBinding::new(connection, self.config.heartbeat_interval())
            .connect(&session)
            .await?;
        let outcome = jobs.join().await;
        tracing::debug!(session_id = %session.id(), "streaming connection closed");
        outcome.map_err(ServerError::from)
    }

    /// Wrap an upgraded hixie-75/76 socket using the configured frame limit.
    #[must_use]
    pub fn legacy_connection<S>(&self, io: S) -> LegacyWebSocket<S> {
        LegacyWebSocket::new(io, LegacyFrameCodec::new(self.config.max_frame_length()))
    }

    fn resolve(
        &self,
        request: &TransportRequest,
        streaming: bool,
    ) -> Result<(TransportKind, Arc<Session>), ServerError> {
        if request.namespace != self.config.namespace() {
            return Err(HandshakeError::NamespaceMismatch {
                expected: self.config.namespace().to_owned(),
                actual: request.namespace.clone(),
            }
            .into());
        }
        let kind: TransportKind = request.transport.parse().map_err(TransportError::from)?;
        if !self.config.advertises(kind) {
            return Err(TransportError::from(UnsupportedTransport(request.transport.clone())).into());
        }
        if kind.is_streaming() != streaming {
            return Err(TransportError::TransportMismatch(kind).into());
        }
        if streaming && request.method != Method::GET {
            return Err(TransportError::MethodNotAllowed(request.method.clone()).into());
        }
        let session = self
            .registry
            .get(&request.session_id)
            .filter(|session| session.is_live())
            .ok_or_else(|| TransportError::SessionNotFound(request.session_id.clone()))?;
        Ok((kind, session))
    }

    /// Kill every session and wait for their workers to stop.
    pub async fn shutdown(&self) {
        let killed = self.registry.kill_all();
        self.dispatch.shutdown().await;
        tracing::info!(sessions = killed, "server shut down");
    }
}

impl std::fmt::Debug for SocketServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketServer")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}
