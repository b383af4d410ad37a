//! Transport bindings between a physical connection and a session.
//!
//! A binding is chosen once per connection or request, before any bytes are
//! pumped, and never changes afterwards:
//!
//! - [`StreamingBinding`] drives a persistent socket with three jobs (reader,
//!   writer, heartbeat) that share one cancellation token; when any job ends
//!   they all end.
//! - [`PollingBinding`] performs one unit of work per HTTP request and
//!   returns an [`HttpReply`].

use std::{
    io,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{codec::CodecError, request::Method, response::HttpReply, session::Session};

mod polling;
mod streaming;

pub use polling::PollingBinding;
pub use streaming::{
    BoxedReader,
    BoxedWriter,
    HybiWebSocket,
    LegacyWebSocket,
    StreamConnection,
    StreamingBinding,
};

/// Transport name that is unknown or not advertised.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unsupported transport: {0}")]
pub struct UnsupportedTransport(pub String);

/// Transports a client may select after the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    WebSocket,
    /// WebSocket protocol carried over a Flash socket.
    FlashSocket,
    XhrPolling,
    JsonpPolling,
    /// Polling whose replies are wrapped in `<script>` tags.
    Htmlfile,
}

impl TransportKind {
    /// Every transport, in the default advertising order.
    pub const ALL: [TransportKind; 5] = [
        Self::WebSocket,
        Self::FlashSocket,
        Self::XhrPolling,
        Self::JsonpPolling,
        Self::Htmlfile,
    ];

    /// Name used in the capability string and request paths.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::FlashSocket => "flashsocket",
            Self::XhrPolling => "xhr-polling",
            Self::JsonpPolling => "jsonp-polling",
            Self::Htmlfile => "htmlfile",
        }
    }

    /// Whether this transport keeps a socket open.
    #[must_use]
    pub fn is_streaming(self) -> bool { matches!(self, Self::WebSocket | Self::FlashSocket) }
}

impl FromStr for TransportKind {
    type Err = UnsupportedTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnsupportedTransport(s.to_owned()))
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.name()) }
}

/// Errors raised while binding or serving a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Unsupported(#[from] UnsupportedTransport),

    /// No live session has this id.
    #[error("session {0} not found")]
    SessionNotFound(String),

    /// A streaming transport was requested through the polling entry point
    /// or the reverse.
    #[error("transport {0} cannot be served here")]
    TransportMismatch(TransportKind),

    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    /// The request body or a socket frame failed to decode.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Fixed set of jobs serving one streaming connection.
///
/// Every job holds a drop guard on the shared token, so the first job to
/// finish, fail or panic cancels the others. The first error a job returns
/// is kept and handed out by [`join`](Self::join).
#[derive(Debug, Default)]
pub struct JobSet {
    tracker: TaskTracker,
    done: CancellationToken,
    failure: Arc<Mutex<Option<TransportError>>>,
}

impl JobSet {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Token cancelled when any job ends.
    #[must_use]
    pub fn token(&self) -> CancellationToken { self.done.clone() }

    pub(crate) fn spawn<F>(&self, job: F)
    where
        F: Future<Output = Result<(), TransportError>> + Send + 'static,
    {
        let guard = self.done.clone().drop_guard();
        let failure = Arc::clone(&self.failure);
        self.tracker.spawn(async move {
            let _guard = guard;
            if let Err(err) = job.await {
                failure
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get_or_insert(err);
            }
        });
    }

    /// Number of jobs still running.
    #[must_use]
    pub fn len(&self) -> usize { self.tracker.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.tracker.is_empty() }

    /// Ask every job to stop.
    pub fn cancel(&self) { self.done.cancel(); }

    /// Wait until every job has stopped.
    ///
    /// # Errors
    ///
    /// Returns the first error any job stopped with.
    pub async fn join(self) -> Result<(), TransportError> {
        self.tracker.close();
        self.tracker.wait().await;
        match self.failure.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Result of connecting a binding to a session.
#[derive(Debug)]
pub enum Connected {
    /// Streaming: the jobs now serving the socket.
    Jobs(JobSet),
    /// Polling: the reply to write to the client.
    Reply(HttpReply),
}

/// The binding selected for one connection or request.
#[derive(Debug)]
pub enum TransportBinding {
    Streaming(StreamingBinding),
    Polling(PollingBinding),
}

impl TransportBinding {
    /// Attach this binding to `session`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the first write fails (streaming) or
    /// the request cannot be served (polling). The session is never killed
    /// by a binding error.
    pub async fn connect(self, session: &Arc<Session>) -> Result<Connected, TransportError> {
        match self {
            Self::Streaming(binding) => binding.connect(session).await.map(Connected::Jobs),
            Self::Polling(binding) => binding.connect(session).await.map(Connected::Reply),
        }
    }
}
