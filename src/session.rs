//! Logical client sessions.
//!
//! A [`Session`] outlives the physical connections that carry it: a client
//! may poll over XHR, upgrade to a WebSocket, drop and reconnect, all against
//! the same session id. The session owns two FIFO queues (`inbound` towards
//! the worker, `outbound` towards whichever transport is bound), a liveness
//! deadline and the worker slot.
//!
//! Only [`kill`](Session::kill) moves a session out of the live states. It is
//! triggered by an explicit disconnect frame, by the liveness watchdog, or by
//! registry eviction.

use std::{
    borrow::Borrow,
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        OnceLock,
        PoisonError,
        Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use serde_json::Value;
use thiserror::Error;
use tokio::{runtime::Handle, time::Instant};

use crate::{
    codec::ProtocolError,
    message::{Message, Payload},
    metrics,
    registry::SessionMap,
    worker::WorkerSlot,
};

mod queue;
mod state;

pub use queue::{BACKLOG_WARNING_THRESHOLD, Dequeued, SessionQueue};
pub use state::SessionState;

/// Opaque session identifier, stable across transport reconnects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self { Self(uuid::Uuid::new_v4().simple().to_string()) }

    /// Wrap an identifier received from a client.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str { &self.0 }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self { Self::new(value) }
}

/// Errors raised by session operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The session has been killed and its queues closed.
    #[error("session is closed")]
    Closed,

    #[error("session owner already set to {current}")]
    OwnerAlreadySet {
        /// Owner recorded first.
        current: String,
    },

    /// An outgoing event could not be built.
    #[error(transparent)]
    InvalidMessage(#[from] ProtocolError),
}

/// A logical, transport-independent client session.
pub struct Session {
    id: SessionId,
    state: Mutex<SessionState>,
    inbound: SessionQueue<Message>,
    outbound: SessionQueue<Message>,
    hits: AtomicU64,
    heartbeats: AtomicU64,
    owner: OnceLock<String>,
    deadline: Mutex<Instant>,
    worker: WorkerSlot,
    connection_confirmed: AtomicBool,
    disconnect_timeout: Duration,
    registry: Weak<SessionMap>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    pub(crate) fn new(id: SessionId, disconnect_timeout: Duration, registry: Weak<SessionMap>) -> Self {
        Self {
            id,
            state: Mutex::new(SessionState::New),
            inbound: SessionQueue::new("inbound"),
            outbound: SessionQueue::new("outbound"),
            hits: AtomicU64::new(0),
            heartbeats: AtomicU64::new(0),
            owner: OnceLock::new(),
            deadline: Mutex::new(Instant::now() + disconnect_timeout),
            worker: WorkerSlot::new(),
            connection_confirmed: AtomicBool::new(false),
            disconnect_timeout,
            registry,
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId { &self.id }

    #[must_use]
    pub fn state(&self) -> SessionState { *lock(&self.state) }

    #[must_use]
    pub fn is_connected(&self) -> bool { self.state() == SessionState::Connected }

    /// Whether the session has not been killed.
    #[must_use]
    pub fn is_live(&self) -> bool { self.state().is_live() }

    /// Number of transport binds so far.
    #[must_use]
    pub fn hit_count(&self) -> u64 { self.hits.load(Ordering::Acquire) }

    /// Number of heartbeats received from the client.
    #[must_use]
    pub fn heartbeat_count(&self) -> u64 { self.heartbeats.load(Ordering::Acquire) }

    #[must_use]
    pub fn owner(&self) -> Option<&str> { self.owner.get().map(String::as_str) }

    /// Bind the session to `owner`. Only the first call succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::OwnerAlreadySet`] if an owner is recorded.
    pub fn set_owner(&self, owner: impl Into<String>) -> Result<(), SessionError> {
        let owner = owner.into();
        self.owner.set(owner).map_err(|_| SessionError::OwnerAlreadySet {
            current: self.owner().unwrap_or_default().to_owned(),
        })
    }

    /// Messages decoded from the client, waiting for the worker.
    #[must_use]
    pub fn inbound(&self) -> &SessionQueue<Message> { &self.inbound }

    /// Messages waiting to be written to the client.
    #[must_use]
    pub fn outbound(&self) -> &SessionQueue<Message> { &self.outbound }

    pub(crate) fn worker_slot(&self) -> &WorkerSlot { &self.worker }

    /// Whether a worker is currently attached.
    #[must_use]
    pub fn worker_attached(&self) -> bool { self.worker.is_attached() }

    /// Whether a polling client has completed its connect exchange.
    #[must_use]
    pub fn connection_confirmed(&self) -> bool { self.connection_confirmed.load(Ordering::Acquire) }

    pub(crate) fn set_connection_confirmed(&self, confirmed: bool) {
        self.connection_confirmed.store(confirmed, Ordering::Release);
    }

    /// Instant at which the watchdog will kill the session.
    #[must_use]
    pub fn deadline(&self) -> Instant { *lock(&self.deadline) }

    /// Push the liveness deadline one disconnect timeout into the future.
    pub fn touch(&self) {
        *lock(&self.deadline) = Instant::now() + self.disconnect_timeout;
    }

    /// Record a transport bind.
    ///
    /// The first hit moves a `New` session to `Connected` and arms the
    /// liveness deadline. Returns the new hit count.
    pub fn incr_hits(&self) -> u64 {
        let hits = self.hits.fetch_add(1, Ordering::AcqRel) + 1;
        if hits == 1 {
            let mut state = lock(&self.state);
            if *state == SessionState::New {
                *state = SessionState::Connected;
                drop(state);
                self.touch();
                log::info!("session {} connected", self.id);
            }
        }
        hits
    }

    /// Start the task that kills the session once its deadline lapses.
    ///
    /// Resetting the deadline never cancels the task; it re-arms itself
    /// until the deadline is observed in the past.
    pub(crate) fn spawn_watchdog(self: &Arc<Self>) {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(session_id = %self.id, "no runtime available for liveness watchdog");
            return;
        };
        let session = Arc::downgrade(self);
        handle.spawn(async move {
            loop {
                let deadline = match session.upgrade() {
                    Some(s) if s.is_live() => s.deadline(),
                    _ => return,
                };
                tokio::time::sleep_until(deadline).await;
                let Some(s) = session.upgrade() else { return };
                if !s.is_live() {
                    return;
                }
                if s.deadline() <= Instant::now() {
                    tracing::info!(session_id = %s.id, state = %s.state(), "session liveness deadline expired");
                    s.kill();
                    return;
                }
            }
        });
    }

    /// Terminate the session.
    ///
    /// Closes both queues, waking every blocked reader, and removes the
    /// session from its registry. Returns `false` if the session was already
    /// disconnecting or disconnected.
    pub fn kill(&self) -> bool {
        {
            let mut state = lock(&self.state);
            if !state.can_transition_to(SessionState::Disconnecting) {
                return false;
            }
            *state = SessionState::Disconnecting;
        }
        log::info!("session {} disconnecting", self.id);
        self.inbound.close();
        self.outbound.close();
        if let Some(map) = self.registry.upgrade() {
            map.remove(&self.id);
        }
        metrics::dec_sessions();
        *lock(&self.state) = SessionState::Disconnected;
        tracing::debug!(
            session_id = %self.id,
            hits = self.hit_count(),
            heartbeats = self.heartbeat_count(),
            "session disconnected"
        );
        true
    }

    /// Apply a message decoded from the client.
    ///
    /// Disconnect, connect and heartbeat frames are handled here and never
    /// reach the worker; everything else resets the liveness deadline and is
    /// queued on `inbound`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session was killed.
    pub fn route_inbound(&self, message: Message) -> Result<(), SessionError> {
        match message.payload {
            Payload::Disconnect => {
                tracing::debug!(session_id = %self.id, namespace = %message.namespace, "client requested disconnect");
                self.kill();
                Ok(())
            }
            Payload::Connect { query } => self.send(Message {
                id: None,
                namespace: message.namespace,
                payload: Payload::Connect { query },
            }),
            Payload::Heartbeat => {
                self.heartbeats.fetch_add(1, Ordering::AcqRel);
                self.touch();
                Ok(())
            }
            _ => {
                self.touch();
                self.inbound.push(message)
            }
        }
    }

    /// Queue `message` for delivery to the client.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session was killed.
    pub fn send(&self, message: Message) -> Result<(), SessionError> { self.outbound.push(message) }

    /// Queue a named event for the client.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidMessage`] for an empty or reserved
    /// event name and [`SessionError::Closed`] if the session was killed.
    pub fn send_event(&self, name: &str, args: Vec<Value>) -> Result<(), SessionError> {
        self.send(Message::event(name, args)?)
    }

    /// Queue a heartbeat for the client.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session was killed.
    pub fn send_heartbeat(&self) -> Result<(), SessionError> { self.send(Message::heartbeat()) }

    /// Acknowledge message `ack_id`, returning `args` when present.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session was killed.
    pub fn ack(&self, ack_id: &str, args: Option<Vec<Value>>) -> Result<(), SessionError> {
        self.send(Message::ack(ack_id, args))
    }

    /// Wait for the next message from the client.
    ///
    /// Returns `None` once the session has been killed and the queue drained.
    pub async fn next_inbound(&self) -> Option<Message> { self.inbound.pop().await }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("owner", &self.owner())
            .field("hits", &self.hit_count())
            .field("heartbeats", &self.heartbeat_count())
            .finish_non_exhaustive()
    }
}
