//! Shared utilities for integration tests.
//!
//! Provides a [`Harness`] wiring a [`SocketServer`] to a recording worker so
//! tests can drive requests and observe what reached the worker.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::time::Duration;

use rstest::fixture;
use socketframe::{
    config::ServerConfig,
    message::Message,
    server::SocketServer,
    worker::WorkerFactory,
};
use socketframe_testing::{handshake_request, recording_factory};
use tokio::sync::mpsc;

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub const HEARTBEAT: Duration = Duration::from_secs(2);
pub const TIMEOUT: Duration = Duration::from_secs(4);

/// Configuration with short timers for paused-time tests.
#[must_use]
pub fn fast_config() -> ServerConfig {
    ServerConfig::default()
        .with_heartbeat_interval(HEARTBEAT)
        .with_disconnect_timeout(TIMEOUT)
}

/// A server whose workers forward inbound messages to `inbound`.
pub struct Harness {
    pub server: SocketServer,
    pub inbound: mpsc::UnboundedReceiver<Message>,
}

impl Harness {
    /// Build a harness around `config`.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let (factory, inbound) = recording_factory();
        Self {
            server: SocketServer::new(config, factory).expect("valid config"),
            inbound,
        }
    }

    /// Perform a handshake and return the new session id.
    ///
    /// # Panics
    ///
    /// Panics if the handshake is rejected.
    #[must_use]
    pub fn open_session(&self) -> String { open_session(&self.server) }
}

/// Handshake as `alice` against `server` and return the session id.
///
/// # Panics
///
/// Panics if the handshake is rejected.
#[must_use]
pub fn open_session(server: &SocketServer) -> String {
    let reply = server.handshake(&handshake_request("alice"));
    assert_eq!(reply.status, 200, "handshake rejected: {reply:?}");
    let body = String::from_utf8(reply.body.to_vec()).expect("capability line is UTF-8");
    body.split(':')
        .next()
        .expect("capability line has a session id")
        .to_owned()
}

/// Server built around `factory` with [`fast_config`].
#[must_use]
pub fn server_with(factory: WorkerFactory) -> SocketServer {
    SocketServer::new(fast_config(), factory).expect("valid config")
}

#[fixture]
pub fn harness() -> Harness { Harness::new(fast_config()) }

/// Body of a reply as text.
#[must_use]
pub fn body(reply: &socketframe::response::HttpReply) -> String {
    String::from_utf8_lossy(&reply.body).into_owned()
}
