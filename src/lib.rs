#![doc(html_root_url = "https://docs.rs/socketframe/latest")]
//! Server side of the socket.io 0.9 realtime protocol.
//!
//! The crate provides the colon-delimited wire codec, the session handshake,
//! transport-independent sessions with inbound and outbound queues, streaming
//! (WebSocket, Flash socket) and polling (XHR, JSONP, htmlfile) transports,
//! one worker per session and an event router. The host web layer parses
//! HTTP and owns sockets; [`SocketServer`] is the entry point it talks to.

pub mod codec;
pub mod config;
pub mod error;
pub mod handshake;
pub mod message;
pub mod metrics;
pub mod registry;
pub mod request;
pub mod response;
pub mod router;
#[cfg(not(loom))]
pub mod server;
pub mod session;
pub mod transport;
pub mod worker;

pub use codec::{CodecError, decode, decode_batch, encode, encode_batch};
pub use config::{ConfigError, ServerConfig, ServerSettings};
pub use error::ServerError;
pub use handshake::{HandshakeError, HandshakeNegotiator, ProtocolVersion};
pub use message::{Message, MessageId, MessageKind, Payload};
pub use metrics::{Direction, ERRORS_TOTAL, FRAMES_PROCESSED, SESSIONS_ACTIVE, WORKERS_STARTED};
pub use registry::SessionRegistry;
pub use http;
pub use request::{HandshakeRequest, TransportRequest};
pub use response::HttpReply;
pub use router::{EventContext, EventRouter, HandlerError};
#[cfg(not(loom))]
pub use server::SocketServer;
pub use session::{Session, SessionId, SessionState};
pub use transport::{StreamConnection, TransportBinding, TransportError, TransportKind};
pub use worker::{Worker, WorkerDispatch, WorkerError, WorkerFactory};
