//! Test utilities for `socketframe`.
//!
//! - [`channel_connection`] builds an in-memory streaming connection and the
//!   client end that drives it.
//! - [`LoggerHandle`] and the [`logger`] fixture serialise access to a global
//!   `logtest` logger.
//! - [`requests`] builds handshake and transport requests.
//! - [`workers`] provides recording and failing workers.
//!
//! ```rust
//! use socketframe::transport::StreamConnection;
//! use socketframe_testing::channel_connection;
//!
//! let (connection, client) = channel_connection();
//! client.send("2::");
//! let (_reader, _writer) = connection.split();
//! ```

pub mod connection;
pub mod logging;
pub mod macros;
pub mod requests;
pub mod workers;

pub use connection::{ChannelConnection, ClientEnd, channel_connection};
pub use logging::{LoggerHandle, logger};
pub use requests::{
    NAMESPACE,
    RequestHeaderExt,
    handshake_request,
    poll_get,
    poll_post,
    websocket_request,
};
pub use workers::{FailingWorker, recording_factory, failing_factory, panicking_factory};
