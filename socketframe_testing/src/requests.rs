//! Request builders for the default namespace.

use bytes::Bytes;
use socketframe::{
    http::{HeaderName, HeaderValue, Method},
    request::{HandshakeRequest, TransportRequest},
};

/// Namespace served by a default `ServerConfig`.
pub const NAMESPACE: &str = "socket.io";

/// Header helpers taking names and values as text.
pub trait RequestHeaderExt: Sized {
    /// Append header `name: value`.
    ///
    /// # Panics
    ///
    /// Panics if `name` or `value` is not a valid header component.
    #[must_use]
    fn with_text_header(self, name: &str, value: &str) -> Self;
}

impl RequestHeaderExt for TransportRequest {
    fn with_text_header(self, name: &str, value: &str) -> Self {
        let name = HeaderName::try_from(name).expect("valid header name");
        let value = HeaderValue::try_from(value).expect("valid header value");
        self.with_header(name, value)
    }
}

/// Handshake on behalf of `principal`.
#[must_use]
pub fn handshake_request(principal: &str) -> HandshakeRequest {
    HandshakeRequest::new(NAMESPACE, principal)
}

/// Polling GET for session `sid`.
#[must_use]
pub fn poll_get(transport: &str, sid: &str) -> TransportRequest {
    TransportRequest::new(Method::GET, NAMESPACE, transport, sid)
}

/// Polling POST carrying `body`.
#[must_use]
pub fn poll_post(transport: &str, sid: &str, body: impl Into<Bytes>) -> TransportRequest {
    TransportRequest::new(Method::POST, NAMESPACE, transport, sid).with_body(body)
}

/// RFC 6455 upgrade request using the sample key from the RFC.
#[must_use]
pub fn websocket_request(sid: &str) -> TransportRequest {
    TransportRequest::new(Method::GET, NAMESPACE, "websocket", sid)
        .with_text_header("Host", "example.com")
        .with_text_header("Upgrade", "websocket")
        .with_text_header("Connection", "Upgrade")
        .with_text_header("Sec-WebSocket-Version", "13")
        .with_text_header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
}
