//! Transport-neutral HTTP replies.
//!
//! `HttpReply` carries the status, headers and body a host web layer should
//! write back. Polling transports and the handshake produce these; streaming
//! transports only use them for the upgrade response.

use bytes::Bytes;
use http::{
    HeaderMap,
    HeaderName,
    HeaderValue,
    StatusCode,
    header::{self, AsHeaderName},
};

use crate::request::header_str;

/// Plain-text content type used by the handshake and `xhr-polling`.
pub const TEXT_PLAIN: &str = "text/plain; charset=UTF-8";

/// A complete reply for the host to write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpReply {
    pub status: StatusCode,
    /// Reason phrase override; legacy WebSocket drafts require their own.
    reason: Option<&'static str>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpReply {
    /// Reply with `status` and its canonical reason phrase.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// `200 OK` with a plain-text body.
    #[must_use]
    pub fn text(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN))
            .with_body(body)
    }

    /// Error reply with a short plain-text diagnostic.
    #[must_use]
    pub fn error(status: StatusCode, diagnostic: impl Into<String>) -> Self {
        Self::new(status)
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN))
            .with_body(diagnostic.into())
    }

    /// Override the reason phrase.
    #[must_use]
    pub fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Set a header, replacing any earlier value.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Reason phrase for the status line.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        self.reason
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("")
    }

    /// Value of header `name`, looked up case-insensitively.
    #[must_use]
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> { header_str(&self.headers, name) }

    #[must_use]
    pub fn is_success(&self) -> bool { self.status.is_success() }
}
