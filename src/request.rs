//! Pre-parsed HTTP request values handed over by the host web layer.
//!
//! The crate never parses raw HTTP. The host resolves the route
//! (`/<namespace>/1/` or `/<namespace>/1/<transport>/<sid>/`) and the caller's
//! principal, then builds a [`HandshakeRequest`] or [`TransportRequest`].
//! Methods and headers are the [`http`] crate's types.

use bytes::Bytes;
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, header::AsHeaderName};

/// Value of header `name` if it is present and visible ASCII.
///
/// Lookup by `&str` is case-insensitive.
#[must_use]
pub fn header_str<K: AsHeaderName>(headers: &HeaderMap, name: K) -> Option<&str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Request for `GET /<namespace>/1/`.
#[derive(Clone, Debug, Default)]
pub struct HandshakeRequest {
    /// Namespace segment of the path.
    pub namespace: String,
    /// Authenticated principal, if the host resolved one.
    pub principal: Option<String>,
    pub headers: HeaderMap,
}

impl HandshakeRequest {
    /// Handshake for `namespace` on behalf of `principal`.
    #[must_use]
    pub fn new(namespace: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            principal: Some(principal.into()),
            headers: HeaderMap::new(),
        }
    }

    /// Handshake without an authenticated principal.
    #[must_use]
    pub fn anonymous(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            principal: None,
            headers: HeaderMap::new(),
        }
    }
}

/// Request for `/<namespace>/1/<transport>/<sid>/`.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    pub method: Method,
    pub namespace: String,
    /// Transport name segment, for example `xhr-polling`.
    pub transport: String,
    pub session_id: String,
    pub headers: HeaderMap,
    /// Raw query string without the leading `?`.
    pub query: Option<String>,
    pub body: Bytes,
    /// Request path, used to build legacy WebSocket locations.
    pub path: String,
    /// Whether the request arrived over TLS.
    pub secure: bool,
}

impl TransportRequest {
    /// A bodiless request; the path is derived from the other segments.
    #[must_use]
    pub fn new(
        method: Method,
        namespace: impl Into<String>,
        transport: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        let namespace = namespace.into();
        let transport = transport.into();
        let session_id = session_id.into();
        let path = format!("/{namespace}/1/{transport}/{session_id}/");
        Self {
            method,
            namespace,
            transport,
            session_id,
            headers: HeaderMap::new(),
            query: None,
            body: Bytes::new(),
            path,
            secure: false,
        }
    }

    /// Attach a request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Append a header, keeping earlier values of the same name.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replace all headers with those the host parsed.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the query string.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Value of header `name`, see [`header_str`].
    #[must_use]
    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&str> { header_str(&self.headers, name) }

    /// Value of query parameter `name`, percent-decoded.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }
}
