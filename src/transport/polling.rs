//! Long-polling transports: `xhr-polling`, `jsonp-polling` and `htmlfile`.
//!
//! Each HTTP request is one unit of work. The first request on a session
//! confirms the connection and is answered with `1::`. After that, a GET waits
//! up to the poll timeout for outbound messages and a POST feeds a batch of
//! inbound messages into the session.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use http::{
    HeaderValue,
    Method,
    StatusCode,
    header::{
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        ACCESS_CONTROL_ALLOW_HEADERS,
        ACCESS_CONTROL_ALLOW_METHODS,
        ACCESS_CONTROL_ALLOW_ORIGIN,
        CONNECTION,
        CONTENT_TYPE,
        ORIGIN,
    },
};

use super::{TransportError, TransportKind};
use crate::{
    codec,
    message::Message,
    metrics::{self, Direction},
    request::TransportRequest,
    response::HttpReply,
    session::{Dequeued, Session},
};

const JAVASCRIPT: &str = "text/javascript; charset=UTF-8";
const HTML: &str = "text/html; charset=UTF-8";

/// Binding for one polling request.
#[derive(Debug)]
pub struct PollingBinding {
    kind: TransportKind,
    request: TransportRequest,
    poll_timeout: Duration,
}

impl PollingBinding {
    /// Bind `request`, waiting at most `poll_timeout` for outbound messages.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::TransportMismatch`] for streaming transports.
    pub fn new(
        kind: TransportKind,
        request: TransportRequest,
        poll_timeout: Duration,
    ) -> Result<Self, TransportError> {
        if kind.is_streaming() {
            return Err(TransportError::TransportMismatch(kind));
        }
        Ok(Self {
            kind,
            request,
            poll_timeout,
        })
    }

    #[must_use]
    pub fn kind(&self) -> TransportKind { self.kind }

    /// Serve the request against `session`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Codec`] when a POST body does not decode; the
    /// session is left unconfirmed so the client starts over with a connect
    /// exchange. Methods other than GET, POST and OPTIONS yield
    /// [`TransportError::MethodNotAllowed`].
    pub async fn connect(self, session: &Arc<Session>) -> Result<HttpReply, TransportError> {
        let method = self.request.method.clone();
        if method == Method::OPTIONS {
            return Ok(self.preflight());
        }
        if method != Method::GET && method != Method::POST {
            return Err(TransportError::MethodNotAllowed(method));
        }

        if !session.connection_confirmed() {
            if method == Method::POST && !self.request.body.is_empty() {
                self.receive(session)?;
            }
            session.set_connection_confirmed(true);
            session.incr_hits();
            tracing::debug!(session_id = %session.id(), transport = %self.kind, "polling connection confirmed");
            return Ok(self.reply(codec::encode(&Message::connect())));
        }

        if method == Method::GET {
            let body = self.wait_for_outbound(session).await?;
            return Ok(self.reply(body));
        }
        if self.request.body.is_empty() {
            return Ok(self.reply(codec::encode(&Message::connect())));
        }
        self.receive(session)?;
        Ok(self
            .reply(codec::encode(&Message::noop()))
            .with_header(CONNECTION, HeaderValue::from_static("close")))
    }

    async fn wait_for_outbound(&self, session: &Session) -> Result<Bytes, TransportError> {
        session.touch();
        let first = match session.outbound().pop_timeout(self.poll_timeout).await {
            Dequeued::Item(message) => message,
            Dequeued::Closed | Dequeued::TimedOut => return Ok(codec::encode(&Message::noop())),
        };
        let mut batch = vec![first];
        batch.extend(session.outbound().drain());
        metrics::inc_frames(Direction::Outbound, batch.len());
        Ok(codec::encode_batch(&batch)?)
    }

    fn receive(&self, session: &Session) -> Result<(), TransportError> {
        let payload = self.post_payload();
        let messages = codec::decode_batch(&payload).map_err(|err| {
            tracing::warn!(
                session_id = %session.id(),
                transport = %self.kind,
                error = %err,
                "malformed polling payload"
            );
            metrics::inc_errors(err.error_type());
            session.set_connection_confirmed(false);
            err
        })?;
        metrics::inc_frames(Direction::Inbound, messages.len());
        for message in messages {
            if session.route_inbound(message).is_err() {
                tracing::debug!(session_id = %session.id(), "session closed while receiving batch");
                break;
            }
        }
        Ok(())
    }

    /// JSONP clients post a form field `d` holding a JSON string.
    fn post_payload(&self) -> Bytes {
        if self.kind != TransportKind::JsonpPolling {
            return self.request.body.clone();
        }
        let field = url::form_urlencoded::parse(&self.request.body)
            .find(|(key, _)| key == "d")
            .map(|(_, value)| value.into_owned());
        match field {
            Some(raw) => {
                let data = serde_json::from_str::<String>(&raw).unwrap_or(raw);
                Bytes::from(data)
            }
            None => self.request.body.clone(),
        }
    }

    fn reply(&self, body: Bytes) -> HttpReply {
        let reply = match self.kind {
            TransportKind::JsonpPolling => {
                let index = self
                    .request
                    .query_param("i")
                    .and_then(|i| i.parse::<u32>().ok())
                    .unwrap_or(0);
                HttpReply::new(StatusCode::OK)
                    .with_header(CONTENT_TYPE, HeaderValue::from_static(JAVASCRIPT))
                    .with_body(format!("io.j[{index}]({});", quote(&body)))
            }
            TransportKind::Htmlfile => HttpReply::new(StatusCode::OK)
                .with_header(CONTENT_TYPE, HeaderValue::from_static(HTML))
                .with_body(format!("<script>_({});</script>", quote(&body))),
            _ => HttpReply::text(body),
        };
        self.with_cors(reply)
    }

    fn preflight(&self) -> HttpReply {
        self.with_cors(
            HttpReply::new(StatusCode::OK)
                .with_header(
                    ACCESS_CONTROL_ALLOW_METHODS,
                    HeaderValue::from_static("POST, GET, OPTIONS"),
                )
                .with_header(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("Content-Type")),
        )
    }

    fn with_cors(&self, reply: HttpReply) -> HttpReply {
        match self.request.headers.get(ORIGIN) {
            Some(origin) => reply
                .with_header(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone())
                .with_header(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true")),
            None => reply,
        }
    }
}

fn quote(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    serde_json::Value::String(text.into_owned()).to_string()
}
