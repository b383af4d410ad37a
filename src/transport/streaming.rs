//! Persistent socket transports.
//!
//! The binding writes the connect frame, then runs three jobs until one of
//! them stops:
//!
//! - reader: decodes wire frames and routes them into the session;
//! - writer: drains the session's outbound queue onto the socket;
//! - heartbeat: queues a heartbeat every interval while the session is
//!   connected.
//!
//! A closed or misbehaving socket only ends the connection. The session stays
//! registered until it times out or the client reconnects. A malformed frame
//! or socket error is reported through [`JobSet::join`].

use std::{fmt, io, pin::Pin, sync::Arc, task::Poll, time::Duration};

use bytes::Bytes;
use futures::{
    Sink,
    SinkExt,
    Stream,
    StreamExt,
    future,
    stream::{self, BoxStream},
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{WebSocketStream, tungstenite::Message as WsMessage};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

use super::{JobSet, TransportError};
use crate::{
    codec::{self, LegacyFrameCodec},
    message::Message,
    metrics::{self, Direction},
    session::Session,
};

/// Incoming wire frames of a split connection.
pub type BoxedReader = BoxStream<'static, io::Result<Bytes>>;
/// Outgoing wire frames of a split connection.
pub type BoxedWriter = Pin<Box<dyn Sink<Bytes, Error = io::Error> + Send>>;

/// A message-oriented duplex socket.
///
/// Each item read is one transport payload (possibly a batch); each item
/// written is one encoded payload.
pub trait StreamConnection: Send + 'static {
    /// Separate the read and write directions.
    fn split(self) -> (BoxedReader, BoxedWriter);
}

/// Hixie-75/76 WebSocket over any byte stream.
#[derive(Debug)]
pub struct LegacyWebSocket<S> {
    io: S,
    codec: LegacyFrameCodec,
}

impl<S> LegacyWebSocket<S> {
    /// Wrap an upgraded socket.
    #[must_use]
    pub fn new(io: S, codec: LegacyFrameCodec) -> Self { Self { io, codec } }
}

impl<S> StreamConnection for LegacyWebSocket<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn split(self) -> (BoxedReader, BoxedWriter) {
        let (read_half, write_half) = tokio::io::split(self.io);
        let mut frames = FramedRead::new(read_half, self.codec.clone());
        // The closing handshake ends the stream even if the peer keeps the
        // socket open.
        let reader = stream::poll_fn(move |cx| {
            if frames.decoder().is_closed() {
                return Poll::Ready(None);
            }
            match frames.poll_next_unpin(cx) {
                Poll::Pending if frames.decoder().is_closed() => Poll::Ready(None),
                other => other,
            }
        });
        let writer = FramedWrite::new(write_half, self.codec);
        (reader.boxed(), Box::pin(writer))
    }
}

/// RFC 6455 (and hybi-07/08) WebSocket.
pub struct HybiWebSocket<S> {
    inner: WebSocketStream<S>,
}

impl<S> HybiWebSocket<S> {
    #[must_use]
    pub fn new(inner: WebSocketStream<S>) -> Self { Self { inner } }
}

impl<S> fmt::Debug for HybiWebSocket<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybiWebSocket").finish_non_exhaustive()
    }
}

impl<S> StreamConnection for HybiWebSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn split(self) -> (BoxedReader, BoxedWriter) {
        let (sink, stream) = self.inner.split();
        let reader = stream
            .take_while(|msg| future::ready(!matches!(msg, Ok(WsMessage::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(WsMessage::Text(text)) => Some(Ok(Bytes::copy_from_slice(text.as_bytes()))),
                    Ok(WsMessage::Binary(data)) => Some(Ok(data)),
                    // Ping and pong replies are handled by tungstenite.
                    Ok(_) => None,
                    Err(err) => Some(Err(io::Error::other(err))),
                })
            });
        let writer = sink.sink_map_err(io::Error::other).with(|payload: Bytes| {
            let text = String::from_utf8_lossy(&payload).into_owned();
            future::ready(Ok::<_, io::Error>(WsMessage::Text(text.into())))
        });
        (reader.boxed(), Box::pin(writer))
    }
}

/// Binding for a persistent socket.
pub struct StreamingBinding {
    reader: BoxedReader,
    writer: BoxedWriter,
    heartbeat_interval: Duration,
}

impl fmt::Debug for StreamingBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingBinding")
            .field("heartbeat_interval", &self.heartbeat_interval)
            .finish_non_exhaustive()
    }
}

impl StreamingBinding {
    /// Bind `connection`, sending heartbeats every `heartbeat_interval`.
    pub fn new<C: StreamConnection>(connection: C, heartbeat_interval: Duration) -> Self {
        let (reader, writer) = connection.split();
        Self {
            reader,
            writer,
            heartbeat_interval,
        }
    }

    /// Send the connect frame and start the three jobs.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the connect frame cannot be written.
    pub async fn connect(self, session: &Arc<Session>) -> Result<JobSet, TransportError> {
        let Self {
            reader,
            mut writer,
            heartbeat_interval,
        } = self;
        writer.send(codec::encode(&Message::connect())).await?;
        metrics::inc_frames(Direction::Outbound, 1);

        let jobs = JobSet::new();
        jobs.spawn(read_job(reader, Arc::clone(session), jobs.token()));
        jobs.spawn(write_job(writer, Arc::clone(session), jobs.token()));
        jobs.spawn(heartbeat_job(
            heartbeat_interval,
            Arc::clone(session),
            jobs.token(),
        ));

        session.set_connection_confirmed(true);
        session.incr_hits();
        tracing::debug!(session_id = %session.id(), "streaming transport bound");
        Ok(jobs)
    }
}

async fn read_job(
    mut reader: BoxedReader,
    session: Arc<Session>,
    done: CancellationToken,
) -> Result<(), TransportError> {
    loop {
        let next = tokio::select! {
            biased;

            () = done.cancelled() => return Ok(()),
            next = reader.next() => next,
        };
        let payload = match next {
            Some(Ok(payload)) => payload,
            Some(Err(err)) => {
                tracing::debug!(session_id = %session.id(), error = %err, "streaming read failed");
                return Err(err.into());
            }
            None => {
                tracing::debug!(session_id = %session.id(), "peer closed streaming connection");
                return Ok(());
            }
        };
        let messages = match codec::decode_batch(&payload) {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(
                    session_id = %session.id(),
                    error = %err,
                    policy = ?err.default_recovery_policy(),
                    "malformed frame on streaming connection"
                );
                metrics::inc_errors(err.error_type());
                return Err(err.into());
            }
        };
        metrics::inc_frames(Direction::Inbound, messages.len());
        for message in messages {
            if session.route_inbound(message).is_err() {
                break;
            }
        }
        if !session.is_live() {
            return Ok(());
        }
    }
}

async fn write_job(
    mut writer: BoxedWriter,
    session: Arc<Session>,
    done: CancellationToken,
) -> Result<(), TransportError> {
    let mut outcome = Ok(());
    loop {
        let next = tokio::select! {
            biased;

            () = done.cancelled() => break,
            next = session.outbound().pop() => next,
        };
        let Some(message) = next else {
            tracing::debug!(session_id = %session.id(), "outbound queue closed");
            break;
        };
        if let Err(err) = writer.send(codec::encode(&message)).await {
            tracing::debug!(session_id = %session.id(), error = %err, "streaming write failed");
            outcome = Err(err.into());
            break;
        }
        metrics::inc_frames(Direction::Outbound, 1);
    }
    if let Err(err) = writer.close().await {
        tracing::debug!(session_id = %session.id(), error = %err, "failed to close streaming writer");
    }
    outcome
}

async fn heartbeat_job(
    interval: Duration,
    session: Arc<Session>,
    done: CancellationToken,
) -> Result<(), TransportError> {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; the connect frame covers it.
    ticker.tick().await;
    loop {
        tokio::select! {
            biased;

            () = done.cancelled() => break,
            _ = ticker.tick() => {
                if !session.is_connected() || session.send_heartbeat().is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}
