//! In-memory streaming connection backed by unbounded channels.

use std::io;

use bytes::Bytes;
use futures::{StreamExt, sink, stream};
use socketframe::{
    codec,
    message::Message,
    transport::{BoxedReader, BoxedWriter, StreamConnection},
};
use tokio::sync::mpsc;

/// Server side of an in-memory socket.
#[derive(Debug)]
pub struct ChannelConnection {
    inbound: mpsc::UnboundedReceiver<io::Result<Bytes>>,
    outbound: mpsc::UnboundedSender<Bytes>,
}

/// Client side of an in-memory socket.
#[derive(Debug)]
pub struct ClientEnd {
    to_server: Option<mpsc::UnboundedSender<io::Result<Bytes>>>,
    from_server: mpsc::UnboundedReceiver<Bytes>,
}

/// Create a connected pair.
#[must_use]
pub fn channel_connection() -> (ChannelConnection, ClientEnd) {
    let (to_server, inbound) = mpsc::unbounded_channel();
    let (outbound, from_server) = mpsc::unbounded_channel();
    (
        ChannelConnection { inbound, outbound },
        ClientEnd {
            to_server: Some(to_server),
            from_server,
        },
    )
}

impl StreamConnection for ChannelConnection {
    fn split(self) -> (BoxedReader, BoxedWriter) {
        let reader = stream::unfold(self.inbound, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed();
        let writer = sink::unfold(self.outbound, |tx, payload: Bytes| async move {
            tx.send(payload)
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client end dropped"))?;
            Ok::<_, io::Error>(tx)
        });
        (reader, Box::pin(writer))
    }
}

impl ClientEnd {
    /// Send a raw payload to the server. Returns `false` after hang up.
    pub fn send(&self, payload: impl Into<Bytes>) -> bool {
        self.to_server
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(payload.into())).is_ok())
    }

    /// Encode and send one message.
    pub fn send_message(&self, message: &Message) -> bool { self.send(codec::encode(message)) }

    /// Deliver a read error to the server.
    pub fn fail(&self, err: io::Error) -> bool {
        self.to_server
            .as_ref()
            .is_some_and(|tx| tx.send(Err(err)).is_ok())
    }

    /// Close the client-to-server direction.
    pub fn hang_up(&mut self) { self.to_server = None; }

    /// Next payload written by the server, or `None` once the server's
    /// writer is gone.
    pub async fn recv(&mut self) -> Option<Bytes> { self.from_server.recv().await }

    /// Next payload decoded as a single message.
    ///
    /// # Panics
    ///
    /// Panics if the payload does not decode.
    pub async fn recv_message(&mut self) -> Option<Message> {
        let payload = self.recv().await?;
        Some(codec::decode(&payload).expect("server wrote an undecodable frame"))
    }

    /// Payload already written by the server, if any.
    pub fn try_recv(&mut self) -> Option<Bytes> { self.from_server.try_recv().ok() }
}
