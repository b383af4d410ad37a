//! World and step definitions for the session lifecycle feature.

use std::time::Duration;

use cucumber::{World, given, then, when};
use socketframe::{
    config::ServerConfig,
    message::Message,
    response::HttpReply,
    server::SocketServer,
    session::SessionState,
};
use socketframe_testing::{handshake_request, poll_get, poll_post, recording_factory};
use tokio::sync::mpsc;

const HEARTBEAT: Duration = Duration::from_millis(100);
const TIMEOUT: Duration = Duration::from_millis(300);

/// Server, session id and last reply shared between steps.
#[derive(Debug, Default, World)]
pub struct SessionWorld {
    server: Option<SocketServer>,
    inbound: Option<mpsc::UnboundedReceiver<Message>>,
    session_id: Option<String>,
    last_reply: Option<HttpReply>,
}

impl SessionWorld {
    fn server(&self) -> &SocketServer { self.server.as_ref().expect("server not started") }

    fn sid(&self) -> &str { self.session_id.as_deref().expect("no handshake yet") }

    fn last_body(&self) -> String {
        let reply = self.last_reply.as_ref().expect("no reply yet");
        String::from_utf8_lossy(&reply.body).into_owned()
    }
}

#[given("a socket server with a recording worker")]
fn start_server(world: &mut SessionWorld) {
    let config = ServerConfig::default()
        .with_heartbeat_interval(HEARTBEAT)
        .with_disconnect_timeout(TIMEOUT);
    let (factory, inbound) = recording_factory();
    world.server = Some(SocketServer::new(config, factory).expect("valid config"));
    world.inbound = Some(inbound);
}

#[given("a client that completed the handshake")]
fn handshake(world: &mut SessionWorld) {
    let reply = world.server().handshake(&handshake_request("alice"));
    assert_eq!(reply.status, 200);
    let line = String::from_utf8_lossy(&reply.body).into_owned();
    world.session_id = line.split(':').next().map(str::to_owned);
}

#[when(expr = "the client polls over {string}")]
async fn poll(world: &mut SessionWorld, transport: String) {
    let request = poll_get(&transport, world.sid());
    world.last_reply = Some(world.server().serve_polling(&request).await);
}

#[when(expr = "the client posts {string} over {string}")]
async fn post(world: &mut SessionWorld, payload: String, transport: String) {
    let request = poll_post(&transport, world.sid(), payload);
    world.last_reply = Some(world.server().serve_polling(&request).await);
}

#[when("the client stays silent past the disconnect timeout")]
async fn stay_silent(_world: &mut SessionWorld) {
    tokio::time::sleep(TIMEOUT + HEARTBEAT).await;
}

#[then(expr = "the reply body is {string}")]
fn reply_body(world: &mut SessionWorld, expected: String) {
    assert_eq!(world.last_body(), expected);
}

#[then("the session is connected")]
fn session_connected(world: &mut SessionWorld) {
    let session = world.server().registry().get(world.sid()).expect("session registered");
    assert_eq!(session.state(), SessionState::Connected);
}

#[then(expr = "the worker receives the text {string}")]
async fn worker_receives(world: &mut SessionWorld, text: String) {
    let inbound = world.inbound.as_mut().expect("server not started");
    let message = tokio::time::timeout(Duration::from_secs(1), inbound.recv())
        .await
        .expect("worker received nothing")
        .expect("worker channel closed");
    assert_eq!(message, Message::text(text));
}

#[then(expr = "the next poll over {string} is answered with status {int}")]
async fn next_poll_status(world: &mut SessionWorld, transport: String, status: u16) {
    let request = poll_get(&transport, world.sid());
    let reply = world.server().serve_polling(&request).await;
    assert_eq!(reply.status, status);
}
