#![cfg(not(loom))]
//! Streaming transports through [`SocketServer::serve_stream`] over an
//! in-memory connection.

mod common;

use std::{sync::Arc, time::Duration};

use common::{HEARTBEAT, Harness, TestResult, fast_config};
use serde_json::json;
use socketframe::{
    ServerError,
    http::StatusCode,
    message::Message,
    server::SocketServer,
    session::SessionState,
    transport::TransportError,
};
use socketframe_testing::{channel_connection, recording_factory, recv_within, websocket_request};
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(1);

fn spawn_stream(
    server: &Arc<SocketServer>,
    sid: &str,
) -> (JoinHandle<Result<(), ServerError>>, socketframe_testing::ClientEnd) {
    let (connection, client) = channel_connection();
    let server = Arc::clone(server);
    let request = websocket_request(sid);
    let task = tokio::spawn(async move { server.serve_stream(&request, connection).await });
    (task, client)
}

fn shared_harness() -> (Arc<SocketServer>, tokio::sync::mpsc::UnboundedReceiver<Message>) {
    let (factory, inbound) = recording_factory();
    let server = SocketServer::new(fast_config(), factory).expect("valid config");
    (Arc::new(server), inbound)
}

#[tokio::test(start_paused = true)]
async fn connect_frame_is_written_first() -> TestResult {
    let (server, _inbound) = shared_harness();
    let sid = common::open_session(&server);
    let (task, mut client) = spawn_stream(&server, &sid);

    assert_eq!(recv_within!(WAIT, client.recv_message()), Message::connect());
    let session = server.registry().get(&sid).expect("live");
    assert_eq!(session.state(), SessionState::Connected);
    assert!(session.connection_confirmed());

    client.hang_up();
    task.await??;
    assert!(session.is_connected(), "closing the socket keeps the session");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn events_reach_the_worker() -> TestResult {
    let (server, mut inbound) = shared_harness();
    let sid = common::open_session(&server);
    let (task, mut client) = spawn_stream(&server, &sid);
    recv_within!(WAIT, client.recv());

    let event = Message::event("move", vec![json!({"x": 1})])?;
    client.send_message(&event);
    assert_eq!(recv_within!(WAIT, inbound.recv()), event);

    client.hang_up();
    task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn outbound_messages_are_written() -> TestResult {
    let (server, _inbound) = shared_harness();
    let sid = common::open_session(&server);
    let (task, mut client) = spawn_stream(&server, &sid);
    recv_within!(WAIT, client.recv());

    let session = server.registry().get(&sid).expect("live");
    session.send_event("news", vec![json!("hello")])?;
    assert_eq!(
        &recv_within!(WAIT, client.recv())[..],
        br#"5:::{"name":"news","args":["hello"]}"#
    );

    client.hang_up();
    task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn heartbeats_follow_the_interval() -> TestResult {
    let (server, _inbound) = shared_harness();
    let sid = common::open_session(&server);
    let (task, mut client) = spawn_stream(&server, &sid);
    recv_within!(WAIT, client.recv());

    let started = tokio::time::Instant::now();
    assert_eq!(
        recv_within!(HEARTBEAT * 2, client.recv_message()),
        Message::heartbeat()
    );
    assert!(started.elapsed() >= HEARTBEAT);
    // Keep the session alive from the client side.
    client.send_message(&Message::heartbeat());
    assert_eq!(
        recv_within!(HEARTBEAT * 2, client.recv_message()),
        Message::heartbeat()
    );

    client.hang_up();
    task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn disconnect_frame_ends_connection_and_session() -> TestResult {
    let (server, _inbound) = shared_harness();
    let sid = common::open_session(&server);
    let (task, mut client) = spawn_stream(&server, &sid);
    recv_within!(WAIT, client.recv());
    let session = server.registry().get(&sid).expect("live");

    client.send_message(&Message::disconnect());
    tokio::time::timeout(WAIT, task).await???;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!server.registry().contains(&sid));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn malformed_frame_drops_only_the_connection() -> TestResult {
    let (server, _inbound) = shared_harness();
    let sid = common::open_session(&server);
    let (task, mut client) = spawn_stream(&server, &sid);
    recv_within!(WAIT, client.recv());

    client.send("not a frame");
    let err = tokio::time::timeout(WAIT, task)
        .await??
        .expect_err("malformed frame is reported");
    assert!(matches!(
        err,
        ServerError::Transport(TransportError::Codec(_))
    ));
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    let session = server.registry().get(&sid).expect("still registered");
    assert!(session.is_connected());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn read_error_drops_only_the_connection() -> TestResult {
    let (server, _inbound) = shared_harness();
    let sid = common::open_session(&server);
    let (task, mut client) = spawn_stream(&server, &sid);
    recv_within!(WAIT, client.recv());

    client.fail(std::io::Error::other("reset by peer"));
    let err = tokio::time::timeout(WAIT, task)
        .await??
        .expect_err("read error is reported");
    assert!(matches!(err, ServerError::Transport(TransportError::Io(_))));
    assert!(server.registry().contains(&sid));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reconnect_keeps_pending_messages() -> TestResult {
    let (server, _inbound) = shared_harness();
    let sid = common::open_session(&server);
    let (task, mut client) = spawn_stream(&server, &sid);
    recv_within!(WAIT, client.recv());
    client.hang_up();
    task.await??;

    let session = server.registry().get(&sid).expect("live");
    session.send(Message::text("queued while away"))?;

    let (task, mut client) = spawn_stream(&server, &sid);
    assert_eq!(recv_within!(WAIT, client.recv_message()), Message::connect());
    assert_eq!(
        recv_within!(WAIT, client.recv_message()),
        Message::text("queued while away")
    );
    assert_eq!(session.hit_count(), 2);

    client.hang_up();
    task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unknown_session_is_rejected() {
    let harness = Harness::new(fast_config());
    let (connection, _client) = channel_connection();
    let err = harness
        .server
        .serve_stream(&websocket_request("missing"), connection)
        .await
        .expect_err("no such session");
    assert_eq!(err.status_code(), 404);
}
