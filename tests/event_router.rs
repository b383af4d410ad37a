#![cfg(not(loom))]
//! Event routing end to end over a streaming connection.

mod common;

use std::{sync::Arc, time::Duration};

use common::{TestResult, fast_config, open_session};
use serde_json::{Value, json};
use socketframe::{
    message::{Message, MessageId},
    router::{EventRouter, HandlerError, SERVER_ERROR_EVENT},
    server::SocketServer,
};
use socketframe_testing::{ClientEnd, channel_connection, recv_within, websocket_request};
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(1);

fn router() -> EventRouter {
    EventRouter::new()
        .on("", "ping", |_ctx, _args| async { Ok(Some(json!("pong"))) })
        .and_then(|r| {
            r.on("/chat", "say", |ctx, args: Vec<Value>| async move {
                let text = args.first().and_then(Value::as_str).unwrap_or_default();
                let who = ctx.owner().unwrap_or("nobody").to_owned();
                ctx.emit("said", vec![json!(who), json!(text)])?;
                Ok(None)
            })
        })
        .and_then(|r| {
            r.on("", "explode", |_ctx, _args| async {
                Err(HandlerError::new("handler exploded"))
            })
        })
        .expect("distinct registrations")
        .on_connect(|ctx| async move {
            let _ = ctx.session().send_event("welcome", vec![]);
        })
}

async fn connected() -> (Arc<SocketServer>, ClientEnd, JoinHandle<Result<(), socketframe::ServerError>>) {
    let server = SocketServer::new(fast_config(), router().into_factory()).expect("valid config");
    let server = Arc::new(server);
    let sid = open_session(&server);
    let (connection, mut client) = channel_connection();
    let request = websocket_request(&sid);
    let task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve_stream(&request, connection).await })
    };
    assert_eq!(recv_within!(WAIT, client.recv_message()), Message::connect());
    assert_eq!(
        recv_within!(WAIT, client.recv_message()),
        Message::event("welcome", vec![]).expect("valid name")
    );
    (server, client, task)
}

#[tokio::test(start_paused = true)]
async fn handler_result_is_acknowledged() -> TestResult {
    let (_server, mut client, task) = connected().await;
    client.send(r#"5:1+::{"name":"ping","args":[]}"#);
    assert_eq!(&recv_within!(WAIT, client.recv())[..], br#"6:::1+["pong"]"#);

    client.hang_up();
    task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn plain_id_gets_bare_ack() -> TestResult {
    let (_server, mut client, task) = connected().await;
    let ping = Message::event("ping", vec![])?.with_id(MessageId::new("9"));
    client.send_message(&ping);
    assert_eq!(recv_within!(WAIT, client.recv_message()), Message::ack("9", None));

    client.hang_up();
    task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn namespaced_handler_emits_in_namespace() -> TestResult {
    let (_server, mut client, task) = connected().await;
    client.send(r#"5::/chat:{"name":"say","args":["hi"]}"#);
    assert_eq!(
        &recv_within!(WAIT, client.recv())[..],
        br#"5::/chat:{"name":"said","args":["alice","hi"]}"#
    );

    client.hang_up();
    task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn handler_error_becomes_server_error_event() -> TestResult {
    let (server, mut client, task) = connected().await;
    client.send(r#"5:::{"name":"explode","args":[]}"#);
    assert_eq!(
        recv_within!(WAIT, client.recv_message()),
        Message::event(SERVER_ERROR_EVENT, vec![json!("handler exploded")])?
    );
    assert_eq!(server.registry().len(), 1, "session survives handler errors");

    client.hang_up();
    task.await??;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unknown_events_are_dropped() -> TestResult {
    let (_server, mut client, task) = connected().await;
    client.send(r#"5:::{"name":"nobody-listens","args":[]}"#);
    client.send(r#"5:2+::{"name":"ping","args":[]}"#);
    // The first reply belongs to the second event.
    assert_eq!(&recv_within!(WAIT, client.recv())[..], br#"6:::2+["pong"]"#);

    client.hang_up();
    task.await??;
    Ok(())
}
