#![cfg(not(loom))]
//! Long-polling transports through [`SocketServer::serve_polling`].

mod common;

use std::time::Duration;

use common::{HEARTBEAT, Harness, body, harness};
use rstest::rstest;
use serde_json::json;
use socketframe::{
    http::{Method, StatusCode},
    message::Message,
    request::TransportRequest,
    session::SessionState,
};
use socketframe_testing::{NAMESPACE, RequestHeaderExt, poll_get, poll_post, recv_within};

const WAIT: Duration = Duration::from_secs(1);

#[rstest]
#[tokio::test(start_paused = true)]
async fn first_request_confirms_connection(harness: Harness) {
    let sid = harness.open_session();
    let reply = harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    assert_eq!(reply.status, 200);
    assert_eq!(body(&reply), "1::");
    let session = harness.server.registry().get(&sid).expect("live");
    assert_eq!(session.state(), SessionState::Connected);
    assert!(session.connection_confirmed());
    assert_eq!(session.hit_count(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn posted_event_reaches_worker(mut harness: Harness) {
    let sid = harness.open_session();
    harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;

    let post = poll_post("xhr-polling", &sid, r#"5:::{"name":"say","args":["hi"]}"#);
    let reply = harness.server.serve_polling(&post).await;
    assert_eq!(body(&reply), "8::");
    assert_eq!(reply.header("Connection"), Some("close"));

    let received = recv_within!(WAIT, harness.inbound.recv());
    assert_eq!(
        received,
        Message::event("say", vec![json!("hi")]).expect("valid name")
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn get_returns_queued_messages_as_batch(harness: Harness) {
    let sid = harness.open_session();
    harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    let session = harness.server.registry().get(&sid).expect("live");
    session.send(Message::text("a")).expect("live");
    session.send_heartbeat().expect("live");

    let reply = harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    assert_eq!(body(&reply), "\u{fffd}5\u{fffd}3:::a\u{fffd}3\u{fffd}2::");
    assert!(session.outbound().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn idle_get_times_out_with_noop(harness: Harness) {
    let sid = harness.open_session();
    harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    let started = tokio::time::Instant::now();
    let reply = harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    assert_eq!(body(&reply), "8::");
    assert!(started.elapsed() >= HEARTBEAT);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn waiting_get_wakes_on_send(harness: Harness) {
    let sid = harness.open_session();
    harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    let session = harness.server.registry().get(&sid).expect("live");
    let sender = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        session.send(Message::text("late")).expect("live");
    });
    let reply = harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    assert_eq!(body(&reply), "3:::late");
    sender.await.expect("sender task");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn posted_heartbeat_is_counted_then_get_idles(harness: Harness) {
    let sid = harness.open_session();
    harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    let session = harness.server.registry().get(&sid).expect("live");
    assert_eq!(session.state(), SessionState::Connected);
    let before = session.heartbeat_count();

    let reply = harness
        .server
        .serve_polling(&poll_post("xhr-polling", &sid, "2::"))
        .await;
    assert_eq!(body(&reply), "8::");
    let reply = harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    assert_eq!(body(&reply), "8::");

    assert_eq!(session.heartbeat_count(), before + 1);
    assert!(session.inbound().is_empty());
    assert!(session.is_connected());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn malformed_post_unconfirms_session(harness: Harness) {
    let sid = harness.open_session();
    harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;

    let reply = harness
        .server
        .serve_polling(&poll_post("xhr-polling", &sid, "9:::nope"))
        .await;
    assert_eq!(reply.status, 400);
    let session = harness.server.registry().get(&sid).expect("still registered");
    assert!(session.is_connected());
    assert!(!session.connection_confirmed());

    let reply = harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    assert_eq!(body(&reply), "1::");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn confirmed_empty_post_answers_connect(harness: Harness) {
    let sid = harness.open_session();
    harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    let reply = harness
        .server
        .serve_polling(&poll_post("xhr-polling", &sid, ""))
        .await;
    assert_eq!(body(&reply), "1::");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn disconnect_post_kills_session(harness: Harness) {
    let sid = harness.open_session();
    harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    harness
        .server
        .serve_polling(&poll_post("xhr-polling", &sid, "0::"))
        .await;
    assert!(!harness.server.registry().contains(&sid));

    let reply = harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    assert_eq!(reply.status, 404);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn jsonp_wraps_replies_and_reads_form_posts(mut harness: Harness) {
    let sid = harness.open_session();
    let get = poll_get("jsonp-polling", &sid).with_query("t=1&i=1");
    let reply = harness.server.serve_polling(&get).await;
    assert_eq!(body(&reply), r#"io.j[1]("1::");"#);

    let post = poll_post("jsonp-polling", &sid, "d=%223%3A%3A%3Ahello%22");
    harness.server.serve_polling(&post).await;
    let received = recv_within!(WAIT, harness.inbound.recv());
    assert_eq!(received, Message::text("hello"));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn htmlfile_wraps_replies_in_script(harness: Harness) {
    let sid = harness.open_session();
    let reply = harness.server.serve_polling(&poll_get("htmlfile", &sid)).await;
    assert_eq!(body(&reply), r#"<script>_("1::");</script>"#);
    assert_eq!(
        reply.header("Content-Type"),
        Some("text/html; charset=UTF-8")
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn preflight_echoes_origin(harness: Harness) {
    let sid = harness.open_session();
    let request = TransportRequest::new(Method::OPTIONS, NAMESPACE, "xhr-polling", sid.as_str())
        .with_text_header("Origin", "http://app.example");
    let reply = harness.server.serve_polling(&request).await;
    assert_eq!(reply.status, 200);
    assert_eq!(
        reply.header("Access-Control-Allow-Origin"),
        Some("http://app.example")
    );
    let session = harness.server.registry().get(&sid).expect("live");
    assert!(!session.connection_confirmed());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn unknown_transport_is_bad_request(harness: Harness) {
    let sid = harness.open_session();
    let reply = harness.server.serve_polling(&poll_get("xhr-multipart", &sid)).await;
    assert_eq!(reply.status, 400);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn streaming_transport_is_forbidden_here(harness: Harness) {
    let sid = harness.open_session();
    let reply = harness.server.serve_polling(&poll_get("websocket", &sid)).await;
    assert_eq!(reply.status, 403);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn other_methods_are_not_allowed(harness: Harness) {
    let sid = harness.open_session();
    harness.server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    let request = TransportRequest::new(Method::DELETE, NAMESPACE, "xhr-polling", sid.as_str());
    let reply = harness.server.serve_polling(&request).await;
    assert_eq!(reply.status, StatusCode::METHOD_NOT_ALLOWED);
}
