#![cfg(not(loom))]
//! Worker dispatch: one worker per session, failures reported not fatal,
//! failed workers restarted in place.

mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use common::{open_session, server_with};
use rstest::rstest;
use socketframe::{
    message::{Message, Payload},
    session::{Dequeued, Session},
    worker::{Worker, WorkerDispatch, WorkerError, WorkerFactory},
};
use socketframe_testing::{
    LoggerHandle,
    failing_factory,
    logger,
    panicking_factory,
    poll_get,
    poll_post,
    recording_factory,
    recv_within,
};
use tokio::time::Instant;

struct IdleWorker;

#[async_trait]
impl Worker for IdleWorker {
    async fn run(self: Box<Self>, session: Arc<Session>) -> Result<(), WorkerError> {
        while session.next_inbound().await.is_some() {}
        Ok(())
    }
}

fn counting_factory(count: Arc<AtomicUsize>) -> WorkerFactory {
    Arc::new(move |_session: &Arc<Session>| {
        count.fetch_add(1, Ordering::SeqCst);
        Box::new(IdleWorker) as Box<dyn Worker>
    })
}

#[tokio::test(start_paused = true)]
async fn concurrent_binds_start_one_worker() {
    let count = Arc::new(AtomicUsize::new(0));
    let server = Arc::new(server_with(counting_factory(Arc::clone(&count))));
    let sid = open_session(&server);

    let polls = (0..8).map(|_| {
        let server = Arc::clone(&server);
        let request = poll_get("xhr-polling", &sid);
        tokio::spawn(async move { server.serve_polling(&request).await })
    });
    for poll in polls.collect::<Vec<_>>() {
        poll.await.expect("poll task");
    }
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(server.dispatch().active(), 1);
}

#[tokio::test]
async fn ensure_worker_running_reports_first_start() {
    let count = Arc::new(AtomicUsize::new(0));
    let factory = counting_factory(Arc::clone(&count));
    let server = server_with(Arc::clone(&factory));
    let sid = open_session(&server);
    let session = server.registry().get(&sid).expect("registered");

    let dispatch = WorkerDispatch::new();
    assert!(dispatch.ensure_worker_running(&session, &factory));
    assert!(!dispatch.ensure_worker_running(&session, &factory));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    session.kill();
    dispatch.shutdown().await;
}

async fn error_frame_after_failure(factory: WorkerFactory) -> (Arc<Session>, Message) {
    let server = server_with(factory);
    let sid = open_session(&server);
    server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    server
        .serve_polling(&poll_post("xhr-polling", &sid, "3:::boom"))
        .await;
    let session = server.registry().get(&sid).expect("session survives");
    match session.outbound().pop_timeout(Duration::from_secs(1)).await {
        Dequeued::Item(frame) => (session, frame),
        other => panic!("expected an error frame, got {other:?}"),
    }
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn panicking_worker_sends_error_frame(mut logger: LoggerHandle) {
    let (session, frame) = error_frame_after_failure(panicking_factory("kaboom")).await;
    assert!(matches!(
        frame.payload,
        Payload::Error { ref reason, advice: None } if reason.contains("kaboom")
    ));
    assert!(session.is_connected());
    assert!(session.worker_attached());
    assert!(logger.drain_contains(log::Level::Error, "kaboom"));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn failing_worker_sends_error_frame() {
    let (session, frame) = error_frame_after_failure(failing_factory("db down")).await;
    assert_eq!(frame, Message::error("worker failed: db down", None));
    assert!(session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn failed_worker_is_restarted_without_a_new_bind() {
    let count = Arc::new(AtomicUsize::new(0));
    let first = panicking_factory("first run");
    let (recording, mut seen) = recording_factory();
    let counter = Arc::clone(&count);
    let factory: WorkerFactory = Arc::new(move |session: &Arc<Session>| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            first(session)
        } else {
            recording(session)
        }
    });

    let (session, frame) = error_frame_after_failure(factory).await;
    assert_eq!(frame, Message::error("worker panicked: first run", None));

    for i in 0..5 {
        session
            .route_inbound(Message::text(format!("after {i}")))
            .expect("session accepts messages");
    }
    for i in 0..5 {
        let message = recv_within!(Duration::from_secs(1), seen.recv());
        assert_eq!(message, Message::text(format!("after {i}")));
    }
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert!(session.worker_attached());
    assert!(session.inbound().is_empty());
    assert!(session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn repeated_failures_back_off() {
    let count = Arc::new(AtomicUsize::new(0));
    let failing = failing_factory("db down");
    let counter = Arc::clone(&count);
    let factory: WorkerFactory = Arc::new(move |session: &Arc<Session>| {
        counter.fetch_add(1, Ordering::SeqCst);
        failing(session)
    });
    let server = server_with(factory);
    let sid = open_session(&server);
    server.serve_polling(&poll_get("xhr-polling", &sid)).await;
    let session = server.registry().get(&sid).expect("registered");

    let started = Instant::now();
    for i in 0..3 {
        session
            .route_inbound(Message::text(format!("job {i}")))
            .expect("session accepts messages");
    }
    for _ in 0..3 {
        match session.outbound().pop_timeout(Duration::from_secs(1)).await {
            Dequeued::Item(frame) => assert_eq!(frame, Message::error("worker failed: db down", None)),
            other => panic!("expected an error frame, got {other:?}"),
        }
    }
    // Restarts wait 10ms then 20ms.
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert!(count.load(Ordering::SeqCst) >= 3);
    assert!(session.worker_attached());
}
