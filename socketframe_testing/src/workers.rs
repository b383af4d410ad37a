//! Workers for exercising dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use socketframe::{
    message::Message,
    session::Session,
    worker::{Worker, WorkerError, WorkerFactory},
};
use tokio::sync::mpsc;

/// Forwards every inbound message to a channel.
struct RecordingWorker {
    tx: mpsc::UnboundedSender<Message>,
}

#[async_trait]
impl Worker for RecordingWorker {
    async fn run(self: Box<Self>, session: Arc<Session>) -> Result<(), WorkerError> {
        while let Some(message) = session.next_inbound().await {
            if self.tx.send(message).is_err() {
                break;
            }
        }
        Ok(())
    }
}

/// Factory whose workers forward inbound messages to the returned receiver.
#[must_use]
pub fn recording_factory() -> (WorkerFactory, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let factory: WorkerFactory = Arc::new(move |_session: &Arc<Session>| {
        Box::new(RecordingWorker { tx: tx.clone() }) as Box<dyn Worker>
    });
    (factory, rx)
}

/// Worker that fails, either by panicking or by returning an error, once it
/// receives its first inbound message.
#[derive(Debug, Clone)]
pub struct FailingWorker {
    reason: String,
    panic: bool,
}

#[async_trait]
impl Worker for FailingWorker {
    async fn run(self: Box<Self>, session: Arc<Session>) -> Result<(), WorkerError> {
        if session.next_inbound().await.is_none() {
            return Ok(());
        }
        if self.panic {
            panic!("{}", self.reason);
        }
        Err(WorkerError::failed(self.reason))
    }
}

fn failing(reason: &str, panic: bool) -> WorkerFactory {
    let worker = FailingWorker {
        reason: reason.to_owned(),
        panic,
    };
    Arc::new(move |_session: &Arc<Session>| Box::new(worker.clone()) as Box<dyn Worker>)
}

/// Factory whose workers panic with `reason`.
#[must_use]
pub fn panicking_factory(reason: &str) -> WorkerFactory { failing(reason, true) }

/// Factory whose workers return `reason` as an error.
#[must_use]
pub fn failing_factory(reason: &str) -> WorkerFactory { failing(reason, false) }
