//! Session workers and their dispatch.
//!
//! A worker is the single consumer of a session's inbound queue. Transports
//! call [`WorkerDispatch::ensure_worker_running`] on every bind; only the
//! first call for a session spawns anything. That call starts a supervising
//! task which owns the session's worker for the session's whole life.
//!
//! Worker failures, whether returned errors or panics, are logged and
//! reported to the client as an error frame but never kill the session. The
//! supervisor builds a fresh worker from the factory after a
//! [`RestartBackoff`] delay, so inbound messages keep being consumed without
//! waiting for the client to reconnect.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{message::Message, metrics, session::Session};

mod backoff;
mod slot;

pub use backoff::RestartBackoff;
pub use slot::WorkerSlot;

/// Failure reported by a worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker panicked; the payload is rendered as text.
    #[error("worker panicked: {0}")]
    Panicked(String),

    /// The worker returned an error.
    #[error("worker failed: {0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl WorkerError {
    /// Wrap an arbitrary error as [`WorkerError::Failed`].
    pub fn failed(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Failed(err.into())
    }
}

/// Consumer of one session's inbound messages.
#[async_trait]
pub trait Worker: Send + 'static {
    /// Process messages until the session's inbound queue closes.
    async fn run(self: Box<Self>, session: Arc<Session>) -> Result<(), WorkerError>;
}

/// Builds the worker for a session the first time it binds a transport.
pub type WorkerFactory = Arc<dyn Fn(&Arc<Session>) -> Box<dyn Worker> + Send + Sync>;

/// Render a panic payload for logging.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .copied()
        .map(str::to_owned)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "<non-string panic>".to_owned())
}

/// Spawns, supervises and tracks session workers.
#[derive(Clone, Debug, Default)]
pub struct WorkerDispatch {
    tracker: TaskTracker,
    shutdown: CancellationToken,
    backoff: RestartBackoff,
}

impl WorkerDispatch {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Wait according to `backoff` before restarting failed workers.
    #[must_use]
    pub fn with_backoff(mut self, backoff: RestartBackoff) -> Self {
        self.backoff = backoff.normalized();
        self
    }

    /// Start a worker for `session` unless one is already attached.
    ///
    /// The attached flag is set in the same critical section that builds and
    /// spawns the worker. It stays set for the rest of the session's life.
    /// Returns `true` if this call started the worker.
    pub fn ensure_worker_running(&self, session: &Arc<Session>, factory: &WorkerFactory) -> bool {
        session.worker_slot().claim_with(|| {
            let worker = factory(session);
            self.spawn(Arc::clone(session), worker, Arc::clone(factory));
        })
    }

    fn spawn(&self, session: Arc<Session>, worker: Box<dyn Worker>, factory: WorkerFactory) {
        let shutdown = self.shutdown.clone();
        let backoff = self.backoff;
        metrics::inc_workers();
        tracing::debug!(session_id = %session.id(), "starting session worker");
        self.tracker.spawn(async move {
            let mut worker = worker;
            let mut delay = backoff.initial_delay;
            loop {
                let started = Instant::now();
                let Some(err) = run_once(worker, &session, &shutdown).await else {
                    return;
                };
                report_failure(&session, &err);
                if started.elapsed() >= backoff.max_delay {
                    delay = backoff.initial_delay;
                }
                tokio::select! {
                    biased;

                    () = shutdown.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                }
                if !session.is_live() {
                    tracing::debug!(session_id = %session.id(), "session ended before worker restart");
                    return;
                }
                delay = backoff.next(delay);
                metrics::inc_workers();
                tracing::info!(session_id = %session.id(), "restarting session worker");
                worker = factory(&session);
            }
        });
    }

    /// Number of supervised workers still running.
    #[must_use]
    pub fn active(&self) -> usize { self.tracker.len() }

    /// Cancel all workers and wait for them to stop.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.shutdown.cancel();
        self.tracker.wait().await;
    }
}

/// Run `worker` to completion, returning its failure if it had one.
async fn run_once(
    worker: Box<dyn Worker>,
    session: &Arc<Session>,
    shutdown: &CancellationToken,
) -> Option<WorkerError> {
    let run = AssertUnwindSafe(worker.run(Arc::clone(session))).catch_unwind();
    let outcome = tokio::select! {
        biased;

        () = shutdown.cancelled() => {
            tracing::debug!(session_id = %session.id(), "session worker cancelled");
            return None;
        }
        outcome = run => outcome,
    };
    match outcome {
        Ok(Ok(())) => {
            tracing::debug!(session_id = %session.id(), "session worker finished");
            None
        }
        Ok(Err(err)) => Some(err),
        Err(panic) => {
            let panic_msg = panic_message(panic.as_ref());
            tracing::error!(panic = %panic_msg, session_id = %session.id(), "session worker panicked");
            Some(WorkerError::Panicked(panic_msg))
        }
    }
}

/// Log a worker failure and tell the client about it.
fn report_failure(session: &Session, err: &WorkerError) {
    tracing::error!(session_id = %session.id(), error = %err, "session worker failed");
    metrics::inc_errors("worker");
    if let Err(send_err) = session.send(Message::error(err.to_string(), None)) {
        tracing::debug!(session_id = %session.id(), error = %send_err, "could not report worker failure");
    }
}
