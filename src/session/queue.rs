//! Unbounded FIFO queue shared between a session and its transports.
//!
//! A queue is closed exactly once, when the session is killed. Closing wakes
//! every blocked reader: items already queued are still handed out in order
//! and readers then observe [`Dequeued::Closed`].

use std::{
    collections::VecDeque,
    pin::pin,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::sync::Notify;

use super::SessionError;

/// Queue length at which a backlog warning is logged, and every multiple of it.
pub const BACKLOG_WARNING_THRESHOLD: usize = 1000;

/// Result of a bounded wait on a [`SessionQueue`].
#[derive(Debug, PartialEq)]
pub enum Dequeued<T> {
    Item(T),
    /// The queue was closed and is empty.
    Closed,
    TimedOut,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// FIFO queue with a close sentinel.
pub struct SessionQueue<T> {
    label: &'static str,
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> SessionQueue<T> {
    /// Create an empty queue; `label` names it in log output.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `item`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] once the queue has been closed.
    pub fn push(&self, item: T) -> Result<(), SessionError> {
        let len = {
            let mut state = self.lock();
            if state.closed {
                return Err(SessionError::Closed);
            }
            state.items.push_back(item);
            state.items.len()
        };
        if len % BACKLOG_WARNING_THRESHOLD == 0 {
            tracing::warn!(queue = self.label, len, "session queue backlog growing");
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Close the queue and wake all waiters.
    ///
    /// Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let newly_closed = {
            let mut state = self.lock();
            !std::mem::replace(&mut state.closed, true)
        };
        if newly_closed {
            self.notify.notify_waiters();
        }
        newly_closed
    }

    /// Remove the next item, waiting until one arrives.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub async fn pop_timeout(&self, timeout: Duration) -> Dequeued<T> {
        match tokio::time::timeout(timeout, self.pop()).await {
            Ok(Some(item)) => Dequeued::Item(item),
            Ok(None) => Dequeued::Closed,
            Err(_) => Dequeued::TimedOut,
        }
    }

    /// Remove the next item without waiting.
    pub fn try_pop(&self) -> Option<T> { self.lock().items.pop_front() }

    /// Remove every item currently queued.
    pub fn drain(&self) -> Vec<T> { self.lock().items.drain(..).collect() }

    #[must_use]
    pub fn len(&self) -> usize { self.lock().items.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.lock().items.is_empty() }

    #[must_use]
    pub fn is_closed(&self) -> bool { self.lock().closed }
}

impl<T> std::fmt::Debug for SessionQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SessionQueue")
            .field("label", &self.label)
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}
