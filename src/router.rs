//! Event routing worker.
//!
//! [`EventRouter`] maps `(namespace, event name)` to an async handler. It is
//! built once at startup and shared by every session through
//! [`EventRouter::into_factory`], which yields a [`WorkerFactory`] producing a
//! [`RouterWorker`] per session.
//!
//! ```
//! use serde_json::json;
//! use socketframe::router::EventRouter;
//!
//! let router = EventRouter::new()
//!     .on("", "ping", |_ctx, _args| async { Ok(Some(json!("pong"))) })
//!     .unwrap();
//! assert!(router.handles("", "ping"));
//! ```

use std::{collections::HashMap, future::Future, sync::Arc};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use crate::{
    message::{Message, MessageId, Payload, is_reserved_event},
    metrics,
    session::{Session, SessionError},
    worker::{Worker, WorkerError, WorkerFactory},
};

/// Event emitted to the client when a handler fails.
pub const SERVER_ERROR_EVENT: &str = "server-error";

/// Registration errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    /// A handler for this namespace and event already exists.
    #[error("handler already registered for event {event:?} in namespace {namespace:?}")]
    DuplicateHandler { namespace: String, event: String },

    /// Reserved names never reach the server, so a handler would be dead.
    #[error("cannot register handler for reserved event {0:?}")]
    ReservedEvent(String),
}

/// Error returned by an event handler.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<SessionError> for HandlerError {
    fn from(err: SessionError) -> Self { Self::new(err.to_string()) }
}

/// Per-event context handed to handlers and hooks.
#[derive(Clone, Debug)]
pub struct EventContext {
    session: Arc<Session>,
    namespace: String,
    message_id: Option<MessageId>,
}

impl EventContext {
    #[must_use]
    pub fn session(&self) -> &Arc<Session> { &self.session }

    /// Principal that owns the session.
    #[must_use]
    pub fn owner(&self) -> Option<&str> { self.session.owner() }

    #[must_use]
    pub fn namespace(&self) -> &str { &self.namespace }

    /// Id of the message being handled, if the client sent one.
    #[must_use]
    pub fn message_id(&self) -> Option<&MessageId> { self.message_id.as_ref() }

    /// Send an event back to the client in the same namespace.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the name is reserved or the session closed.
    pub fn emit(&self, name: &str, args: Vec<Value>) -> Result<(), SessionError> {
        let message = Message::event(name, args)?.in_namespace(self.namespace.clone());
        self.session.send(message)
    }
}

type Handler =
    Arc<dyn Fn(EventContext, Vec<Value>) -> BoxFuture<'static, Result<Option<Value>, HandlerError>> + Send + Sync>;
type Hook = Arc<dyn Fn(EventContext) -> BoxFuture<'static, ()> + Send + Sync>;

/// Registry of event handlers and lifecycle hooks.
#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<(String, String), Handler>,
    on_connect: Vec<Hook>,
    on_disconnect: Vec<Hook>,
}

impl EventRouter {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `handler` for `event` in `namespace` (`""` is the default
    /// namespace).
    ///
    /// The handler's `Ok(Some(value))` becomes the acknowledgement payload
    /// when the client asked for one.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::DuplicateHandler`] if the pair is already
    /// registered and [`RouterError::ReservedEvent`] for reserved names.
    pub fn on<F, Fut>(
        mut self,
        namespace: impl Into<String>,
        event: impl Into<String>,
        handler: F,
    ) -> Result<Self, RouterError>
    where
        F: Fn(EventContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, HandlerError>> + Send + 'static,
    {
        let namespace = namespace.into();
        let event = event.into();
        if is_reserved_event(&event) {
            return Err(RouterError::ReservedEvent(event));
        }
        if self.handles(&namespace, &event) {
            return Err(RouterError::DuplicateHandler { namespace, event });
        }
        let handler: Handler = Arc::new(move |ctx, args| Box::pin(handler(ctx, args)));
        self.handlers.insert((namespace, event), handler);
        Ok(self)
    }

    /// Run `hook` when a worker starts for a session.
    #[must_use]
    pub fn on_connect<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_connect.push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Run `hook` once the session's inbound queue has closed.
    #[must_use]
    pub fn on_disconnect<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_disconnect.push(Arc::new(move |ctx| Box::pin(hook(ctx))));
        self
    }

    /// Whether a handler is registered for `event` in `namespace`.
    #[must_use]
    pub fn handles(&self, namespace: &str, event: &str) -> bool {
        self.handlers
            .contains_key(&(namespace.to_owned(), event.to_owned()))
    }

    /// Share the router as a worker factory.
    #[must_use]
    pub fn into_factory(self) -> WorkerFactory {
        let router = Arc::new(self);
        Arc::new(move |_session: &Arc<Session>| {
            Box::new(RouterWorker {
                router: Arc::clone(&router),
            }) as Box<dyn Worker>
        })
    }

    async fn run_hooks(hooks: &[Hook], session: &Arc<Session>) {
        for hook in hooks {
            hook(EventContext {
                session: Arc::clone(session),
                namespace: String::new(),
                message_id: None,
            })
            .await;
        }
    }

    async fn dispatch(&self, session: &Arc<Session>, message: Message) {
        let Message {
            id,
            namespace,
            payload,
        } = message;
        let (name, args) = match payload {
            Payload::Event { name, args } => (name, args),
            other => {
                tracing::warn!(
                    session_id = %session.id(),
                    kind = ?other.kind(),
                    "dropping message with no handler"
                );
                return;
            }
        };
        let Some(handler) = self.handlers.get(&(namespace.clone(), name.clone())) else {
            tracing::warn!(session_id = %session.id(), %namespace, event = %name, "no handler for event");
            return;
        };
        let ctx = EventContext {
            session: Arc::clone(session),
            namespace: namespace.clone(),
            message_id: id.clone(),
        };
        let outcome = match handler(ctx, args).await {
            Ok(result) => match id {
                Some(id) if id.wants_data() => session.send(
                    Message::ack(id.value(), Some(vec![result.unwrap_or(Value::Null)]))
                        .in_namespace(namespace),
                ),
                Some(id) => session.send(Message::ack(id.value(), None).in_namespace(namespace)),
                None => Ok(()),
            },
            Err(err) => {
                tracing::warn!(session_id = %session.id(), event = %name, error = %err, "event handler failed");
                metrics::inc_errors("handler");
                Message::event(SERVER_ERROR_EVENT, vec![Value::String(err.to_string())])
                    .map_err(SessionError::from)
                    .and_then(|msg| session.send(msg.in_namespace(namespace)))
            }
        };
        if let Err(err) = outcome {
            tracing::debug!(session_id = %session.id(), error = %err, "could not deliver handler reply");
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("on_connect", &self.on_connect.len())
            .field("on_disconnect", &self.on_disconnect.len())
            .finish()
    }
}

/// Worker that feeds a session's inbound events through an [`EventRouter`].
#[derive(Debug)]
pub struct RouterWorker {
    router: Arc<EventRouter>,
}

#[async_trait]
impl Worker for RouterWorker {
    async fn run(self: Box<Self>, session: Arc<Session>) -> Result<(), WorkerError> {
        EventRouter::run_hooks(&self.router.on_connect, &session).await;
        while let Some(message) = session.next_inbound().await {
            self.router.dispatch(&session, message).await;
        }
        EventRouter::run_hooks(&self.router.on_disconnect, &session).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(
        _ctx: EventContext,
        _args: Vec<Value>,
    ) -> impl Future<Output = Result<Option<Value>, HandlerError>> {
        async { Ok(None) }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let err = EventRouter::new()
            .on("/chat", "say", noop)
            .and_then(|r| r.on("/chat", "say", noop))
            .expect_err("duplicate handler");
        assert_eq!(
            err,
            RouterError::DuplicateHandler {
                namespace: "/chat".into(),
                event: "say".into(),
            }
        );
    }

    #[test]
    fn same_event_in_other_namespace_is_allowed() {
        let router = EventRouter::new()
            .on("/chat", "say", noop)
            .and_then(|r| r.on("", "say", noop))
            .expect("distinct namespaces");
        assert!(router.handles("", "say"));
        assert!(router.handles("/chat", "say"));
        assert!(!router.handles("/news", "say"));
    }

    #[test]
    fn reserved_events_cannot_be_handled() {
        let err = EventRouter::new()
            .on("", "connect", noop)
            .expect_err("reserved event");
        assert_eq!(err, RouterError::ReservedEvent("connect".into()));
    }
}
