//! Registry for server-initiated traffic.
//!
//! The server sends its own requests (capability registration,
//! configuration pulls, diagnostics refresh) and notifications (log
//! messages, progress, published diagnostics). Handlers for those are
//! registered on the builder before the process starts, so nothing the
//! server legitimately sends during the handshake can go unanswered.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Async callback answering a server request. An `Err` becomes a JSON-RPC
/// error response; the session itself is unaffected.
pub type RequestHandler =
    Arc<dyn Fn(Option<serde_json::Value>) -> BoxFuture<anyhow::Result<serde_json::Value>> + Send + Sync>;

/// Async callback consuming a server notification. Best-effort: the result
/// is ignored.
pub type NotificationHandler =
    Arc<dyn Fn(Option<serde_json::Value>) -> BoxFuture<()> + Send + Sync>;

/// Method-name keyed handler tables. Lifetime = the client session.
#[derive(Default, Clone)]
pub(crate) struct HandlerRegistry {
    requests: HashMap<String, RequestHandler>,
    notifications: HashMap<String, NotificationHandler>,
}

impl HandlerRegistry {
    pub fn insert_request(&mut self, method: impl Into<String>, handler: RequestHandler) {
        self.requests.insert(method.into(), handler);
    }

    pub fn insert_notification(&mut self, method: impl Into<String>, handler: NotificationHandler) {
        self.notifications.insert(method.into(), handler);
    }

    pub fn request(&self, method: &str) -> Option<&RequestHandler> {
        self.requests.get(method)
    }

    pub fn notification(&self, method: &str) -> Option<&NotificationHandler> {
        self.notifications.get(method)
    }
}

/// Wrap an async closure as a [`RequestHandler`].
pub fn request_handler<F, Fut>(f: F) -> RequestHandler
where
    F: Fn(Option<serde_json::Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
{
    Arc::new(move |params| -> BoxFuture<anyhow::Result<serde_json::Value>> {
        Box::pin(f(params))
    })
}

/// Wrap an async closure as a [`NotificationHandler`].
pub fn notification_handler<F, Fut>(f: F) -> NotificationHandler
where
    F: Fn(Option<serde_json::Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |params| -> BoxFuture<()> { Box::pin(f(params)) })
}

/// A request handler that acknowledges with `null`, the answer for
/// capability (de)registration and diagnostics-refresh requests this core
/// does not act on.
pub(crate) fn ack_handler() -> RequestHandler {
    request_handler(|_params| async { Ok(serde_json::Value::Null) })
}
