//! The client session: correlation table, read loop, handshake, and
//! lifecycle.
//!
//! One session owns one language-server process and three tasks:
//!
//! - a writer task, sole owner of the [`FrameWriter`], fed by a channel so
//!   outbound frames never interleave;
//! - a reader task driving the [`FrameReader`]: responses resolve the
//!   correlation table inline, server requests and notifications are
//!   forwarded to the handler task;
//! - a handler task invoking registered callbacks in arrival order, so a
//!   slow handler delays other handlers but never frame delivery or
//!   response correlation.
//!
//! Closing the transport is the one cancellation primitive: it ends the
//! read loop and fails every outstanding request with `TransportClosed`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::codec::{FrameReader, FrameWriter};
use crate::documents::{DocumentScope, DocumentStore};
use crate::error::{Error, Result};
use crate::handlers::{
    HandlerRegistry, NotificationHandler, RequestHandler, ack_handler, notification_handler,
    request_handler,
};
use crate::protocol::{self, Incoming, Notification, Request};
use crate::settings::Settings;
use crate::transport::Transport;
use crate::types::{LaunchConfig, ServerCapabilities};

const INIT_TIMEOUT: Duration = Duration::from_secs(30);

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Handshake/lifecycle state. Feature calls are permitted only in
/// `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NotStarted,
    Starting,
    Initializing,
    Initialized,
    Active,
    Stopping,
    Stopped,
}

pub(crate) enum WriterCommand {
    Send(serde_json::Value),
    Shutdown,
}

enum HandlerWork {
    Request {
        id: serde_json::Value,
        method: String,
        params: Option<serde_json::Value>,
    },
    Notification {
        method: String,
        params: Option<serde_json::Value>,
    },
}

type PendingMap = HashMap<u64, oneshot::Sender<Result<serde_json::Value>>>;

/// State shared between the session handle and its tasks: the writer
/// channel, the correlation table, the id allocator, and the lifecycle
/// state.
pub(crate) struct SessionCore {
    pub(crate) writer_tx: mpsc::UnboundedSender<WriterCommand>,
    pending: Mutex<PendingMap>,
    next_id: AtomicU64,
    state: std::sync::Mutex<SessionState>,
}

impl SessionCore {
    fn new(writer_tx: mpsc::UnboundedSender<WriterCommand>) -> Self {
        Self {
            writer_tx,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            state: std::sync::Mutex::new(SessionState::NotStarted),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_state(&self, next: SessionState) {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = next;
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        let state = self.state();
        if state == SessionState::Active {
            Ok(())
        } else {
            Err(Error::NotReady { state })
        }
    }

    /// Send a request and await the matching response.
    ///
    /// Ids are allocated monotonically and never reused while
    /// outstanding; responses may arrive in any order. On deadline expiry
    /// the pending entry is removed so only this caller fails.
    pub(crate) async fn request(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
        deadline: Option<Duration>,
    ) -> Result<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = Request::new(id, method, params).into_frame();
        if self.writer_tx.send(WriterCommand::Send(frame)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(Error::TransportClosed);
        }

        let outcome = match deadline {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.pending.lock().await.remove(&id);
                    return Err(Error::Timeout { method });
                }
            },
            None => rx.await,
        };

        match outcome {
            Ok(result) => result,
            Err(_) => {
                // Sender dropped without resolving; the session is gone.
                self.pending.lock().await.remove(&id);
                Err(Error::TransportClosed)
            }
        }
    }

    /// Enqueue a notification. Fails only if the writer is gone.
    pub(crate) fn notify(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<()> {
        let frame = Notification::new(method, params).into_frame();
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .map_err(|_| Error::TransportClosed)
    }

    /// Resolve or fail the pending request matching `id`.
    ///
    /// A response with no matching entry is a peer protocol violation:
    /// logged and discarded, never fatal.
    async fn resolve_response(
        &self,
        id: u64,
        result: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
    ) {
        let sender = self.pending.lock().await.remove(&id);
        match sender {
            Some(tx) => {
                let outcome = match error {
                    Some(err) => Err(Error::from_remote(&err)),
                    None => Ok(result.unwrap_or(serde_json::Value::Null)),
                };
                let _ = tx.send(outcome);
            }
            None => {
                tracing::warn!(id, "response for unknown request id, discarding");
            }
        }
    }

    /// Fail every outstanding request with `TransportClosed`.
    async fn fail_pending(&self) {
        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "failing outstanding requests");
        }
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(Error::TransportClosed));
        }
    }

    #[cfg(test)]
    async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Configures and starts a [`ClientSession`].
///
/// All handler registrations happen here, before the process is spawned,
/// so every request method the server may send during the handshake
/// already has an answer installed.
pub struct SessionBuilder {
    config: LaunchConfig,
    settings: Settings,
    registry: HandlerRegistry,
    init_timeout: Duration,
}

impl SessionBuilder {
    #[must_use]
    pub fn new(config: LaunchConfig) -> Self {
        Self {
            config,
            settings: Settings::default(),
            registry: HandlerRegistry::default(),
            init_timeout: INIT_TIMEOUT,
        }
    }

    /// Replace the settings tree pushed to (and pulled by) the server.
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Register a handler for a server-initiated request method,
    /// overriding the built-in default for that method if any.
    #[must_use]
    pub fn on_request(mut self, method: impl Into<String>, handler: RequestHandler) -> Self {
        self.registry.insert_request(method, handler);
        self
    }

    /// Register a handler for a server notification method.
    #[must_use]
    pub fn on_notification(
        mut self,
        method: impl Into<String>,
        handler: NotificationHandler,
    ) -> Self {
        self.registry.insert_notification(method, handler);
        self
    }

    /// Deadline for the `initialize` round trip.
    #[must_use]
    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    /// Spawn the server process and run the handshake to completion.
    pub async fn start(self) -> Result<ClientSession> {
        let (transport, stdin, stdout) = Transport::start(&self.config)?;
        // On handshake failure the transport drops here; kill_on_drop
        // reaps the child and the tasks unwind on EOF.
        self.connect(stdout, stdin, Some(transport)).await
    }

    /// Run the session over caller-supplied streams instead of a spawned
    /// process. Useful for tests and embedding.
    pub async fn start_io<R, W>(self, reader: R, writer: W) -> Result<ClientSession>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.connect(reader, writer, None).await
    }

    async fn connect<R, W>(
        mut self,
        reader: R,
        writer: W,
        transport: Option<Transport>,
    ) -> Result<ClientSession>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let settings = Arc::new(self.settings.clone());
        install_default_handlers(&mut self.registry, &settings);

        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<WriterCommand>();
        let core = Arc::new(SessionCore::new(writer_tx.clone()));
        core.set_state(SessionState::Starting);

        let writer_handle = tokio::spawn(async move {
            let mut frames = FrameWriter::new(writer);
            while let Some(cmd) = writer_rx.recv().await {
                match cmd {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = frames.write_frame(&frame).await {
                            tracing::warn!("LSP write error: {e}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let (work_tx, mut work_rx) = mpsc::unbounded_channel::<HandlerWork>();
        let registry = self.registry;
        let handler_writer_tx = writer_tx.clone();
        let handler_handle = tokio::spawn(async move {
            while let Some(work) = work_rx.recv().await {
                match work {
                    HandlerWork::Request { id, method, params } => {
                        let reply = match registry.request(&method) {
                            Some(handler) => match handler(params).await {
                                Ok(result) => protocol::response_frame(&id, result),
                                Err(e) => {
                                    tracing::debug!("handler for '{method}' failed: {e:#}");
                                    protocol::error_frame(&id, -32603, &e.to_string())
                                }
                            },
                            None => {
                                tracing::debug!(
                                    "server request '{method}' has no handler, replying method not found"
                                );
                                protocol::error_frame(
                                    &id,
                                    -32601,
                                    &format!("Method not found: {method}"),
                                )
                            }
                        };
                        let _ = handler_writer_tx.send(WriterCommand::Send(reply));
                    }
                    HandlerWork::Notification { method, params } => {
                        match registry.notification(&method) {
                            Some(handler) => handler(params).await,
                            None => {
                                tracing::trace!("ignoring notification: {method}");
                            }
                        }
                    }
                }
            }
        });

        let reader_core = core.clone();
        let reader_handle = tokio::spawn(async move {
            let mut frames = FrameReader::new(reader);
            loop {
                match frames.read_frame().await {
                    Ok(Some(frame)) => match protocol::classify(&frame) {
                        Some(Incoming::Response { id, result, error }) => {
                            reader_core.resolve_response(id, result, error).await;
                        }
                        Some(Incoming::Request { id, method, params }) => {
                            let _ = work_tx.send(HandlerWork::Request { id, method, params });
                        }
                        Some(Incoming::Notification { method, params }) => {
                            let _ = work_tx.send(HandlerWork::Notification { method, params });
                        }
                        None => {
                            tracing::trace!("ignoring malformed JSON-RPC frame");
                        }
                    },
                    Ok(None) => {
                        tracing::info!("language server closed its output stream");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("LSP read error: {e}");
                        break;
                    }
                }
            }
            reader_core.set_state(SessionState::Stopped);
            reader_core.fail_pending().await;
            let _ = reader_core.writer_tx.send(WriterCommand::Shutdown);
        });

        // Handshake: initialize -> capabilities -> initialized ->
        // configuration push. Strictly ordered, no feature calls until
        // Active.
        core.set_state(SessionState::Initializing);
        let root_uri = protocol::path_to_file_uri(&self.config.workspace_root)
            .map_err(|e| Error::ProcessLaunch(e.to_string()))?;
        let init_params = protocol::initialize_params(&self.config.workspace_root, &root_uri);
        let init_result = core
            .request("initialize", Some(init_params), Some(self.init_timeout))
            .await?;
        let capabilities = ServerCapabilities::new(
            init_result
                .get("capabilities")
                .cloned()
                .unwrap_or_default(),
        );

        core.set_state(SessionState::Initialized);
        core.notify("initialized", Some(serde_json::json!({})))?;
        core.notify(
            "workspace/didChangeConfiguration",
            Some(settings.to_push_payload()),
        )?;
        core.set_state(SessionState::Active);
        tracing::info!(
            root = %self.config.workspace_root.display(),
            "language server session active"
        );

        Ok(ClientSession {
            core,
            documents: Arc::new(DocumentStore::default()),
            capabilities,
            workspace_root: self.config.workspace_root,
            language_id: self.config.language_id,
            transport,
            reader_handle,
            writer_handle,
            handler_handle,
        })
    }
}

/// Fill in handlers for everything pyright legitimately sends, skipping
/// methods the caller already registered.
fn install_default_handlers(registry: &mut HandlerRegistry, settings: &Arc<Settings>) {
    if registry.request("workspace/configuration").is_none() {
        let settings = settings.clone();
        registry.insert_request(
            "workspace/configuration",
            request_handler(move |params| {
                let settings = settings.clone();
                async move { Ok(settings.configuration_reply(params.as_ref())) }
            }),
        );
    }

    for method in [
        "client/registerCapability",
        "client/unregisterCapability",
        "workspace/diagnostic/refresh",
    ] {
        if registry.request(method).is_none() {
            registry.insert_request(method, ack_handler());
        }
    }

    if registry.notification("window/logMessage").is_none() {
        registry.insert_notification(
            "window/logMessage",
            notification_handler(|params| async move {
                let kind = params
                    .as_ref()
                    .and_then(|p| p.get("type"))
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(4);
                let message = params
                    .as_ref()
                    .and_then(|p| p.get("message"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("")
                    .to_string();
                match kind {
                    1 => tracing::error!("server: {message}"),
                    2 => tracing::warn!("server: {message}"),
                    3 => tracing::info!("server: {message}"),
                    _ => tracing::debug!("server: {message}"),
                }
            }),
        );
    }
}

/// Handle to one running language-server session.
///
/// Built via [`ClientSession::builder`]; by the time `start` returns the
/// handshake has completed and feature calls are permitted.
pub struct ClientSession {
    pub(crate) core: Arc<SessionCore>,
    documents: Arc<DocumentStore>,
    capabilities: ServerCapabilities,
    workspace_root: PathBuf,
    language_id: String,
    transport: Option<Transport>,
    #[allow(dead_code)]
    reader_handle: tokio::task::JoinHandle<()>,
    #[allow(dead_code)]
    writer_handle: tokio::task::JoinHandle<()>,
    #[allow(dead_code)]
    handler_handle: tokio::task::JoinHandle<()>,
}

impl ClientSession {
    #[must_use]
    pub fn builder(config: LaunchConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    /// The capability snapshot captured from the `initialize` response.
    #[must_use]
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Send an arbitrary request once the session is active. Escape hatch
    /// for LSP methods without a typed facade.
    pub async fn request_raw(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
        deadline: Option<Duration>,
    ) -> Result<serde_json::Value> {
        self.core.ensure_active()?;
        self.core.request(method, params, deadline).await
    }

    /// Open a scope on a document, sending `didOpen` with the file's text
    /// if no other scope holds it. Relative paths resolve against the
    /// workspace root.
    pub async fn open_document(&self, path: &Path) -> Result<DocumentScope> {
        self.core.ensure_active()?;

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        };
        let uri = protocol::path_to_file_uri(&absolute)
            .map_err(|_| Error::InvalidPath {
                path: absolute.clone(),
            })?
            .to_string();

        // The gate stays held until the scope below exists, so no other
        // caller can see this entry (or dispatch traffic about it) before
        // didOpen is on the writer channel.
        let _gate = self.documents.open_gate().await;
        let acquired = self.documents.acquire(&uri);
        if acquired.newly_opened {
            let text = match tokio::fs::read_to_string(&absolute).await {
                Ok(text) => text,
                Err(e) => {
                    self.documents.release(&uri);
                    return Err(Error::DocumentRead {
                        path: absolute,
                        source: e,
                    });
                }
            };
            let params =
                protocol::did_open_params(&uri, &self.language_id, acquired.version, &text);
            if let Err(e) = self.core.notify("textDocument/didOpen", Some(params)) {
                self.documents.release(&uri);
                return Err(e);
            }
        }

        Ok(DocumentScope::new(
            self.documents.clone(),
            self.core.writer_tx.clone(),
            uri,
        ))
    }

    /// Orderly stop: best-effort shutdown negotiation, then transport
    /// teardown. Every outstanding request fails with `TransportClosed`.
    pub async fn stop(mut self) {
        self.core.set_state(SessionState::Stopping);

        if let Err(e) = self.core.request("shutdown", None, Some(SHUTDOWN_TIMEOUT)).await {
            // Shutdown failure is never fatal; fall through to the kill.
            tracing::debug!("shutdown request failed: {e}");
        }
        // exit is best-effort either way; the transport teardown below is
        // what actually reclaims the process.
        let _ = self.core.notify("exit", None);

        let _ = self.core.writer_tx.send(WriterCommand::Shutdown);
        self.core.fail_pending().await;
        self.core.set_state(SessionState::Stopped);

        if let Some(transport) = self.transport.take() {
            transport.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_core() -> (Arc<SessionCore>, mpsc::UnboundedReceiver<WriterCommand>) {
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let core = Arc::new(SessionCore::new(writer_tx));
        core.set_state(SessionState::Active);
        (core, writer_rx)
    }

    async fn recv_request_id(rx: &mut mpsc::UnboundedReceiver<WriterCommand>) -> u64 {
        match rx.recv().await {
            Some(WriterCommand::Send(frame)) => frame["id"].as_u64().expect("request id"),
            other => panic!("expected Send command, got {:?}", other.is_some()),
        }
    }

    #[tokio::test]
    async fn test_responses_resolve_out_of_order() {
        let (core, mut writer_rx) = test_core();

        let c1 = core.clone();
        let first = tokio::spawn(async move { c1.request("first/method", None, None).await });
        let id1 = recv_request_id(&mut writer_rx).await;

        let c2 = core.clone();
        let second = tokio::spawn(async move { c2.request("second/method", None, None).await });
        let id2 = recv_request_id(&mut writer_rx).await;
        assert_ne!(id1, id2);

        // Resolve in reverse arrival order.
        core.resolve_response(id2, Some(serde_json::json!("two")), None)
            .await;
        core.resolve_response(id1, Some(serde_json::json!("one")), None)
            .await;

        assert_eq!(second.await.unwrap().unwrap(), "two");
        assert_eq!(first.await.unwrap().unwrap(), "one");
        assert_eq!(core.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_error_response_routed_to_caller() {
        let (core, mut writer_rx) = test_core();

        let c = core.clone();
        let call = tokio::spawn(async move { c.request("textDocument/definition", None, None).await });
        let id = recv_request_id(&mut writer_rx).await;

        core.resolve_response(
            id,
            None,
            Some(serde_json::json!({"code": -32602, "message": "invalid params"})),
        )
        .await;

        match call.await.unwrap() {
            Err(Error::Remote { code, message, .. }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "invalid params");
            }
            other => panic!("expected Remote error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_response_for_unknown_id_discarded() {
        let (core, _writer_rx) = test_core();
        // Must not panic, must not grow the table.
        core.resolve_response(999, Some(serde_json::json!({})), None)
            .await;
        assert_eq!(core.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_fail_pending_fails_all_outstanding() {
        let (core, mut writer_rx) = test_core();

        let mut calls = Vec::new();
        for _ in 0..3 {
            let c = core.clone();
            calls.push(tokio::spawn(async move { c.request("m", None, None).await }));
            recv_request_id(&mut writer_rx).await;
        }
        assert_eq!(core.pending_len().await, 3);

        core.fail_pending().await;

        for call in calls {
            assert!(matches!(call.await.unwrap(), Err(Error::TransportClosed)));
        }
        assert_eq!(core.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_request_deadline_removes_pending_entry() {
        let (core, mut writer_rx) = test_core();

        let c = core.clone();
        let call = tokio::spawn(async move {
            c.request("slow/method", None, Some(Duration::from_millis(10)))
                .await
        });
        recv_request_id(&mut writer_rx).await;

        match call.await.unwrap() {
            Err(Error::Timeout { method }) => assert_eq!(method, "slow/method"),
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert_eq!(core.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_request_after_writer_closed_is_transport_closed() {
        let (core, writer_rx) = test_core();
        drop(writer_rx);

        let result = core.request("m", None, None).await;
        assert!(matches!(result, Err(Error::TransportClosed)));
        assert_eq!(core.pending_len().await, 0);

        assert!(matches!(core.notify("n", None), Err(Error::TransportClosed)));
    }

    #[tokio::test]
    async fn test_ensure_active_rejects_other_states() {
        let (core, _writer_rx) = test_core();
        for state in [
            SessionState::NotStarted,
            SessionState::Starting,
            SessionState::Initializing,
            SessionState::Initialized,
            SessionState::Stopping,
            SessionState::Stopped,
        ] {
            core.set_state(state);
            match core.ensure_active() {
                Err(Error::NotReady { state: reported }) => assert_eq!(reported, state),
                other => panic!("expected NotReady in {state:?}, got {other:?}"),
            }
        }
        core.set_state(SessionState::Active);
        assert!(core.ensure_active().is_ok());
    }

    #[tokio::test]
    async fn test_request_ids_are_monotonic() {
        let (core, mut writer_rx) = test_core();

        for expected in 1..=3u64 {
            let c = core.clone();
            tokio::spawn(async move {
                let _ = c.request("m", None, None).await;
            });
            assert_eq!(recv_request_id(&mut writer_rx).await, expected);
        }
    }
}
