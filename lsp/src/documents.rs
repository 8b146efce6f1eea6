//! Reference-counted open-document tracking.
//!
//! A document stays open on the server while any [`DocumentScope`] for it
//! is alive. The first scope for a path sends `textDocument/didOpen` with
//! the file's full text; dropping the last scope sends
//! `textDocument/didClose` and removes tracking. Nested scopes only move
//! the count, so a concurrent caller can never close a document out from
//! under another.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::protocol::{self, Notification};
use crate::session::WriterCommand;

struct DocEntry {
    version: i32,
    open_count: usize,
}

/// Uri-keyed open-document table. Mutated under a sync mutex only — no
/// await happens while it is held, which is what lets scope release run
/// from `Drop`.
///
/// `open_gate` serializes open attempts: an entry is published only once
/// its `didOpen` has been enqueued, so a second opener can never obtain a
/// scope (and race a feature request past the writer channel) while the
/// first is still reading the file.
#[derive(Default)]
pub(crate) struct DocumentStore {
    map: Mutex<HashMap<String, DocEntry>>,
    open_gate: tokio::sync::Mutex<()>,
}

/// Outcome of acquiring a scope.
pub(crate) struct Acquired {
    /// First scope for this uri: `didOpen` must be sent.
    pub newly_opened: bool,
    pub version: i32,
}

impl DocumentStore {
    /// Hold this across acquire-read-didOpen. A failed opener releases its
    /// entry before the gate reopens, so the next holder becomes the
    /// opener and reads the file itself.
    pub async fn open_gate(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.open_gate.lock().await
    }

    /// Take one scope on `uri`, creating the entry on the 0→1 transition.
    pub fn acquire(&self, uri: &str) -> Acquired {
        let mut map = self.map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match map.get_mut(uri) {
            Some(entry) => {
                entry.open_count += 1;
                Acquired {
                    newly_opened: false,
                    version: entry.version,
                }
            }
            None => {
                map.insert(
                    uri.to_string(),
                    DocEntry {
                        version: 1,
                        open_count: 1,
                    },
                );
                Acquired {
                    newly_opened: true,
                    version: 1,
                }
            }
        }
    }

    /// Release one scope on `uri`. Returns `true` when this was the last
    /// outstanding scope and `didClose` must be sent.
    pub fn release(&self, uri: &str) -> bool {
        let mut map = self.map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(entry) = map.get_mut(uri) else {
            return false;
        };
        entry.open_count -= 1;
        if entry.open_count == 0 {
            map.remove(uri);
            true
        } else {
            false
        }
    }

    pub fn is_open(&self, uri: &str) -> bool {
        self.map
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(uri)
    }
}

/// Guard for one open-document scope.
///
/// Obtained from `ClientSession::open_document`. Dropping it releases the
/// scope; when the last scope for a uri goes, the close notification is
/// enqueued on the session's writer channel.
pub struct DocumentScope {
    store: Arc<DocumentStore>,
    writer_tx: mpsc::UnboundedSender<WriterCommand>,
    uri: String,
}

impl DocumentScope {
    pub(crate) fn new(
        store: Arc<DocumentStore>,
        writer_tx: mpsc::UnboundedSender<WriterCommand>,
        uri: String,
    ) -> Self {
        Self {
            store,
            writer_tx,
            uri,
        }
    }

    /// The document's file uri.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl Drop for DocumentScope {
    fn drop(&mut self) {
        if self.store.release(&self.uri) {
            let frame = Notification::new(
                "textDocument/didClose",
                Some(protocol::did_close_params(&self.uri)),
            )
            .into_frame();
            // Writer gone means the session is already stopping; the close
            // is moot then.
            let _ = self.writer_tx.send(WriterCommand::Send(frame));
        }
    }
}
