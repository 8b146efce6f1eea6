//! LSP client core for driving a pyright language server over stdio.
//!
//! [`ClientSession`] supervises the server process, frames JSON-RPC 2.0
//! messages with `Content-Length` headers, runs the
//! `initialize`/`initialized`/configuration handshake, answers the
//! server's own requests through a pluggable handler registry, tracks
//! open documents by reference count, and exposes typed feature calls
//! (definition, document symbols, semantic tokens).

pub mod codec;
pub mod settings;
pub mod types;

pub(crate) mod protocol;
pub(crate) mod transport;

mod documents;
mod error;
mod features;
mod handlers;
mod session;

pub use documents::DocumentScope;
pub use error::{Error, Result};
pub use handlers::{
    NotificationHandler, RequestHandler, notification_handler, request_handler,
};
pub use session::{ClientSession, SessionBuilder, SessionState};
pub use settings::Settings;
pub use types::{
    DocumentSymbol, LaunchConfig, Location, Position, Range, SemanticTokens, ServerCapabilities,
};
