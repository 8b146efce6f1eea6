//! Error taxonomy for the client core.
//!
//! Session-ending failures ([`Error::is_session_fatal`]) are separated from
//! per-call failures so callers can decide between restarting the whole
//! session and retrying a single request.

use crate::codec::FrameError;
use crate::session::SessionState;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server executable could not be found or spawned.
    #[error("failed to launch language server: {0}")]
    ProcessLaunch(String),

    /// Malformed wire data. Terminates the read loop and the session.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The peer answered a request with a JSON-RPC error object.
    /// Delivered only to the caller whose request it answers.
    #[error("server error {code}: {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The channel to the server process closed. Fails every outstanding
    /// and future call.
    #[error("transport closed")]
    TransportClosed,

    /// A feature call was issued before the handshake completed (or after
    /// the session stopped).
    #[error("session not ready: state is {state:?}")]
    NotReady { state: SessionState },

    /// A caller-supplied deadline expired. The pending entry is removed;
    /// other outstanding requests are unaffected.
    #[error("request '{method}' timed out")]
    Timeout { method: &'static str },

    /// A path could not be expressed as a `file://` uri.
    #[error("cannot convert path to file URI: {}", path.display())]
    InvalidPath { path: std::path::PathBuf },

    /// A document could not be read from disk when opening its scope.
    #[error("cannot read document {}", path.display())]
    DocumentRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A feature response failed typed deserialization where degradation
    /// is not mandated (document symbols, semantic tokens).
    #[error("unexpected response shape for '{method}'")]
    ResponseShape {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Whether this error ends the session (restart required) as opposed
    /// to failing just the call that triggered it.
    #[must_use]
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Self::ProcessLaunch(_) | Self::Frame(_) | Self::TransportClosed
        )
    }

    /// Build a [`Error::Remote`] from a JSON-RPC `error` object.
    pub(crate) fn from_remote(error: &serde_json::Value) -> Self {
        Self::Remote {
            code: error.get("code").and_then(serde_json::Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
            data: error.get("data").cloned(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_from_json() {
        let obj = serde_json::json!({
            "code": -32601,
            "message": "Method not found: foo/bar",
            "data": { "method": "foo/bar" }
        });
        match Error::from_remote(&obj) {
            Error::Remote {
                code,
                message,
                data,
            } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found: foo/bar");
                assert_eq!(data.unwrap()["method"], "foo/bar");
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[test]
    fn test_remote_error_tolerates_missing_fields() {
        match Error::from_remote(&serde_json::json!({})) {
            Error::Remote { code, message, data } => {
                assert_eq!(code, 0);
                assert_eq!(message, "unknown error");
                assert!(data.is_none());
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[test]
    fn test_session_fatal_split() {
        assert!(Error::TransportClosed.is_session_fatal());
        assert!(Error::ProcessLaunch("node not found".into()).is_session_fatal());
        assert!(!Error::Timeout { method: "shutdown" }.is_session_fatal());
        assert!(
            !Error::Remote {
                code: -32600,
                message: "invalid request".into(),
                data: None,
            }
            .is_session_fatal()
        );
        assert!(
            !Error::NotReady {
                state: SessionState::Initializing,
            }
            .is_session_fatal()
        );
    }
}
