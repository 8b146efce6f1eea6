//! JSON-RPC envelope types and LSP payload builders.

use std::path::{Path, PathBuf};

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub(crate) struct PathToUriError {
    path: PathBuf,
}

/// Outbound request envelope. Ids allocated by the session are unique
/// among outstanding requests.
#[derive(Debug, Serialize)]
pub(crate) struct Request {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(id: u64, method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }

    /// The frame as JSON, with `params` omitted (not null) when absent.
    pub fn into_frame(self) -> serde_json::Value {
        let mut frame = serde_json::json!({
            "jsonrpc": self.jsonrpc,
            "id": self.id,
            "method": self.method,
        });
        if let Some(params) = self.params {
            frame["params"] = params;
        }
        frame
    }
}

/// Outbound notification envelope. No id, no reply expected.
#[derive(Debug, Serialize)]
pub(crate) struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Notification {
    pub fn new(method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }

    /// The frame as JSON, with `params` omitted (not null) when absent.
    pub fn into_frame(self) -> serde_json::Value {
        let mut frame = serde_json::json!({
            "jsonrpc": self.jsonrpc,
            "method": self.method,
        });
        if let Some(params) = self.params {
            frame["params"] = params;
        }
        frame
    }
}

/// One decoded inbound frame, classified.
///
/// The server's request ids are opaque to us — they are echoed verbatim
/// when we answer, so they stay `serde_json::Value`.
#[derive(Debug)]
pub(crate) enum Incoming {
    Response {
        id: u64,
        result: Option<serde_json::Value>,
        error: Option<serde_json::Value>,
    },
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

/// Classify an inbound frame as response, server request, or notification.
///
/// Returns `None` for frames that fit no JSON-RPC shape; the read loop
/// logs and skips those rather than killing the session.
pub(crate) fn classify(frame: &serde_json::Value) -> Option<Incoming> {
    let id = frame.get("id");
    let method = frame
        .get("method")
        .and_then(|m| m.as_str())
        .map(String::from);
    let has_result_or_error = frame.get("result").is_some() || frame.get("error").is_some();

    match (id, method, has_result_or_error) {
        (Some(id_val), None, true) => Some(Incoming::Response {
            id: id_val.as_u64()?,
            result: frame.get("result").cloned(),
            error: frame.get("error").cloned(),
        }),
        (Some(id_val), Some(method), _) => Some(Incoming::Request {
            id: id_val.clone(),
            method,
            params: frame.get("params").cloned(),
        }),
        (None, Some(method), _) => Some(Incoming::Notification {
            method,
            params: frame.get("params").cloned(),
        }),
        _ => None,
    }
}

/// Build a response frame answering a server request, echoing its id.
pub(crate) fn response_frame(id: &serde_json::Value, result: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

/// Build an error response frame answering a server request.
pub(crate) fn error_frame(id: &serde_json::Value, code: i64, message: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": code,
            "message": message,
        }
    })
}

/// Static client capability declaration sent with `initialize`.
///
/// Declares the features this core actually drives: document sync,
/// definition, document symbols (hierarchical), semantic tokens, plus
/// completion/hover so pyright enables its language services.
fn client_capabilities() -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "synchronization": {
                "dynamicRegistration": true,
                "willSave": false,
                "willSaveWaitUntil": false,
                "didSave": false
            },
            "publishDiagnostics": {
                "relatedInformation": true,
                "versionSupport": false
            },
            "completion": {
                "dynamicRegistration": true,
                "completionItem": {
                    "snippetSupport": false
                }
            },
            "hover": {
                "dynamicRegistration": true,
                "contentFormat": ["markdown", "plaintext"]
            },
            "definition": {
                "dynamicRegistration": true,
                "linkSupport": true
            },
            "documentSymbol": {
                "dynamicRegistration": true,
                "hierarchicalDocumentSymbolSupport": true
            },
            "semanticTokens": {
                "dynamicRegistration": true,
                "requests": { "full": true },
                "tokenTypes": [],
                "tokenModifiers": [],
                "formats": ["relative"]
            }
        },
        "workspace": {
            "didChangeConfiguration": { "dynamicRegistration": true },
            "workspaceFolders": true,
            "configuration": true
        }
    })
}

/// Build `initialize` params: the static capability document augmented
/// with process metadata and workspace descriptors.
pub(crate) fn initialize_params(workspace_root: &Path, root_uri: &url::Url) -> serde_json::Value {
    let folder_name = workspace_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("workspace"));

    serde_json::json!({
        "processId": std::process::id(),
        "rootPath": workspace_root.to_string_lossy(),
        "rootUri": root_uri.as_str(),
        "capabilities": client_capabilities(),
        "workspaceFolders": [{
            "uri": root_uri.as_str(),
            "name": folder_name,
        }]
    })
}

pub(crate) fn did_open_params(
    uri: &str,
    language_id: &str,
    version: i32,
    text: &str,
) -> serde_json::Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "languageId": language_id,
            "version": version,
            "text": text
        }
    })
}

pub(crate) fn did_close_params(uri: &str) -> serde_json::Value {
    serde_json::json!({
        "textDocument": { "uri": uri }
    })
}

pub(crate) fn text_document_position_params(uri: &str, line: u32, character: u32) -> serde_json::Value {
    serde_json::json!({
        "textDocument": { "uri": uri },
        "position": { "line": line, "character": character }
    })
}

pub(crate) fn path_to_file_uri(path: &Path) -> Result<url::Url, PathToUriError> {
    url::Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}

pub(crate) fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri)
        .ok()
        .and_then(|u| u.to_file_path().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_params_has_required_fields() {
        let root = if cfg!(windows) {
            PathBuf::from(r"C:\repo")
        } else {
            PathBuf::from("/repo")
        };
        let uri = path_to_file_uri(&root).unwrap();
        let params = initialize_params(&root, &uri);
        assert!(params["processId"].is_number());
        assert_eq!(params["rootUri"], uri.as_str());
        assert_eq!(params["workspaceFolders"][0]["name"], "repo");
        assert!(params["capabilities"]["textDocument"]["definition"]["linkSupport"].as_bool().unwrap());
        assert!(
            params["capabilities"]["textDocument"]["documentSymbol"]
                ["hierarchicalDocumentSymbolSupport"]
                .as_bool()
                .unwrap()
        );
        assert!(params["capabilities"]["workspace"]["configuration"].as_bool().unwrap());
    }

    #[test]
    fn test_classify_response() {
        let frame = serde_json::json!({"jsonrpc": "2.0", "id": 3, "result": {}});
        match classify(&frame) {
            Some(Incoming::Response { id, result, error }) => {
                assert_eq!(id, 3);
                assert!(result.is_some());
                assert!(error.is_none());
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_error_response() {
        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 4,
            "error": {"code": -32600, "message": "invalid"}
        });
        match classify(&frame) {
            Some(Incoming::Response { id, result, error }) => {
                assert_eq!(id, 4);
                assert!(result.is_none());
                assert_eq!(error.unwrap()["code"], -32600);
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_server_request_keeps_id_opaque() {
        // Server request ids can be strings; they must be echoed verbatim.
        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "id": "cfg-1",
            "method": "workspace/configuration",
            "params": {"items": []}
        });
        match classify(&frame) {
            Some(Incoming::Request { id, method, params }) => {
                assert_eq!(id, serde_json::json!("cfg-1"));
                assert_eq!(method, "workspace/configuration");
                assert!(params.is_some());
            }
            other => panic!("expected Request, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_notification() {
        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "method": "window/logMessage",
            "params": {"type": 3, "message": "hi"}
        });
        match classify(&frame) {
            Some(Incoming::Notification { method, .. }) => {
                assert_eq!(method, "window/logMessage");
            }
            other => panic!("expected Notification, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_rejects_shapeless_frame() {
        assert!(classify(&serde_json::json!({"jsonrpc": "2.0"})).is_none());
        assert!(classify(&serde_json::json!({"id": 1})).is_none());
    }

    #[test]
    fn test_response_frame_echoes_id() {
        let id = serde_json::json!("srv-7");
        let frame = response_frame(&id, serde_json::Value::Null);
        assert_eq!(frame["id"], "srv-7");
        assert!(frame["result"].is_null());
        assert!(frame.get("error").is_none());
    }

    #[test]
    fn test_error_frame_shape() {
        let id = serde_json::json!(9);
        let frame = error_frame(&id, -32601, "Method not found: x/y");
        assert_eq!(frame["id"], 9);
        assert_eq!(frame["error"]["code"], -32601);
        assert_eq!(frame["error"]["message"], "Method not found: x/y");
    }

    #[test]
    fn test_request_serialization_without_params() {
        let req = Request::new(1, "shutdown", None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 1);
        assert_eq!(json["method"], "shutdown");
        assert!(
            json.get("params").is_none(),
            "params must be omitted, not null"
        );
    }

    #[test]
    fn test_notification_serialization() {
        let notif = Notification::new("initialized", Some(serde_json::json!({})));
        let json = serde_json::to_value(&notif).unwrap();
        assert_eq!(json["method"], "initialized");
        assert!(json.get("id").is_none());
        assert!(json.get("params").is_some());

        let bare = Notification::new("exit", None);
        let json = serde_json::to_value(&bare).unwrap();
        assert!(json.get("params").is_none());
    }

    #[test]
    fn test_into_frame_matches_serialization() {
        let params = serde_json::json!({"rootUri": "file:///repo"});
        let frame = Request::new(7, "initialize", Some(params.clone())).into_frame();
        let via_serde =
            serde_json::to_value(Request::new(7, "initialize", Some(params))).unwrap();
        assert_eq!(frame, via_serde);

        let frame = Notification::new("exit", None).into_frame();
        let via_serde = serde_json::to_value(Notification::new("exit", None)).unwrap();
        assert_eq!(frame, via_serde);
    }

    #[test]
    fn test_text_document_position_params_zero_based() {
        let params = text_document_position_params("file:///t.py", 14, 14);
        assert_eq!(params["position"]["line"], 14);
        assert_eq!(params["position"]["character"], 14);
        assert_eq!(params["textDocument"]["uri"], "file:///t.py");
    }

    #[test]
    fn test_path_to_file_uri_and_back() {
        #[cfg(windows)]
        let path = PathBuf::from(r"C:\Users\test\src\demo1.py");
        #[cfg(not(windows))]
        let path = PathBuf::from("/home/test/src/demo1.py");

        let uri = path_to_file_uri(&path).expect("should create URI");
        let roundtrip = file_uri_to_path(uri.as_str()).expect("should parse back to path");
        assert_eq!(roundtrip, path);
    }

    #[test]
    fn test_file_uri_to_path_invalid() {
        assert!(file_uri_to_path("not-a-uri").is_none());
        assert!(file_uri_to_path("https://example.com/x.py").is_none());
    }
}
