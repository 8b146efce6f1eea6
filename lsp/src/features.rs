//! Typed feature calls built on the session's correlation table.
//!
//! Each call opens a document scope for its duration, so the server never
//! analyzes a file the caller believes is closed.
//!
//! Definition results degrade: a response shape that defeats
//! normalization yields an empty list, never an error. That swallowing is
//! deliberately narrow — transport and protocol failures
//! (`TransportClosed`, `Remote`) still propagate untouched.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::protocol;
use crate::session::ClientSession;
use crate::types::{DocumentSymbol, Location, Range, SemanticTokens};

/// The `LocationLink` shape some servers return instead of `Location`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationLink {
    target_uri: String,
    #[serde(default)]
    target_range: Option<Range>,
    #[serde(default)]
    target_selection_range: Option<Range>,
}

/// Normalize whatever the server returned for `textDocument/definition`
/// into a flat list of [`Location`]s.
///
/// Accepted shapes: `null`, a single `Location`, `Location[]`, and
/// `LocationLink[]`. Anything else — or any list entry that fits no
/// shape — is dropped silently.
fn normalize_definition(result: &serde_json::Value) -> Vec<Location> {
    fn one(item: &serde_json::Value) -> Option<Location> {
        if let Ok(loc) = serde_json::from_value::<Location>(item.clone()) {
            return Some(loc);
        }
        let link = serde_json::from_value::<LocationLink>(item.clone()).ok()?;
        let range = link.target_selection_range.or(link.target_range)?;
        Some(Location {
            uri: link.target_uri,
            range,
        })
    }

    match result {
        serde_json::Value::Array(items) => items.iter().filter_map(one).collect(),
        serde_json::Value::Object(_) => one(result).into_iter().collect(),
        _ => Vec::new(),
    }
}

impl ClientSession {
    /// Go-to-definition at a zero-based line/character position.
    ///
    /// Returns every definition site the server reports, normalized to
    /// [`Location`]s; a malformed result shape yields an empty list.
    pub async fn request_definition(
        &self,
        path: &Path,
        line: u32,
        character: u32,
    ) -> Result<Vec<Location>> {
        let scope = self.open_document(path).await?;
        let params = protocol::text_document_position_params(scope.uri(), line, character);
        let response = self
            .request_raw("textDocument/definition", Some(params), None)
            .await?;
        drop(scope);
        Ok(normalize_definition(&response))
    }

    /// Document outline for a file. Accepts both the hierarchical
    /// `DocumentSymbol[]` and flat `SymbolInformation[]` server shapes.
    pub async fn request_document_symbols(&self, path: &Path) -> Result<Vec<DocumentSymbol>> {
        let scope = self.open_document(path).await?;
        let params = serde_json::json!({
            "textDocument": { "uri": scope.uri() }
        });
        let response = self
            .request_raw("textDocument/documentSymbol", Some(params), None)
            .await?;
        drop(scope);

        if response.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(response).map_err(|e| Error::ResponseShape {
            method: "textDocument/documentSymbol",
            source: e,
        })
    }

    /// Full semantic token stream for a file. One request, one JSON
    /// document back — large, but not chunked.
    pub async fn request_semantic_tokens(&self, path: &Path) -> Result<SemanticTokens> {
        let scope = self.open_document(path).await?;
        let params = serde_json::json!({
            "textDocument": { "uri": scope.uri() }
        });
        let response = self
            .request_raw("textDocument/semanticTokens/full", Some(params), None)
            .await?;
        drop(scope);

        if response.is_null() {
            return Ok(SemanticTokens::default());
        }
        serde_json::from_value(response).map_err(|e| Error::ResponseShape {
            method: "textDocument/semanticTokens/full",
            source: e,
        })
    }
}
