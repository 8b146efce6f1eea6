//! Public types: launch configuration and the wire-adjacent result types
//! returned by the feature facade.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// How to launch the language server process.
///
/// The command is resolved through `PATH`; the workspace root becomes the
/// child's working directory and the session's `rootUri`.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Executable command (e.g. "node").
    pub command: String,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Root of the repository being analyzed.
    pub workspace_root: PathBuf,
    /// LSP language identifier sent with `didOpen` (e.g. "python").
    pub language_id: String,
}

impl LaunchConfig {
    /// Launch pyright's language server entry point under node with
    /// `--stdio` framing.
    #[must_use]
    pub fn pyright(workspace_root: impl Into<PathBuf>, langserver_js: &Path) -> Self {
        Self {
            command: String::from("node"),
            args: vec![
                langserver_js.to_string_lossy().into_owned(),
                String::from("--stdio"),
            ],
            workspace_root: workspace_root.into(),
            language_id: String::from("python"),
        }
    }
}

/// Zero-based line/character position, as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// One definition site, normalized from whichever shape the server chose
/// (`Location`, `Location[]`, or `LocationLink[]`).
#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub uri: String,
    pub range: Range,
}

impl Location {
    /// Filesystem path for `file://` uris, `None` otherwise.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        crate::protocol::file_uri_to_path(&self.uri)
    }

    /// Format as `path:line:col` with 1-based line/column for display.
    #[must_use]
    pub fn display_position(&self) -> String {
        let path = self
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| self.uri.clone());
        format!(
            "{}:{}:{}",
            path,
            self.range.start.line + 1,
            self.range.start.character + 1,
        )
    }
}

/// One symbol from `textDocument/documentSymbol`.
///
/// Servers return either hierarchical `DocumentSymbol[]` or flat
/// `SymbolInformation[]`; both decode into this shape (the flat form has
/// no children and carries its range under `location`).
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentSymbol {
    pub name: String,
    pub kind: u32,
    #[serde(default)]
    pub range: Option<Range>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub children: Vec<DocumentSymbol>,
}

impl DocumentSymbol {
    /// The symbol's full range, whichever form it arrived in.
    #[must_use]
    pub fn full_range(&self) -> Option<Range> {
        self.range.or_else(|| self.location.as_ref().map(|l| l.range))
    }
}

/// Result of `textDocument/semanticTokens/full`: the encoded token stream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SemanticTokens {
    #[serde(default, rename = "resultId")]
    pub result_id: Option<String>,
    #[serde(default)]
    pub data: Vec<u32>,
}

/// Immutable snapshot of the server's declared capabilities, captured once
/// from the `initialize` response.
///
/// Kept as raw JSON — this core consults it for coarse feature checks only
/// and never rewrites it.
#[derive(Debug, Clone, Default)]
pub struct ServerCapabilities {
    raw: serde_json::Value,
}

impl ServerCapabilities {
    pub(crate) fn new(raw: serde_json::Value) -> Self {
        Self { raw }
    }

    /// The raw `capabilities` object from the `initialize` response.
    #[must_use]
    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }

    fn provider(&self, key: &str) -> bool {
        match self.raw.get(key) {
            None => false,
            Some(serde_json::Value::Bool(b)) => *b,
            // Providers are commonly objects carrying options.
            Some(_) => true,
        }
    }

    #[must_use]
    pub fn supports_definition(&self) -> bool {
        self.provider("definitionProvider")
    }

    #[must_use]
    pub fn supports_document_symbols(&self) -> bool {
        self.provider("documentSymbolProvider")
    }

    #[must_use]
    pub fn supports_semantic_tokens(&self) -> bool {
        self.provider("semanticTokensProvider")
    }
}
