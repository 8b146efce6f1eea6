//! Demo driver for the pyrite-lsp client core.
//!
//! Spawns pyright against a workspace, runs the handshake, then asks for
//! the definition at a position, the document outline, and the semantic
//! token stream of one file:
//!
//! ```text
//! pyrite <workspace-root> <langserver.index.js> <file> [line col]
//! ```
//!
//! Positions are zero-based, matching the protocol; output locations are
//! printed 1-based.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use pyrite_lsp::{ClientSession, LaunchConfig, Settings};

const USAGE: &str = "usage: pyrite <workspace-root> <langserver.index.js> <file> [line col]";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();
}

struct Args {
    workspace_root: PathBuf,
    langserver_js: PathBuf,
    file: PathBuf,
    line: u32,
    character: u32,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let workspace_root = PathBuf::from(args.next().context(USAGE)?);
    let langserver_js = PathBuf::from(args.next().context(USAGE)?);
    let file = PathBuf::from(args.next().context(USAGE)?);
    let line = match args.next() {
        Some(raw) => raw.parse().context("line must be a number")?,
        None => 14,
    };
    let character = match args.next() {
        Some(raw) => raw.parse().context("column must be a number")?,
        None => 14,
    };
    Ok(Args {
        workspace_root,
        langserver_js,
        file,
        line,
        character,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = parse_args()?;

    let workspace_root = std::fs::canonicalize(&args.workspace_root)
        .with_context(|| format!("workspace root {}", args.workspace_root.display()))?;

    let config = LaunchConfig::pyright(workspace_root, &args.langserver_js);
    let session = ClientSession::builder(config)
        .settings(Settings::default())
        .start()
        .await
        .context("starting pyright session")?;

    tracing::info!(
        definition = session.capabilities().supports_definition(),
        symbols = session.capabilities().supports_document_symbols(),
        tokens = session.capabilities().supports_semantic_tokens(),
        "session active"
    );

    let locations = session
        .request_definition(&args.file, args.line, args.character)
        .await?;
    if locations.is_empty() {
        tracing::info!("no definitions found");
    } else {
        for location in &locations {
            tracing::info!("definition: {}", location.display_position());
        }
    }

    let symbols = session.request_document_symbols(&args.file).await?;
    tracing::info!(count = symbols.len(), "document symbols");
    for symbol in &symbols {
        tracing::info!("  {} (kind {})", symbol.name, symbol.kind);
    }

    let tokens = session.request_semantic_tokens(&args.file).await?;
    tracing::info!(values = tokens.data.len(), "semantic token data received");

    session.stop().await;
    Ok(())
}
