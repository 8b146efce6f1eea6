//! JSON-RPC framing codec.
//!
//! LSP frames messages as `Content-Length: N\r\n\r\n{json}` over the server
//! process's stdin/stdout. [`FrameReader`] and [`FrameWriter`] handle the
//! async reading and writing of those frames; the session's writer task is
//! the only owner of a [`FrameWriter`], which is what keeps concurrent
//! outbound messages from interleaving.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum frame size (4 MiB) to prevent unbounded memory allocation.
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Malformed wire data. Any of these ends the read loop.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("missing Content-Length header")]
    MissingContentLength,

    #[error("invalid Content-Length value: {0:?}")]
    InvalidContentLength(String),

    #[error("Content-Length {0} exceeds maximum {MAX_FRAME_BYTES}")]
    Oversized(usize),

    #[error("unexpected end of stream mid-frame")]
    UnexpectedEof,

    #[error("frame body is not valid JSON")]
    Body(#[source] serde_json::Error),

    #[error("frame I/O failed")]
    Io(#[from] std::io::Error),
}

/// Reads JSON-RPC frames from an async reader.
///
/// Parses `Content-Length` headers and reads exactly that many bytes,
/// then deserializes the body as JSON.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next JSON-RPC frame.
    ///
    /// Returns `Ok(None)` on EOF at a frame boundary (clean shutdown).
    pub async fn read_frame(&mut self) -> Result<Option<serde_json::Value>, FrameError> {
        let content_length = match self.read_headers().await? {
            Some(len) => len,
            None => return Ok(None), // EOF
        };

        if content_length > MAX_FRAME_BYTES {
            return Err(FrameError::Oversized(content_length));
        }

        let mut body = vec![0u8; content_length];
        self.reader
            .read_exact(&mut body)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => FrameError::UnexpectedEof,
                _ => FrameError::Io(e),
            })?;

        let value = serde_json::from_slice(&body).map_err(FrameError::Body)?;
        Ok(Some(value))
    }

    /// Parse headers until the empty line separator.
    ///
    /// Returns the `Content-Length` value, or `None` on EOF.
    async fn read_headers(&mut self) -> Result<Option<usize>, FrameError> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        let mut saw_any_header_bytes = false;

        loop {
            line.clear();
            let bytes_read = self.reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                // EOF is a clean shutdown only at a frame boundary; EOF after
                // a partial header block is a truncated frame.
                if !saw_any_header_bytes {
                    return Ok(None);
                }
                return Err(FrameError::UnexpectedEof);
            }
            saw_any_header_bytes = true;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                // Empty line = end of headers
                break;
            }

            // The spec spells it "Content-Length"; parse case-insensitively
            // for robustness.
            if let Some(colon_pos) = trimmed.find(':') {
                let key = &trimmed[..colon_pos];
                if key.eq_ignore_ascii_case("Content-Length") {
                    let raw = trimmed[colon_pos + 1..].trim();
                    let len: usize = raw
                        .parse()
                        .map_err(|_| FrameError::InvalidContentLength(raw.to_string()))?;
                    content_length = Some(len);
                }
            }
            // Ignore other headers (e.g. Content-Type)
        }

        match content_length {
            Some(len) => Ok(Some(len)),
            None => Err(FrameError::MissingContentLength),
        }
    }
}

/// Writes JSON-RPC frames to an async writer.
///
/// Serializes JSON and prepends the `Content-Length` header; the header
/// and body are flushed together so one frame is fully written before the
/// next begins.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write a JSON-RPC frame with `Content-Length` header.
    pub async fn write_frame(&mut self, msg: &serde_json::Value) -> Result<(), FrameError> {
        let body = serde_json::to_string(msg).map_err(FrameError::Body)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());

        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(body.as_bytes()).await?;
        self.writer.flush().await?;

        Ok(())
    }
}
