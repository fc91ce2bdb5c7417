//! Message framing: LSP-style `Content-Length` headers or newline-delimited
//! JSON, detected once per connection from the first bytes of input.

use std::io::Cursor;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, Chain,
};

use crate::types::{McpError, McpResult};

/// Case-insensitive prefix that selects header framing.
pub const HEADER_PREFIX: &[u8] = b"content-length:";

/// Upper bound on a single message, in either framing.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `Content-Length: n\r\n\r\n<body>`
    Header,
    /// One JSON document per line.
    Line,
}

impl std::fmt::Display for Framing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Framing::Header => write!(f, "header"),
            Framing::Line => write!(f, "newline-delimited"),
        }
    }
}

/// Decide the framing from a stream prefix.
pub fn detect(prefix: &[u8]) -> Framing {
    if prefix.len() >= HEADER_PREFIX.len()
        && prefix[..HEADER_PREFIX.len()].eq_ignore_ascii_case(HEADER_PREFIX)
    {
        Framing::Header
    } else {
        Framing::Line
    }
}

/// Encode one outbound message under the given framing.
pub fn encode(framing: Framing, body: &[u8]) -> Vec<u8> {
    match framing {
        Framing::Header => {
            let mut out = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
            out.extend_from_slice(body);
            out
        }
        Framing::Line => {
            let mut out = Vec::with_capacity(body.len() + 1);
            out.extend_from_slice(body);
            out.push(b'\n');
            out
        }
    }
}

/// Parse the value of a header line if it is `Content-Length`.
fn content_length(line: &str) -> McpResult<Option<i64>> {
    let Some((name, value)) = line.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return Ok(None);
    }
    value
        .trim()
        .parse::<i64>()
        .map(Some)
        .map_err(|e| McpError::MalformedFrame(format!("invalid content-length {value:?}: {e}")))
}

/// Reads whole messages from a byte stream.
///
/// The bytes consumed during detection are replayed ahead of the stream, so
/// detection never loses input.
pub struct FramedReader<R> {
    inner: BufReader<Chain<Cursor<Vec<u8>>, R>>,
    framing: Framing,
    max_frame: usize,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    /// Sniff the framing from the first bytes, stopping at the first byte
    /// that rules out a header.
    pub async fn detect(mut reader: R) -> McpResult<Self> {
        let mut prefix = Vec::with_capacity(HEADER_PREFIX.len());
        let mut byte = [0u8; 1];

        while prefix.len() < HEADER_PREFIX.len() {
            if reader.read(&mut byte).await? == 0 {
                break;
            }
            prefix.push(byte[0]);
            let i = prefix.len() - 1;
            if !byte[0].eq_ignore_ascii_case(&HEADER_PREFIX[i]) {
                break;
            }
        }

        let framing = detect(&prefix);
        Ok(Self::with_framing(prefix, reader, framing))
    }

    fn with_framing(prefix: Vec<u8>, reader: R, framing: Framing) -> Self {
        Self {
            inner: BufReader::new(Cursor::new(prefix).chain(reader)),
            framing,
            max_frame: MAX_FRAME_BYTES,
        }
    }

    /// Lower the per-message size cap.
    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame;
        self
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Next message body, or `None` at end of stream.
    pub async fn read_message(&mut self) -> McpResult<Option<Vec<u8>>> {
        match self.framing {
            Framing::Header => self.read_header_framed().await,
            Framing::Line => self.read_line_framed().await,
        }
    }

    async fn read_header_framed(&mut self) -> McpResult<Option<Vec<u8>>> {
        let mut length: Option<i64> = None;
        let mut line = String::new();

        loop {
            line.clear();
            if self.inner.read_line(&mut line).await? == 0 {
                return Ok(None);
            }
            let header = line.trim_end_matches(['\r', '\n']);
            if header.is_empty() {
                break;
            }
            if let Some(n) = content_length(header)? {
                length = Some(n);
            }
        }

        let length = match length {
            Some(n) if n > 0 => n,
            _ => {
                tracing::debug!("Missing or non-positive content-length, treating as end of stream");
                return Ok(None);
            }
        };
        let max_frame = self.max_frame;
        let length = usize::try_from(length)
            .ok()
            .filter(|n| *n <= max_frame)
            .ok_or_else(|| {
                McpError::MalformedFrame(format!(
                    "content-length {length} exceeds {max_frame} bytes"
                ))
            })?;

        let mut body = vec![0u8; length];
        match self.inner.read_exact(&mut body).await {
            Ok(_) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::debug!("End of stream inside a message body");
                Ok(None)
            }
            Err(e) => Err(McpError::Io(e)),
        }
    }

    async fn read_line_framed(&mut self) -> McpResult<Option<Vec<u8>>> {
        let mut line = Vec::new();
        // Room for a full-size message plus its newline.
        let limit = self.max_frame as u64 + 1;
        loop {
            line.clear();
            let read = (&mut self.inner)
                .take(limit)
                .read_until(b'\n', &mut line)
                .await?;
            if read == 0 {
                return Ok(None);
            }
            if line.last() != Some(&b'\n') && line.len() > self.max_frame {
                return Err(McpError::MalformedFrame(format!(
                    "line exceeds {} bytes",
                    self.max_frame
                )));
            }
            let trimmed = line.trim_ascii();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_vec()));
            }
        }
    }
}

/// Writes whole messages under a fixed framing, flushing after each one.
pub struct FramedWriter<W> {
    inner: W,
    framing: Framing,
}

impl<W: AsyncWrite + Unpin> FramedWriter<W> {
    pub fn new(inner: W, framing: Framing) -> Self {
        Self { inner, framing }
    }

    pub async fn write_message(&mut self, body: &[u8]) -> McpResult<()> {
        self.inner.write_all(&encode(self.framing, body)).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn write_json(&mut self, value: &serde_json::Value) -> McpResult<()> {
        let body = serde_json::to_vec(value)?;
        self.write_message(&body).await
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
