//! Transport layer for MCP JSON-RPC communication.
//!
//! MCP uses newline-delimited JSON over stdin/stdout. Each outgoing message
//! must occupy exactly one line.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{
    self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};

use crate::protocol::{JsonRpcNotification, JsonRpcResponse, RequestId};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An outgoing message would span more than one line.
    #[error("Outgoing message contains an embedded newline")]
    EmbeddedNewline,

    /// An incoming line is not UTF-8. The line is consumed; reading can go on.
    #[error("Line is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

impl TransportError {
    /// Whether the stream is still usable after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidUtf8(_))
    }
}

/// Line-delimited reader/writer pair.
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
}

impl LineTransport<BufReader<Stdin>, Stdout> {
    /// Create a transport using stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }

    /// Next non-blank line, without its terminator. `None` on EOF.
    pub async fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if self.reader.read_until(b'\n', &mut buf).await? == 0 {
                return Ok(None);
            }
            let line = String::from_utf8(std::mem::take(&mut buf))?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                tracing::debug!(message = trimmed, "Received");
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    pub async fn write_response(&mut self, response: &JsonRpcResponse) -> Result<(), TransportError> {
        self.write_json(response).await
    }

    pub async fn write_notification(
        &mut self,
        notification: &JsonRpcNotification,
    ) -> Result<(), TransportError> {
        self.write_json(notification).await
    }

    async fn write_json<T: Serialize>(&mut self, message: &T) -> Result<(), TransportError> {
        let json = serde_json::to_string(message)?;
        if json.contains('\n') || json.contains('\r') {
            return Err(TransportError::EmbeddedNewline);
        }

        tracing::debug!(message = %json, "Sending");

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Best-effort recovery of the `id` of a message that failed to parse.
///
/// Tries a full JSON parse first, then scans the raw text for an `"id"`
/// member. Falls back to `null`.
pub fn recover_id(raw: &str) -> RequestId {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return match value.get("id") {
            Some(Value::String(s)) => RequestId::String(s.clone()),
            Some(Value::Number(n)) => n.as_i64().map_or(RequestId::Null, RequestId::Number),
            _ => RequestId::Null,
        };
    }

    let Some(pos) = raw.find("\"id\"") else {
        return RequestId::Null;
    };
    let rest = raw[pos + 4..].trim_start();
    let Some(rest) = rest.strip_prefix(':') else {
        return RequestId::Null;
    };
    let rest = rest.trim_start();

    if let Some(quoted) = rest.strip_prefix('"') {
        return match quoted.find('"') {
            Some(end) => RequestId::String(quoted[..end].to_string()),
            None => RequestId::Null,
        };
    }

    let number: String = rest
        .chars()
        .enumerate()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && *c == '-'))
        .map(|(_, c)| c)
        .collect();
    number.parse().map_or(RequestId::Null, RequestId::Number)
}
