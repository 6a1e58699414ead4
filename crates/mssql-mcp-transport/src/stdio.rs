//! STDIO transport: newline-delimited JSON over stdin/stdout.
//!
//! One message per line. Stdout belongs to the protocol, which is why the
//! server's tracing subscriber writes to stderr.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::trace;

use crate::{Result, Transport, TransportError};
use mssql_mcp_core::protocol::JsonRpcMessage;

/// Transport over a pair of byte streams; [`StdioTransport::new`] wires it to
/// the process stdio, tests wire it to in-memory duplex pipes.
pub struct StreamTransport<R, W> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
    line: String,
}

/// The production stdio transport.
pub type StdioTransport = StreamTransport<tokio::io::Stdin, tokio::io::Stdout>;

impl StdioTransport {
    pub fn new() -> Self {
        StreamTransport::from_streams(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn from_streams(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            line: String::new(),
        }
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send_message(&mut self, message: JsonRpcMessage) -> Result<()> {
        let json = serde_json::to_string(&message)?;
        trace!(bytes = json.len(), "sending message");

        self.writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.writer
            .write_all(b"\n")
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    async fn receive_message(&mut self) -> Result<JsonRpcMessage> {
        loop {
            self.line.clear();
            let bytes_read = self
                .reader
                .read_line(&mut self.line)
                .await
                .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

            if bytes_read == 0 {
                return Err(TransportError::ConnectionClosed);
            }

            let text = self.line.trim_end();
            if text.is_empty() {
                // blank keep-alive lines are tolerated
                continue;
            }

            trace!(bytes = text.len(), "received message");
            return Ok(serde_json::from_str(text)?);
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.writer
            .shutdown()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mssql_mcp_core::protocol::{JsonRpcRequest, RequestId};

    fn request_line(method: &str, id: i64) -> String {
        format!(r#"{{"jsonrpc":"2.0","method":"{method}","id":{id}}}"#) + "\n"
    }

    #[tokio::test]
    async fn reads_newline_delimited_messages() {
        let input = format!("{}{}", request_line("ping", 1), request_line("shutdown", 2));
        let mut transport =
            StreamTransport::from_streams(input.as_bytes(), tokio::io::sink());

        let first = transport.receive_message().await.unwrap();
        assert_eq!(first.request_id(), Some(&RequestId::number(1)));
        let second = transport.receive_message().await.unwrap();
        assert_eq!(second.request_id(), Some(&RequestId::number(2)));

        let err = transport.receive_message().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[tokio::test]
    async fn skips_blank_lines() {
        let input = format!("\n\n{}", request_line("ping", 3));
        let mut transport =
            StreamTransport::from_streams(input.as_bytes(), tokio::io::sink());
        let msg = transport.receive_message().await.unwrap();
        assert_eq!(msg.request_id(), Some(&RequestId::number(3)));
    }

    #[tokio::test]
    async fn writes_one_message_per_line() {
        use tokio::io::AsyncReadExt;

        let (writer, mut reader) = tokio::io::duplex(4096);
        let mut transport = StreamTransport::from_streams(&b""[..], writer);
        transport
            .send_message(JsonRpcMessage::Request(JsonRpcRequest::new(
                "ping",
                None,
                Some(RequestId::number(1)),
            )))
            .await
            .unwrap();
        transport.close().await.unwrap();
        drop(transport);

        let mut text = String::new();
        reader.read_to_string(&mut text).await.unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(text.lines().count(), 1);
    }

    #[tokio::test]
    async fn malformed_json_is_a_distinct_error() {
        let mut transport =
            StreamTransport::from_streams(&b"{not json}\n"[..], tokio::io::sink());
        let err = transport.receive_message().await.unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
    }
}
