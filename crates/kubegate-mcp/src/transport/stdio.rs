//! Stdio transport: reads framed JSON-RPC from stdin, writes to stdout.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::protocol::ProtocolHandler;
use crate::types::McpResult;

use super::framing::{FramedReader, FramedWriter};

/// Sequential read-dispatch-write loop over a byte stream pair.
pub struct StdioTransport {
    handler: ProtocolHandler,
    shutdown: CancellationToken,
}

impl StdioTransport {
    pub fn new(handler: ProtocolHandler) -> Self {
        Self::with_shutdown(handler, CancellationToken::new())
    }

    pub fn with_shutdown(handler: ProtocolHandler, shutdown: CancellationToken) -> Self {
        Self { handler, shutdown }
    }

    /// Cancelling this token stops the loop and is propagated to in-flight
    /// tool calls and the post-handshake hook.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn handler(&self) -> &ProtocolHandler {
        &self.handler
    }

    /// Run over the process's stdin and stdout.
    pub async fn run(&self) -> McpResult<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Run the loop until end of stream or shutdown. Only read errors on a
    /// malformed frame and write failures end it with an error.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> McpResult<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!("Stdio transport started");

        let mut reader = tokio::select! {
            _ = self.shutdown.cancelled() => {
                tracing::info!("Shutdown requested before first message");
                return Ok(());
            }
            detected = FramedReader::detect(reader) => detected?,
        };
        tracing::info!("Detected {} framing", reader.framing());
        let mut writer = FramedWriter::new(writer, reader.framing());

        loop {
            let message = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                read = reader.read_message() => read?,
            };

            let Some(message) = message else {
                tracing::info!("EOF on input, shutting down");
                break;
            };

            let Some(reply) = self.handler.handle_message(&message, &self.shutdown).await else {
                continue;
            };

            writer.write_json(&reply.message).await?;

            if reply.completes_handshake {
                self.handler.complete_handshake(&self.shutdown);
            }
        }

        Ok(())
    }
}
