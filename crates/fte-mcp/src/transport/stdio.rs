//! Stdio transport: one JSON request per input line, one JSON response per output line.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use fte_dispatch::{Dispatcher, MalformedPolicy, RequestFramer, Response};

use crate::types::{McpError, McpResult};

const READ_CHUNK_BYTES: usize = 8 * 1024;
const CHUNK_QUEUE_DEPTH: usize = 32;

/// Stdio transport for orchestrator-driven adapter processes.
pub struct StdioTransport {
    dispatcher: Dispatcher,
    policy: MalformedPolicy,
}

impl StdioTransport {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            policy: MalformedPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MalformedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Serve process stdin/stdout until stdin closes.
    pub async fn run(&self) -> McpResult<()> {
        self.run_with(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve `reader`/`writer` until `reader` reaches EOF.
    ///
    /// Requests are dispatched strictly in arrival order; each response is
    /// written and flushed before the next request is dispatched.
    pub async fn run_with<R, W>(&self, reader: R, mut writer: W) -> McpResult<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::channel(CHUNK_QUEUE_DEPTH);
        let reader_task = tokio::spawn(read_chunks(reader, tx));
        let mut framer = RequestFramer::new(self.policy);

        tracing::info!(policy = ?self.policy, "Stdio transport started");

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk.map_err(McpError::Io)?;
            for frame in framer.push(&chunk) {
                let response = self.dispatcher.dispatch_frame(frame).await;
                write_response(&mut writer, &response).await?;
            }
        }

        // The reader only exits on EOF or after reporting an error above.
        if let Err(e) = reader_task.await {
            tracing::warn!("Stdin reader task ended abnormally: {e}");
        }

        tracing::info!("EOF on input, draining");

        match framer.finish() {
            Ok(Some(request)) => {
                let response = self.dispatcher.dispatch(request).await;
                write_response(&mut writer, &response).await?;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(kind = e.kind(), "Invalid trailing input: {e}");
                writer.flush().await.map_err(McpError::Io)?;
                return Err(McpError::TrailingInput(e));
            }
        }

        writer.flush().await.map_err(McpError::Io)?;
        tracing::info!("Stdio transport finished");
        Ok(())
    }
}

/// Move raw input into the channel so reading continues while a handler awaits.
async fn read_chunks<R>(mut reader: R, tx: mpsc::Sender<std::io::Result<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(Ok(buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}

async fn write_response<W>(writer: &mut W, response: &Response) -> McpResult<()>
where
    W: AsyncWrite + Unpin,
{
    let line = response.to_line()?;
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(McpError::Io)?;
    writer.flush().await.map_err(McpError::Io)?;
    Ok(())
}
