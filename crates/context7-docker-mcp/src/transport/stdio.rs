//! Stdio transport: spawns the server, writes JSON-RPC to its stdin, reads
//! answers from its stdout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;

use context7_docker::{SpawnCommand, WrapperError};

use crate::types::{JsonRpcMessage, McpError, McpResult, Outgoing};

use super::framing;

/// How long a server may linger after its stdin closes.
pub const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Answers collected from one session with the server.
#[derive(Debug, Clone, Default)]
pub struct Exchange {
    /// One answer per request, in request order.
    pub responses: Vec<JsonRpcMessage>,
    /// Lines read that did not answer an outstanding request.
    pub skipped: usize,
    /// Exit code once stdin was closed; `None` if killed or still running.
    pub exit_code: Option<i32>,
}

/// A way to run one short session against the server.
#[async_trait]
pub trait McpChannel: Send + Sync {
    async fn exchange(
        &self,
        spawn: &SpawnCommand,
        messages: &[Outgoing],
        timeout: Duration,
    ) -> McpResult<Exchange>;
}

/// Write `messages` one per line and collect the answer to each request.
///
/// Blank lines, notifications from the server, and answers to other ids are
/// counted in `skipped`. End of input before an answer arrives is
/// [`McpError::Closed`].
pub async fn exchange_over<R, W>(
    reader: &mut R,
    writer: &mut W,
    messages: &[Outgoing],
) -> McpResult<Exchange>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut exchange = Exchange::default();
    let mut line = String::new();

    for message in messages {
        let framed = framing::frame_message(message)?;
        writer.write_all(framed.as_bytes()).await?;
        writer.flush().await?;

        let Some(id) = message.expects_response() else {
            continue;
        };

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Err(McpError::Closed);
            }
            if line.trim().is_empty() {
                exchange.skipped += 1;
                continue;
            }

            let parsed = framing::parse_message(&line)?;
            if parsed.answers(id) {
                exchange.responses.push(parsed);
                break;
            }

            tracing::debug!("Skipping unrelated message: {}", line.trim());
            exchange.skipped += 1;
        }
    }

    Ok(exchange)
}

/// Channel that launches the spawn command as a child process per session.
#[derive(Debug, Clone, Copy)]
pub struct StdioChannel {
    exit_grace: Duration,
}

impl StdioChannel {
    pub fn new() -> Self {
        Self {
            exit_grace: EXIT_GRACE,
        }
    }

    /// Wait at most `grace` for the server to exit once stdin closes.
    pub fn with_exit_grace(mut self, grace: Duration) -> Self {
        self.exit_grace = grace;
        self
    }
}

impl Default for StdioChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl McpChannel for StdioChannel {
    async fn exchange(
        &self,
        spawn: &SpawnCommand,
        messages: &[Outgoing],
        timeout: Duration,
    ) -> McpResult<Exchange> {
        tracing::debug!("spawn: {spawn}");

        let mut child = Command::new(&spawn.program)
            .args(&spawn.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    McpError::Wrapper(WrapperError::ToolMissing(spawn.program.clone()))
                }
                _ => McpError::Io(e),
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("child stdout unavailable".to_string()))?;
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text).await;
                text
            })
        });

        let session = tokio::time::timeout(timeout, async move {
            let mut reader = BufReader::new(stdout);
            let exchange = exchange_over(&mut reader, &mut stdin, messages).await?;
            // Closing stdin is the server's signal to exit.
            drop(stdin);
            Ok::<_, McpError>(exchange)
        })
        .await;

        let mut exchange = match session {
            Ok(Ok(exchange)) => exchange,
            Ok(Err(e)) => {
                let _ = child.start_kill();
                log_stderr(stderr_task).await;
                return Err(e);
            }
            Err(_) => {
                tracing::warn!("Server did not answer within {timeout:?}, killing it");
                let _ = child.start_kill();
                // Orphaned grandchildren can hold stderr open past the kill.
                if let Some(task) = stderr_task {
                    task.abort();
                }
                return Err(McpError::Timeout(timeout));
            }
        };

        match tokio::time::timeout(self.exit_grace, child.wait()).await {
            Ok(Ok(status)) => exchange.exit_code = status.code(),
            Ok(Err(e)) => tracing::warn!("Failed to wait for server exit: {e}"),
            Err(_) => {
                tracing::warn!(
                    "Server still running {:?} after stdin closed, killing it",
                    self.exit_grace
                );
                let _ = child.start_kill();
                if let Some(task) = stderr_task {
                    task.abort();
                }
                return Ok(exchange);
            }
        }

        log_stderr(stderr_task).await;
        Ok(exchange)
    }
}

async fn log_stderr(task: Option<tokio::task::JoinHandle<String>>) {
    let Some(task) = task else {
        return;
    };
    if let Ok(Ok(text)) = tokio::time::timeout(Duration::from_secs(1), task).await {
        if !text.trim().is_empty() {
            tracing::debug!("server stderr: {}", text.trim());
        }
    }
}
