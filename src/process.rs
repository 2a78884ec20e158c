//! Subprocess output as a chunk stream.
//!
//! Stdout and stderr share one pipe, so the child's writes reach us in the
//! order it made them. A reader thread splits the pipe into lines for a
//! capture task, which renders them and queues the markup. The consumer side
//! drains that queue with a short timeout and coalesces bursts into single
//! chunks.
//!
//! The child is spawned with `kill_on_drop`. Once the consumer stops pulling,
//! the capture task fails to queue its next line, drops the child, and the
//! subprocess is terminated. A child that stays silent keeps running until it
//! produces output or exits on its own.

use std::io::{BufRead, BufReader, PipeReader};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Result;
use tokio::process::{Child, Command};
use tokio::sync::mpsc::{self, Sender, UnboundedReceiver, UnboundedSender};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::log::LogSource;
use crate::render::{NOTICE_EXIT, Renderer, notice};
use crate::settings::TailSettings;

/// What the capture task hands to the consumer side.
#[derive(Debug)]
enum Captured {
    Output(String),
    Exited,
}

/// Micro-batching of rendered output on the consumer side.
#[derive(Debug, Clone, Copy)]
struct Coalesce {
    timeout: Duration,
    limit: usize,
}

/// A running subprocess whose combined output is tailed.
pub struct ProcessTail {
    args: Vec<String>,
    child: Child,
    lines: UnboundedReceiver<String>,
    renderer: Box<dyn Renderer>,
    coalesce: Coalesce,
}

impl ProcessTail {
    /// Launch `args[0]` with the remaining arguments.
    pub fn spawn(
        args: &[String],
        renderer: Box<dyn Renderer>,
        settings: &TailSettings,
    ) -> Result<Self, SourceError> {
        let command_line = args.join(" ");
        let Some((program, rest)) = args.split_first() else {
            return Err(SourceError::EmptyCommand);
        };
        let spawn_error = |source| SourceError::Spawn {
            command: command_line.clone(),
            source,
        };

        let (output, writer) = std::io::pipe().map_err(spawn_error)?;
        let error_writer = writer.try_clone().map_err(spawn_error)?;
        let mut command = Command::new(program);
        command
            .args(rest)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(error_writer)
            .kill_on_drop(true);
        let child = command.spawn().map_err(spawn_error)?;
        // Our copies of the write end must go, or the pipe never reports EOF
        drop(command);

        let lines = read_lines(output).map_err(spawn_error)?;
        info!(command = %command_line, pid = ?child.id(), "command started");
        Ok(Self {
            args: args.to_vec(),
            child,
            lines,
            renderer,
            coalesce: Coalesce {
                timeout: settings.coalesce_timeout,
                limit: settings.coalesce_limit,
            },
        })
    }
}

/// Split the combined output into lines (terminator included) on a
/// dedicated thread, until end of stream or nobody is listening.
fn read_lines(pipe: PipeReader) -> std::io::Result<UnboundedReceiver<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("livelog-output".to_string())
        .spawn(move || {
            let mut reader = BufReader::new(pipe);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {
                        if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "reading command output failed");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

/// Render every captured line, then report the exit once the child is reaped.
async fn capture(
    mut child: Child,
    mut lines: UnboundedReceiver<String>,
    mut renderer: Box<dyn Renderer>,
    queue: UnboundedSender<Captured>,
) {
    while let Some(line) = lines.recv().await {
        let chunk = renderer.render(&line);
        if !chunk.is_empty() && queue.send(Captured::Output(chunk)).is_err() {
            debug!("consumer gone, terminating command");
            return;
        }
    }
    let rest = renderer.flush();
    if !rest.is_empty() {
        let _ = queue.send(Captured::Output(rest));
    }

    match child.wait().await {
        Ok(status) => info!(%status, "command exited"),
        Err(e) => warn!(error = %e, "waiting for command failed"),
    }
    let _ = queue.send(Captured::Exited);
}

impl Coalesce {
    async fn drain(
        &self,
        mut queue: UnboundedReceiver<Captured>,
        tx: &Sender<String>,
    ) -> Result<()> {
        let mut buffer = String::new();
        loop {
            match timeout(self.timeout, queue.recv()).await {
                Ok(Some(Captured::Output(chunk))) => {
                    buffer.push_str(&chunk);
                    if buffer.len() >= self.limit {
                        let full = std::mem::take(&mut buffer);
                        if tx.send(full).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                // A closed queue means the capture task ended without the sentinel
                Ok(Some(Captured::Exited)) | Ok(None) => {
                    if !buffer.is_empty() && tx.send(buffer).await.is_err() {
                        return Ok(());
                    }
                    let _ = tx.send(notice(NOTICE_EXIT)).await;
                    return Ok(());
                }
                Err(_) if !buffer.is_empty() => {
                    let pending = std::mem::take(&mut buffer);
                    if tx.send(pending).await.is_err() {
                        return Ok(());
                    }
                }
                Err(_) => {}
            }
        }
    }
}

#[async_trait::async_trait]
impl LogSource for ProcessTail {
    async fn stream(self, tx: Sender<String>) -> Result<()> {
        let ProcessTail {
            args,
            child,
            lines,
            renderer,
            coalesce,
        } = self;
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        tokio::spawn(capture(child, lines, renderer, queue_tx));

        if tx.send(notice(&args.join(" "))).await.is_err() {
            return Ok(());
        }
        coalesce.drain(queue_rx, &tx).await
    }
}
