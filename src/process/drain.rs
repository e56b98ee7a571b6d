//! Pipe draining and per-line dispatch

use super::OutputHandling;
use crate::error::Result;
use crate::logging::Logger;
use tokio::fs::{File, OpenOptions};
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};

/// Which pipe a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Applies one process's output handling to every line it prints
pub struct LineHandler {
    label: String,
    logger: Logger,
    output: OutputHandling,
    logfile: Option<File>,
}

impl LineHandler {
    /// Opens the logfile (if any) in append mode; it is never truncated here.
    pub async fn open(label: String, logger: Logger, output: OutputHandling) -> Result<Self> {
        let logfile = match &output.logfile {
            Some(path) => Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?,
            ),
            None => None,
        };
        Ok(Self {
            label,
            logger,
            output,
            logfile,
        })
    }

    pub async fn handle(&mut self, stream: Stream, line: &str) {
        let echo = match stream {
            Stream::Stdout => self.output.echo_stdout,
            Stream::Stderr => self.output.echo_stderr,
        };
        if echo {
            self.logger
                .log(self.output.echo_level, &format!("{}: {}", self.label, line))
                .field("stream", stream.as_str())
                .log()
                .await;
        }

        if let Some(file) = self.logfile.as_mut() {
            let mut bytes = Vec::with_capacity(line.len() + 1);
            bytes.extend_from_slice(line.as_bytes());
            bytes.push(b'\n');
            if let Err(e) = file.write_all(&bytes).await {
                self.logger
                    .error(&format!("Failed to append to logfile for {}: {}", self.label, e))
                    .log()
                    .await;
                self.logfile = None;
            }
        }

        if let Some(callback) = &self.output.callback {
            callback(line);
        }
    }

    /// Flush buffered logfile writes
    pub async fn finish(&mut self) {
        if let Some(file) = self.logfile.as_mut() {
            let _ = file.flush().await;
        }
    }
}

/// Newline-delimited reader that decodes invalid UTF-8 lossily instead of
/// failing, so a stray binary byte never stops a pipe from being drained.
struct RawLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> RawLines<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// `Ok(None)` at end-of-file. Cancel safe: bytes read before a
    /// cancellation stay buffered for the next call.
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }

        let mut end = self.buf.len();
        if self.buf.ends_with(b"\n") {
            end -= 1;
            if self.buf[..end].ends_with(b"\r") {
                end -= 1;
            }
        }
        let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf.clear();
        Ok(Some(line))
    }
}

/// Read both pipes until both reach end-of-file, dispatching every line.
///
/// Neither stream can starve the other, and lines still buffered after the
/// process exits are delivered before this returns. Only a real read error
/// ends a stream early.
pub async fn drain_lines<O, E>(stdout: O, stderr: E, handler: &mut LineHandler)
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out = RawLines::new(stdout);
    let mut err = RawLines::new(stderr);
    let mut out_done = false;
    let mut err_done = false;

    while !(out_done && err_done) {
        tokio::select! {
            line = out.next_line(), if !out_done => match line {
                Ok(Some(line)) => handler.handle(Stream::Stdout, &line).await,
                Ok(None) => out_done = true,
                Err(e) => {
                    handler.logger.debug(&format!("{}: stdout read error: {}", handler.label, e)).log().await;
                    out_done = true;
                }
            },
            line = err.next_line(), if !err_done => match line {
                Ok(Some(line)) => handler.handle(Stream::Stderr, &line).await,
                Ok(None) => err_done = true,
                Err(e) => {
                    handler.logger.debug(&format!("{}: stderr read error: {}", handler.label, e)).log().await;
                    err_done = true;
                }
            },
        }
    }

    handler.finish().await;
}
