// SPDX-License-Identifier: MIT

//! Process execution boundary
//!
//! The executor never spawns processes itself. It hands a shell command to a
//! [`ProcessRunner`] and receives the output line by line over a channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_stream::wrappers::SplitStream;
use tokio_stream::StreamExt;

use super::error::ProcessError;

/// Exit code reported when a process was terminated by a signal
pub const SIGNAL_EXIT_CODE: i32 = -1;

/// Which pipe a line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn label(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "STDOUT",
            OutputStream::Stderr => "STDERR",
        }
    }
}

/// One line of child process output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

/// Runs shell commands on behalf of the executor
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` to completion, sending every non-blank output line on
    /// `tx`, and return its exit code.
    async fn run(&self, command: &str, tx: mpsc::Sender<OutputLine>) -> Result<i32, ProcessError>;
}

/// Runs commands through `sh -c`
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl ShellRunner {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    /// Use a different POSIX shell binary
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Output is decoded lossily, invalid UTF-8 never fails a task
fn decode_line(stream: OutputStream, bytes: &[u8]) -> OutputLine {
    let line = String::from_utf8_lossy(bytes);
    OutputLine {
        stream,
        line: line.strip_suffix('\r').unwrap_or(&*line).to_string(),
    }
}

fn missing_pipe(stream: &'static str) -> ProcessError {
    ProcessError::Stream {
        stream,
        source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe was not captured"),
    }
}

#[async_trait]
impl ProcessRunner for ShellRunner {
    async fn run(&self, command: &str, tx: mpsc::Sender<OutputLine>) -> Result<i32, ProcessError> {
        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let out = SplitStream::new(BufReader::new(stdout).split(b'\n'))
            .map(|res| res.map(|bytes| decode_line(OutputStream::Stdout, &bytes)));
        let err = SplitStream::new(BufReader::new(stderr).split(b'\n'))
            .map(|res| res.map(|bytes| decode_line(OutputStream::Stderr, &bytes)));
        let mut merged = out.merge(err);

        while let Some(item) = merged.next().await {
            let output = item.map_err(|source| ProcessError::Stream {
                stream: "output",
                source,
            })?;
            if output.line.trim().is_empty() {
                continue;
            }
            // Keep draining after the receiver is gone
            let _ = tx.send(output).await;
        }

        let status = child.wait().await.map_err(|source| ProcessError::Stream {
            stream: "process",
            source,
        })?;

        Ok(status.code().unwrap_or(SIGNAL_EXIT_CODE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(command: &str) -> (i32, Vec<OutputLine>) {
        let runner = ShellRunner::new();
        let (tx, mut rx) = mpsc::channel(64);
        let code = runner.run(command, tx).await.unwrap();
        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        (code, lines)
    }

    #[tokio::test]
    async fn test_exit_code_zero() {
        let (code, lines) = collect("echo hello").await;
        assert_eq!(code, 0);
        assert_eq!(
            lines,
            vec![OutputLine {
                stream: OutputStream::Stdout,
                line: "hello".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_stderr_and_nonzero_exit() {
        let (code, lines) = collect("echo oops 1>&2; exit 3").await;
        assert_eq!(code, 3);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].stream, OutputStream::Stderr);
        assert_eq!(lines[0].line, "oops");
    }

    #[tokio::test]
    async fn test_blank_lines_are_dropped() {
        let (_, lines) = collect("printf 'a\\n\\n  \\nb\\n'").await;
        let text: Vec<_> = lines.iter().map(|l| l.line.as_str()).collect();
        assert_eq!(text, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_decoded_lossily() {
        let (code, lines) = collect("printf 'ok\\n\\377\\376\\n'; exit 0").await;
        assert_eq!(code, 0);
        let text: Vec<_> = lines.iter().map(|l| l.line.as_str()).collect();
        assert_eq!(text, vec!["ok", "\u{FFFD}\u{FFFD}"]);
    }

    #[tokio::test]
    async fn test_crlf_is_trimmed() {
        let (_, lines) = collect("printf 'a\\r\\nb'").await;
        let text: Vec<_> = lines.iter().map(|l| l.line.as_str()).collect();
        assert_eq!(text, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_missing_shell_is_spawn_error() {
        let runner = ShellRunner::with_shell("/definitely/not/a/shell");
        let (tx, _rx) = mpsc::channel(1);
        let result = runner.run("true", tx).await;
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }
}
