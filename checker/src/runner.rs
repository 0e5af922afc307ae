//! One external-checker invocation.
//!
//! The document is written to the checker's stdin in full and the pipe is
//! closed. Stdout and stderr are drained concurrently and parsed line by line
//! into a single [`DiagnosticsByFile`]. The exit status is logged but never
//! interpreted: checkers conventionally exit non-zero when they find errors.

use std::env;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;

use crate::parser::OutputParser;
use crate::types::{CheckerConfig, DiagnosticsByFile};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Failure to launch a checker or to talk to it.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{command} not found: {source}")]
    NotFound {
        command: String,
        source: which::Error,
    },
    #[error("failed to launch {command}: {source}")]
    Launch {
        command: String,
        source: io::Error,
    },
    #[error("no {0} pipe from checker process")]
    MissingPipe(&'static str),
    #[error("I/O error while running {command}: {source}")]
    Io {
        command: String,
        source: io::Error,
    },
}

/// Runs a configured checker against one document's text.
pub struct ProcessRunner<'a> {
    config: &'a CheckerConfig,
    workspace_root: &'a Path,
}

impl<'a> ProcessRunner<'a> {
    #[must_use]
    pub fn new(config: &'a CheckerConfig, workspace_root: &'a Path) -> Self {
        Self {
            config,
            workspace_root,
        }
    }

    /// Resolve the command against `PATH`, relative to the workspace root.
    fn resolve_command(&self) -> Result<PathBuf, RunError> {
        which::which_in(
            self.config.command(),
            env::var_os("PATH"),
            self.workspace_root,
        )
        .map_err(|source| RunError::NotFound {
            command: self.config.command().to_string(),
            source,
        })
    }

    /// Launch the checker, feed it `input`, and collect its diagnostics.
    ///
    /// Resolves once the process has exited, whatever its exit status.
    pub async fn run(&self, input: &str) -> Result<DiagnosticsByFile, RunError> {
        let program = self.resolve_command()?;
        let command = self.config.command().to_string();

        let mut child = Command::new(&program)
            .args(self.config.arguments())
            .current_dir(self.workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| RunError::Launch {
                command: command.clone(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(RunError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(RunError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(RunError::MissingPipe("stderr"))?;

        let (fed, drained) = tokio::join!(feed_input(stdin, input), drain_output(stdout, stderr));
        let io_error = |source: io::Error| RunError::Io {
            command: command.clone(),
            source,
        };
        fed.map_err(io_error)?;
        let diagnostics = drained.map_err(io_error)?;

        let status = child.wait().await.map_err(io_error)?;
        tracing::debug!(
            checker = %self.config.display_name(),
            %status,
            diagnostics = diagnostics.total_count(),
            "Checker process exited"
        );
        Ok(diagnostics)
    }
}

/// Write the whole input and close the pipe.
///
/// A checker that exits without reading stdin closes its end first; that is
/// not a failure of the run.
async fn feed_input<W: AsyncWrite + Unpin>(mut stdin: W, input: &str) -> io::Result<()> {
    let written = async {
        stdin.write_all(input.as_bytes()).await?;
        stdin.shutdown().await
    }
    .await;
    drop(stdin);
    match written {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            tracing::debug!("Checker closed stdin before reading all input");
            Ok(())
        }
        other => other,
    }
}

/// Read both output streams to EOF, parsing complete lines as they arrive.
async fn drain_output<O, E>(mut stdout: O, mut stderr: E) -> io::Result<DiagnosticsByFile>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut diagnostics = DiagnosticsByFile::default();
    let mut out_parser = OutputParser::new();
    let mut err_parser = OutputParser::new();
    let mut out_buf = vec![0u8; READ_CHUNK_BYTES];
    let mut err_buf = vec![0u8; READ_CHUNK_BYTES];
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = stdout.read(&mut out_buf), if out_open => {
                let n = read?;
                if n == 0 {
                    out_open = false;
                    out_parser.finish(&mut diagnostics);
                } else {
                    out_parser.push(&out_buf[..n], &mut diagnostics);
                }
            }
            read = stderr.read(&mut err_buf), if err_open => {
                let n = read?;
                if n == 0 {
                    err_open = false;
                    err_parser.finish(&mut diagnostics);
                } else {
                    err_parser.push(&err_buf[..n], &mut diagnostics);
                }
            }
        }
    }

    Ok(diagnostics)
}
