//! The Git service runner: spawning `upload-pack`/`receive-pack` children
//! and wiring their stdio to client streams.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio_util::io::{ReaderStream, StreamReader};

use crate::pktline::advertisement_prelude;
use crate::service::GitService;
use crate::{ByteStream, GitError, Result};

/// Copy granularity for the stdout pump.
const CHUNK_SIZE: usize = 32 * 1024;

/// Per-request options for [`GitRunner::serve`].
#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    /// Smart-HTTP half-duplex mode. SSH sessions run the full
    /// bidirectional protocol and leave this off.
    pub stateless_rpc: bool,
    /// Client `Git-Protocol` header, propagated as `GIT_PROTOCOL` so v2
    /// negotiation works through the proxy.
    pub protocol: Option<String>,
}

/// How a served operation ended.
#[derive(Debug)]
pub enum ServeOutcome {
    /// Child exited zero.
    Completed,
    /// Child exited non-zero; stderr is for the server log only.
    Failed {
        /// Child exit status.
        status: i32,
        /// Captured stderr.
        stderr: String,
    },
    /// The client went away; the child was killed.
    Cancelled,
}

impl ServeOutcome {
    /// Exit code to mirror on an SSH channel.
    pub fn exit_code(&self) -> u32 {
        match self {
            Self::Completed => 0,
            Self::Failed { status, .. } => u32::try_from(*status).unwrap_or(1),
            Self::Cancelled => 1,
        }
    }
}

/// A running service: the child's stdout as a stream, plus a completion
/// channel that resolves after the child has been reaped.
pub struct ServeHandle {
    /// Wire bytes from the child, delivered in order, never buffered whole.
    pub output: ByteStream,
    /// Resolves exactly once when the operation finishes. Audit records and
    /// post-push hooks hang off this, so nothing is recorded for an
    /// operation that never completed.
    pub completion: oneshot::Receiver<ServeOutcome>,
}

/// Runs Git transport services against a repository directory.
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// Reference advertisement for `GET /info/refs`: the `# service=`
    /// pkt-line prelude, a flush packet, then the child's
    /// `--advertise-refs` output.
    async fn advertise(&self, service: GitService, repo_dir: &Path) -> Result<ByteStream>;

    /// Run a service with the request body wired to stdin and stdout
    /// streamed back. Both directions stream; neither side is held in
    /// memory.
    async fn serve(
        &self,
        service: GitService,
        repo_dir: &Path,
        input: ByteStream,
        options: ServeOptions,
    ) -> Result<ServeHandle>;
}

/// Production runner spawning the `git` binary.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Create a runner.
    pub fn new() -> Self {
        Self
    }

    fn command(service: GitService, repo_dir: &Path, options: &ServeOptions) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg(service.subcommand());
        if options.stateless_rpc {
            cmd.arg("--stateless-rpc");
        }
        cmd.arg(repo_dir)
            .env("GIT_HTTP_EXPORT_ALL", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(protocol) = &options.protocol {
            cmd.env("GIT_PROTOCOL", protocol);
        }
        cmd
    }
}

#[async_trait]
impl GitRunner for ProcessRunner {
    async fn advertise(&self, service: GitService, repo_dir: &Path) -> Result<ByteStream> {
        let mut child = Command::new("git")
            .arg(service.subcommand())
            .arg("--stateless-rpc")
            .arg("--advertise-refs")
            .arg(repo_dir)
            .env("GIT_HTTP_EXPORT_ALL", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(GitError::Spawn)?;

        let stdout = child.stdout.take().ok_or_else(|| {
            GitError::Spawn(std::io::Error::other("child stdout not captured"))
        })?;
        let mut stderr = child.stderr.take();

        // Reap the child off to the side; the advertisement stream only
        // borrows its stdout pipe.
        tokio::spawn(async move {
            let mut err_buf = Vec::new();
            if let Some(stderr) = stderr.as_mut() {
                let _ = stderr.read_to_end(&mut err_buf).await;
            }
            match child.wait().await {
                Ok(status) if !status.success() => {
                    tracing::warn!(
                        status = status.code().unwrap_or(-1),
                        stderr = %String::from_utf8_lossy(&err_buf),
                        "advertise-refs child failed"
                    );
                }
                Err(e) => tracing::warn!(error = %e, "failed to reap advertise-refs child"),
                _ => {}
            }
        });

        let prelude = Bytes::from(advertisement_prelude(service.name()));
        let stream = futures::stream::once(async move { Ok(prelude) })
            .chain(ReaderStream::with_capacity(stdout, CHUNK_SIZE));
        Ok(Box::pin(stream))
    }

    async fn serve(
        &self,
        service: GitService,
        repo_dir: &Path,
        input: ByteStream,
        options: ServeOptions,
    ) -> Result<ServeHandle> {
        let mut child = Self::command(service, repo_dir, &options)
            .spawn()
            .map_err(GitError::Spawn)?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            GitError::Spawn(std::io::Error::other("child stdin not captured"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            GitError::Spawn(std::io::Error::other("child stdout not captured"))
        })?;
        let mut stderr = child.stderr.take();

        // Request body → child stdin. Closing stdin is the EOF the child
        // waits for in stateless-rpc mode.
        tokio::spawn(async move {
            let mut reader = StreamReader::new(input);
            if let Err(e) = tokio::io::copy(&mut reader, &mut stdin).await {
                tracing::debug!(error = %e, "request body pipe ended early");
            }
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(error = %e, "closing child stdin failed");
            }
        });

        // Stderr drained concurrently so a chatty child cannot deadlock on
        // a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(stderr) = stderr.as_mut() {
                let _ = stderr.read_to_end(&mut buf).await;
            }
            buf
        });

        let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(16);
        let (done_tx, done_rx) = oneshot::channel();

        // Child stdout → response. Chunks flow as they arrive so sideband
        // progress reaches the client mid-negotiation.
        tokio::spawn(async move {
            let mut cancelled = false;
            let mut stream = ReaderStream::with_capacity(stdout, CHUNK_SIZE);
            while let Some(chunk) = stream.next().await {
                let is_err = chunk.is_err();
                if tx.send(chunk).await.is_err() {
                    cancelled = true;
                    break;
                }
                if is_err {
                    break;
                }
            }
            drop(stream);

            let outcome = if cancelled {
                if let Err(e) = child.kill().await {
                    tracing::debug!(error = %e, "killing cancelled git child failed");
                }
                let _ = child.wait().await;
                ServeOutcome::Cancelled
            } else {
                match child.wait().await {
                    Ok(status) if status.success() => ServeOutcome::Completed,
                    Ok(status) => {
                        let stderr = stderr_task.await.unwrap_or_default();
                        ServeOutcome::Failed {
                            status: status.code().unwrap_or(-1),
                            stderr: String::from_utf8_lossy(&stderr).into_owned(),
                        }
                    }
                    Err(e) => ServeOutcome::Failed {
                        status: -1,
                        stderr: e.to_string(),
                    },
                }
            };
            let _ = done_tx.send(outcome);
        });

        Ok(ServeHandle {
            output: Box::pin(tokio_stream_from(rx)),
            completion: done_rx,
        })
    }
}

fn tokio_stream_from(
    rx: mpsc::Receiver<std::io::Result<Bytes>>,
) -> impl futures::Stream<Item = std::io::Result<Bytes>> {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
}

/// Test fake: advertises only the prelude and serves by echoing the
/// request body back.
#[derive(Debug, Clone, Default)]
pub struct EchoRunner;

#[async_trait]
impl GitRunner for EchoRunner {
    async fn advertise(&self, service: GitService, _repo_dir: &Path) -> Result<ByteStream> {
        let prelude = Bytes::from(advertisement_prelude(service.name()));
        Ok(Box::pin(futures::stream::once(async move { Ok(prelude) })))
    }

    async fn serve(
        &self,
        _service: GitService,
        _repo_dir: &Path,
        input: ByteStream,
        _options: ServeOptions,
    ) -> Result<ServeHandle> {
        let (done_tx, done_rx) = oneshot::channel();
        let output = input.chain(futures::stream::once(async move {
            let _ = done_tx.send(ServeOutcome::Completed);
            Ok(Bytes::new())
        }));
        Ok(ServeHandle {
            output: Box::pin(output),
            completion: done_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_stream(chunks: Vec<&'static [u8]>) -> ByteStream {
        Box::pin(futures::stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c))),
        ))
    }

    #[tokio::test]
    async fn echo_runner_round_trips_and_completes() {
        let runner = EchoRunner;
        let handle = runner
            .serve(
                GitService::UploadPack,
                Path::new("/nowhere"),
                bytes_stream(vec![b"0000"]),
                ServeOptions::default(),
            )
            .await
            .unwrap();

        let mut collected = Vec::new();
        let mut output = handle.output;
        while let Some(chunk) = output.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"0000");
        assert!(matches!(
            handle.completion.await.unwrap(),
            ServeOutcome::Completed
        ));
    }

    #[test]
    fn exit_codes_mirror_outcomes() {
        assert_eq!(ServeOutcome::Completed.exit_code(), 0);
        assert_eq!(
            ServeOutcome::Failed {
                status: 128,
                stderr: String::new()
            }
            .exit_code(),
            128
        );
        assert_eq!(ServeOutcome::Cancelled.exit_code(), 1);
    }
}
