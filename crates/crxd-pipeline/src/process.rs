//! Bundler watch process supervision.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

/// Build process error.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The build command is empty.
    #[error("Build command is empty")]
    EmptyCommand,
    /// The bundler could not be started.
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The bundler exited before its initial build completed.
    #[error("Build process exited before it was ready ({status})")]
    ExitedEarly { status: String },
    /// The bundler reported an error during the initial build.
    #[error("Initial build failed: {0}")]
    Failed(String),
    /// Waiting on or stopping the process failed.
    #[error("Build process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How to decide the initial build is done.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Readiness {
    /// Ready once a stdout line contains the marker.
    Marker(String),
    /// Ready after a fixed delay.
    Settle(Duration),
}

impl Readiness {
    /// Prefer the marker when one is configured.
    #[must_use]
    pub fn new(marker: Option<String>, settle: Duration) -> Self {
        match marker {
            Some(marker) if !marker.is_empty() => Self::Marker(marker),
            _ => Self::Settle(settle),
        }
    }
}

/// A running bundler in watch mode.
///
/// The child is killed when this value is dropped.
pub struct BuildProcess {
    child: Child,
    readiness: Readiness,
    ready: Option<oneshot::Receiver<()>>,
    stderr: Option<mpsc::UnboundedReceiver<String>>,
}

impl BuildProcess {
    /// Start `argv` in `cwd` with piped output.
    ///
    /// # Errors
    ///
    /// Returns an error if `argv` is empty or the program cannot be started.
    pub fn spawn(argv: &[String], cwd: &Path, readiness: Readiness) -> Result<Self, BuildError> {
        let (program, args) = argv.split_first().ok_or(BuildError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BuildError::Spawn {
                program: program.clone(),
                source,
            })?;
        tracing::info!(program = %program, pid = child.id(), "Build process started");

        let (ready_tx, ready_rx) = oneshot::channel();
        let marker = match &readiness {
            Readiness::Marker(marker) => Some(marker.clone()),
            Readiness::Settle(_) => None,
        };
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_stdout(stdout, marker, ready_tx));
        }

        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr, stderr_tx));
        }

        Ok(Self {
            child,
            readiness,
            ready: Some(ready_rx),
            stderr: Some(stderr_rx),
        })
    }

    /// Wait for the initial build to complete.
    ///
    /// Any stderr line before readiness fails the initial build. Later stderr
    /// output is only logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the process writes to stderr or exits first.
    pub async fn wait_ready(&mut self) -> Result<(), BuildError> {
        let ready = self.ready.take();
        let mut stderr = self.stderr.take();
        let readiness = &self.readiness;

        let signal = async move {
            match (readiness, ready) {
                (Readiness::Marker(_), Some(rx)) => {
                    // stdout closed without the marker: wait for the exit instead.
                    if rx.await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                (Readiness::Settle(delay), _) => tokio::time::sleep(*delay).await,
                (Readiness::Marker(_), None) => {}
            }
        };

        tokio::select! {
            () = signal => {}
            status = self.child.wait() => {
                return Err(BuildError::ExitedEarly { status: status?.to_string() });
            }
            Some(line) = recv_line(stderr.as_mut()) => return Err(BuildError::Failed(line)),
        }

        // Output written between the last poll and readiness still counts.
        if let Some(line) = stderr.as_mut().and_then(|rx| rx.try_recv().ok()) {
            return Err(BuildError::Failed(line));
        }

        tracing::info!("Initial build ready");
        Ok(())
    }

    /// Kill the process and reap it.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be delivered.
    pub async fn kill(mut self) -> Result<(), BuildError> {
        self.child.kill().await?;
        tracing::info!("Build process stopped");
        Ok(())
    }
}

async fn recv_line(rx: Option<&mut mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn forward_stdout<R>(stdout: R, marker: Option<String>, ready: oneshot::Sender<()>)
where
    R: AsyncRead + Unpin,
{
    let mut ready = Some(ready);
    let mut lines = BufReader::new(stdout).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "crxd::build", "{line}");
        if marker.as_deref().is_some_and(|marker| line.contains(marker))
            && let Some(tx) = ready.take()
        {
            let _ = tx.send(());
        }
    }
}

async fn forward_stderr<R>(stderr: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        tracing::error!(target: "crxd::build", "{line}");
        // Receiver is gone once the initial build is ready.
        let _ = tx.send(line);
    }
}
