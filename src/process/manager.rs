//! MCP server process spawning and control.
//!
//! [`ProcessManager`] owns at most one child at a time. Output is pushed to
//! the owner as [`ProcessEvent`]s over an mpsc channel: stdout and stderr
//! chunks as they arrive, then exactly one `Terminated` event per launch.
//! Every event carries the generation of the launch that produced it.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ServerConfig, Transport};

use super::ProcessError;

/// Grace period between the termination request and a forced kill.
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default capacity of the process event channel.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

const READ_CHUNK_SIZE: usize = 8192;

/// Upper bound on waiting for stdout/stderr to drain after exit.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound on reaping a child after a forced kill.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Events pushed from a running child to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A chunk read from stdout.
    Stdout { generation: u64, bytes: Vec<u8> },
    /// A chunk read from stderr.
    Stderr { generation: u64, bytes: Vec<u8> },
    /// The child exited. Sent once per launch, after all of its output.
    Terminated {
        /// Launch counter of the run that ended.
        generation: u64,
        /// Exit code, or `128 + signal` when killed by a signal.
        code: i32,
    },
}

impl ProcessEvent {
    /// Launch counter of the run that produced the event.
    #[must_use]
    pub fn generation(&self) -> u64 {
        match self {
            Self::Stdout { generation, .. }
            | Self::Stderr { generation, .. }
            | Self::Terminated { generation, .. } => *generation,
        }
    }
}

#[derive(Debug)]
struct RunningChild {
    pid: Option<u32>,
    generation: u64,
    stdin_tx: mpsc::UnboundedSender<Vec<u8>>,
    exit_rx: watch::Receiver<Option<i32>>,
    kill: CancellationToken,
}

impl RunningChild {
    fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }
}

impl Drop for RunningChild {
    fn drop(&mut self) {
        // Never leave an orphan behind once the handle is released.
        self.kill.cancel();
    }
}

/// Supervises a single MCP server child process.
#[derive(Debug)]
pub struct ProcessManager {
    config: ServerConfig,
    events: mpsc::Sender<ProcessEvent>,
    running: Option<RunningChild>,
    generation: u64,
    terminate_timeout: Duration,
}

impl ProcessManager {
    /// Create a manager that reports events on `events`.
    #[must_use]
    pub fn new(config: ServerConfig, events: mpsc::Sender<ProcessEvent>) -> Self {
        Self {
            config,
            events,
            running: None,
            generation: 0,
            terminate_timeout: DEFAULT_TERMINATE_TIMEOUT,
        }
    }

    /// Create a manager together with its event receiver.
    #[must_use]
    pub fn channel(config: ServerConfig) -> (Self, mpsc::Receiver<ProcessEvent>) {
        let (tx, rx) = mpsc::channel(DEFAULT_EVENT_BUFFER);
        (Self::new(config, tx), rx)
    }

    /// Override the grace period used by [`terminate`](Self::terminate).
    #[must_use]
    pub fn with_terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns true while a launched child has not exited.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.as_ref().is_some_and(|r| !r.has_exited())
    }

    /// Process id of the current child.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().and_then(|r| r.pid)
    }

    /// Number of launches so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation of the child currently held, exited or not.
    ///
    /// `None` after [`terminate`](Self::terminate) released it, which lets
    /// the owner recognise the exit event of a run it stopped on purpose.
    #[must_use]
    pub fn active_generation(&self) -> Option<u64> {
        self.running.as_ref().map(|r| r.generation)
    }

    /// Launch the configured server.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::AlreadyRunning` if a child is alive,
    /// `ProcessError::BinaryNotFound` if the executable does not exist, or
    /// `ProcessError::Io` if spawning fails.
    pub async fn launch(&mut self) -> Result<(), ProcessError> {
        if self.is_running() {
            return Err(ProcessError::AlreadyRunning);
        }

        let executable: PathBuf = self
            .config
            .executable_path()
            .ok_or_else(|| ProcessError::BinaryNotFound {
                path: self.config.binary_path.display().to_string(),
            })?
            .to_path_buf();

        if self.config.transport == Transport::Http {
            free_port(self.config.http_port).await;
        }

        // Drop the handle of a previous run that exited on its own.
        self.running = None;

        let args = self.config.arguments();
        let mut cmd = Command::new(&executable);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = self.config.resolved_working_dir() {
            cmd.current_dir(dir);
        }

        tracing::info!(
            binary = %executable.display(),
            args = %args.join(" "),
            "Launching MCP server"
        );

        let mut child = cmd.spawn()?;

        self.generation += 1;
        let generation = self.generation;
        let pid = child.id();

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(
                stdout,
                self.events.clone(),
                generation,
                |generation, bytes| ProcessEvent::Stdout { generation, bytes },
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(
                stderr,
                self.events.clone(),
                generation,
                |generation, bytes| ProcessEvent::Stderr { generation, bytes },
            ));
        }

        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();
        if let Some(stdin) = child.stdin.take() {
            spawn_writer(stdin, stdin_rx);
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let kill = CancellationToken::new();
        let kill_requested = kill.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                () = kill_requested.cancelled() => {
                    if let Err(e) = child.start_kill() {
                        tracing::debug!(error = %e, "Kill signal failed");
                    }
                    child.wait().await
                }
            };

            let code = match status {
                Ok(status) => exit_code(status),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to wait for MCP process");
                    -1
                }
            };

            // Deliver every byte of this run before reporting its exit.
            let drained = tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, async {
                for reader in readers {
                    let _ = reader.await;
                }
            })
            .await;
            if drained.is_err() {
                tracing::debug!(generation, "Output streams still open after exit");
            }

            let _ = exit_tx.send(Some(code));
            tracing::info!(generation, code, "MCP process terminated");
            let _ = events.send(ProcessEvent::Terminated { generation, code }).await;
        });

        tracing::info!(pid = ?pid, generation, "MCP server launched");

        self.running = Some(RunningChild {
            pid,
            generation,
            stdin_tx,
            exit_rx,
            kill,
        });

        Ok(())
    }

    /// Stop the child: request a graceful exit, force-kill after the grace
    /// period, then release all handles.
    ///
    /// Returns immediately if nothing is held. A child that already exited
    /// is simply released.
    pub async fn terminate(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };

        if !running.has_exited() {
            if !request_graceful_exit(running.pid) {
                running.kill.cancel();
            }

            let graceful =
                tokio::time::timeout(self.terminate_timeout, wait_for_exit(&mut running.exit_rx))
                    .await;

            if graceful.is_err() {
                tracing::warn!(
                    pid = ?running.pid,
                    timeout_ms = self.terminate_timeout.as_millis(),
                    "MCP process ignored termination request, force killing"
                );
                running.kill.cancel();
                if tokio::time::timeout(REAP_TIMEOUT, wait_for_exit(&mut running.exit_rx))
                    .await
                    .is_err()
                {
                    tracing::error!(pid = ?running.pid, "MCP process could not be reaped");
                }
            }
        }

        tracing::debug!(generation = running.generation, "Released MCP process handles");
    }

    /// Queue raw bytes for the child's stdin.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::NotRunning` if no child is alive.
    pub fn send(&self, data: &[u8]) -> Result<(), ProcessError> {
        let running = self
            .running
            .as_ref()
            .filter(|r| !r.has_exited())
            .ok_or(ProcessError::NotRunning)?;

        running
            .stdin_tx
            .send(data.to_vec())
            .map_err(|_| ProcessError::NotRunning)
    }

    /// Queue a line of text, appending `\n` if missing.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::NotRunning` if no child is alive.
    pub fn send_line(&self, line: &str) -> Result<(), ProcessError> {
        if line.ends_with('\n') {
            self.send(line.as_bytes())
        } else {
            let mut owned = String::with_capacity(line.len() + 1);
            owned.push_str(line);
            owned.push('\n');
            self.send(owned.as_bytes())
        }
    }

    /// Serialize a message as one JSON line and queue it.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::Encoding` if serialization fails, or
    /// `ProcessError::NotRunning` if no child is alive.
    pub fn send_message<T: serde::Serialize>(&self, message: &T) -> Result<(), ProcessError> {
        let line = serde_json::to_string(message)?;
        self.send_line(&line)
    }
}

fn spawn_reader<R>(
    mut stream: R,
    events: mpsc::Sender<ProcessEvent>,
    generation: u64,
    wrap: fn(u64, Vec<u8>) -> ProcessEvent,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if events.send(wrap(generation, buf[..n].to_vec())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Child output stream closed with error");
                    break;
                }
            }
        }
    })
}

fn spawn_writer(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            let written = async {
                stdin.write_all(&data).await?;
                stdin.flush().await
            }
            .await;
            if let Err(e) = written {
                tracing::warn!(error = %e, "Failed to write to MCP process stdin");
                break;
            }
        }
    });
}

async fn wait_for_exit(exit_rx: &mut watch::Receiver<Option<i32>>) -> Option<i32> {
    exit_rx.wait_for(|code| code.is_some()).await.ok().and_then(|code| *code)
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}

#[cfg(unix)]
fn request_graceful_exit(pid: Option<u32>) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = pid else {
        return false;
    };
    let nix_pid = Pid::from_raw(i32::try_from(pid).unwrap_or(i32::MAX));
    kill(nix_pid, Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn request_graceful_exit(_pid: Option<u32>) -> bool {
    false
}

/// Kill whatever is listening on `port` so an HTTP-mode server can bind it.
#[cfg(unix)]
async fn free_port(port: u16) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let output = match Command::new("lsof")
        .args(["-ti", &format!(":{port}")])
        .stderr(Stdio::null())
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => {
            tracing::debug!(port, error = %e, "Could not inspect port");
            return;
        }
    };

    let pids: Vec<i32> = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect();
    if pids.is_empty() {
        return;
    }

    tracing::warn!(port, pids = ?pids, "Killing processes holding the HTTP port");
    for pid in &pids {
        let _ = kill(Pid::from_raw(*pid), Signal::SIGTERM);
    }
    tokio::time::sleep(DEFAULT_TERMINATE_TIMEOUT).await;
    for pid in &pids {
        let _ = kill(Pid::from_raw(*pid), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
async fn free_port(_port: u16) {}
