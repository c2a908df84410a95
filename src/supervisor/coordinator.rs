//! Single-writer actor that ties the process, the framers, the tracker and
//! the crash monitor together.
//!
//! Every state change happens inside [`McpCoordinator::run`]. Callers talk to
//! it through a cloneable [`CoordinatorHandle`] and observe it through a
//! `watch` channel of [`CoordinatorSnapshot`]s.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use crate::config::NotchConfig;
use crate::process::{CrashMonitor, LineFramer, ProcessError, ProcessEvent, ProcessManager};
use crate::rpc::{BuildResult, RpcMessage, RpcParser};
use crate::tracker::{TokenTotals, ToolCall, ToolCallTracker, ToolEvent};

use super::ServerState;

/// Cap on the accumulated stderr text. Oldest text is dropped first.
pub const MAX_ERROR_OUTPUT_BYTES: usize = 64 * 1024;

/// Pause between stop and start on [`CoordinatorHandle::restart`].
pub const RESTART_PAUSE: Duration = Duration::from_millis(500);

const COMMAND_BUFFER: usize = 32;

/// Errors returned by [`CoordinatorHandle`] calls.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Coordinator has shut down")]
    Closed,
}

/// Everything an observer can see of the supervised server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinatorSnapshot {
    pub state: ServerState,
    pub pid: Option<u32>,
    /// Newest first.
    pub recent_tool_calls: Vec<ToolCall>,
    pub current_build_time: Option<Duration>,
    pub last_build_result: Option<BuildResult>,
    pub error_output: String,
    pub restart_attempts: u32,
    pub token_totals: TokenTotals,
}

#[derive(Debug)]
enum Command {
    Start(oneshot::Sender<Result<(), ProcessError>>),
    Stop(oneshot::Sender<()>),
    Restart(oneshot::Sender<Result<(), ProcessError>>),
    SendLine(String, oneshot::Sender<Result<(), ProcessError>>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable front door to a running [`McpCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<CoordinatorSnapshot>,
}

impl CoordinatorHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| CoordinatorError::Closed)?;
        rx.await.map_err(|_| CoordinatorError::Closed)
    }

    /// Launch the server. Does nothing if it is already active.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Process` if the launch fails, or
    /// `CoordinatorError::Closed` if the coordinator is gone.
    pub async fn start(&self) -> Result<(), CoordinatorError> {
        Ok(self.request(Command::Start).await??)
    }

    /// Stop the server and cancel any pending automatic restart.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Closed` if the coordinator is gone.
    pub async fn stop(&self) -> Result<(), CoordinatorError> {
        self.request(Command::Stop).await
    }

    /// Stop, pause briefly, start again.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub async fn restart(&self) -> Result<(), CoordinatorError> {
        Ok(self.request(Command::Restart).await??)
    }

    /// Write one line to the server's stdin.
    ///
    /// Outgoing `tools/call` requests are tracked like the server's own.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Process` with `ProcessError::NotRunning`
    /// when no server is running.
    pub async fn send_line(&self, line: impl Into<String>) -> Result<(), CoordinatorError> {
        let line = line.into();
        Ok(self.request(|tx| Command::SendLine(line, tx)).await??)
    }

    /// Stop the server and end the actor.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Closed` if the coordinator is already gone.
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        self.request(Command::Shutdown).await
    }

    /// Latest published state.
    #[must_use]
    pub fn snapshot(&self) -> CoordinatorSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified on every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorSnapshot> {
        self.snapshots.clone()
    }
}

/// Owner of the supervised server and everything derived from its output.
#[derive(Debug)]
pub struct McpCoordinator {
    process: ProcessManager,
    events: mpsc::Receiver<ProcessEvent>,
    stdout_framer: LineFramer,
    stderr_framer: LineFramer,
    parser: RpcParser,
    tracker: ToolCallTracker,
    monitor: CrashMonitor,
    restarts: mpsc::UnboundedReceiver<()>,
    commands: mpsc::Receiver<Command>,
    state: ServerState,
    error_output: String,
    snapshots: watch::Sender<CoordinatorSnapshot>,
}

impl McpCoordinator {
    /// Build a coordinator and its handle. Nothing runs until
    /// [`run`](Self::run) is polled.
    #[must_use]
    pub fn new(config: &NotchConfig) -> (Self, CoordinatorHandle) {
        let (process, events) = ProcessManager::channel(config.server.clone());

        let (restart_tx, restarts) = mpsc::unbounded_channel();
        let monitor = CrashMonitor::new(&config.restart, move || {
            let _ = restart_tx.send(());
        });

        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (snapshots, snapshot_rx) = watch::channel(CoordinatorSnapshot::default());

        let coordinator = Self {
            process,
            events,
            stdout_framer: LineFramer::new(),
            stderr_framer: LineFramer::new(),
            parser: RpcParser::new(),
            tracker: ToolCallTracker::new(config.tracker.effective_limit()),
            monitor,
            restarts,
            commands,
            state: ServerState::Stopped,
            error_output: String::new(),
            snapshots,
        };

        let handle = CoordinatorHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };

        (coordinator, handle)
    }

    /// Build a coordinator and run it on a background task.
    #[must_use]
    pub fn spawn(config: &NotchConfig) -> CoordinatorHandle {
        let (coordinator, handle) = Self::new(config);
        tokio::spawn(coordinator.run());
        handle
    }

    /// Process commands, child output and restart requests until shutdown
    /// or until every handle is dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown(reply)) => {
                        self.stop().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.stop().await;
                        break;
                    }
                },
                Some(event) = self.events.recv() => self.handle_event(event).await,
                Some(()) = self.restarts.recv() => self.relaunch().await,
            }
        }
        tracing::debug!("Coordinator stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let result = self.start().await;
                let _ = reply.send(result);
            }
            Command::Stop(reply) => {
                self.stop().await;
                let _ = reply.send(());
            }
            Command::Restart(reply) => {
                self.stop().await;
                tokio::time::sleep(RESTART_PAUSE).await;
                let result = self.start().await;
                let _ = reply.send(result);
            }
            Command::SendLine(line, reply) => {
                let _ = reply.send(self.send_line(&line));
            }
            Command::Shutdown(reply) => {
                self.stop().await;
                let _ = reply.send(());
            }
        }
    }

    async fn start(&mut self) -> Result<(), ProcessError> {
        if self.state.is_active() {
            tracing::debug!(state = %self.state, "Start ignored, server is active");
            return Ok(());
        }
        self.monitor.reset();
        self.launch().await
    }

    /// Launch requested by the crash monitor. Keeps the attempt counter.
    async fn relaunch(&mut self) {
        if self.state.is_active() {
            tracing::debug!(state = %self.state, "Scheduled restart skipped");
            return;
        }
        tracing::info!(attempt = self.monitor.attempts(), "Restarting MCP server");
        if let Err(e) = self.launch().await {
            tracing::error!(error = %e, "Automatic restart failed");
        }
    }

    async fn launch(&mut self) -> Result<(), ProcessError> {
        self.set_state(ServerState::Starting);
        self.error_output.clear();
        self.tracker.clear();
        self.stdout_framer.reset();
        self.stderr_framer.reset();
        self.discard_stale_events();

        match self.process.launch().await {
            Ok(()) => {
                self.set_state(ServerState::Running);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to launch MCP server");
                self.set_state(ServerState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn stop(&mut self) {
        self.monitor.reset();
        // A restart that already fired but was not yet handled.
        while self.restarts.try_recv().is_ok() {}
        if !matches!(self.state, ServerState::Running | ServerState::Starting) {
            self.publish();
            return;
        }

        self.set_state(ServerState::Stopping);
        self.process.terminate().await;
        self.stdout_framer.reset();
        self.stderr_framer.reset();
        self.tracker.force_complete_all_active();
        self.set_state(ServerState::Stopped);
    }

    fn send_line(&mut self, line: &str) -> Result<(), ProcessError> {
        if !self.process.is_running() {
            return Err(ProcessError::NotRunning);
        }

        if let RpcMessage::Request(request) = self.parser.parse_str(line.trim_end()) {
            self.tracker.record_request(&request);
        }
        self.process.send_line(line)?;
        self.publish();
        Ok(())
    }

    /// Output left over from a run that is already gone.
    fn discard_stale_events(&mut self) {
        let mut discarded = 0usize;
        while self.events.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(discarded, "Dropped events of a previous run");
        }
    }

    async fn handle_event(&mut self, event: ProcessEvent) {
        // Output and exits of a run that was stopped or replaced.
        if self.process.active_generation() != Some(event.generation()) {
            tracing::debug!(generation = event.generation(), "Ignoring event of a stale run");
            return;
        }

        match event {
            ProcessEvent::Stdout { bytes, .. } => {
                for line in self.stdout_framer.feed(&bytes) {
                    self.handle_stdout_line(&line);
                }
            }
            ProcessEvent::Stderr { bytes, .. } => {
                append_capped(
                    &mut self.error_output,
                    &String::from_utf8_lossy(&bytes),
                    MAX_ERROR_OUTPUT_BYTES,
                );
                for line in self.stderr_framer.feed(&bytes) {
                    tracing::debug!(line = %line, "MCP stderr");
                    if let Some(event) = ToolEvent::parse_line(&line) {
                        self.tracker.apply_event(event);
                    }
                }
            }
            ProcessEvent::Terminated { generation, code } => {
                self.handle_termination(generation, code).await;
            }
        }
        self.publish();
    }

    fn handle_stdout_line(&mut self, line: &str) {
        match self.parser.parse_str(line) {
            RpcMessage::Request(request) => self.tracker.record_request(&request),
            RpcMessage::Response(response) => {
                if self.tracker.record_response(&response).is_none() {
                    tracing::trace!(id = %response.id, "Response without pending tool call");
                }
            }
            RpcMessage::Notification(notification) => {
                tracing::debug!(method = %notification.method, "Notification from MCP server");
            }
            RpcMessage::Invalid(raw) => {
                tracing::debug!(line = %String::from_utf8_lossy(&raw), "Unparseable stdout line");
            }
        }
    }

    async fn handle_termination(&mut self, generation: u64, code: i32) {
        tracing::debug!(generation, code, "Handling MCP process exit");
        self.process.terminate().await;
        self.stdout_framer.reset();
        self.stderr_framer.reset();
        self.tracker.force_complete_all_active();

        if code == 0 {
            tracing::info!("MCP server exited cleanly");
            self.set_state(ServerState::Stopped);
        } else {
            tracing::warn!(code, "MCP server crashed");
            self.set_state(ServerState::Crashed(format!("Exit code: {code}")));
        }
        self.monitor.handle_termination(code);
    }

    fn set_state(&mut self, state: ServerState) {
        if self.state != state {
            tracing::debug!(from = %self.state, to = %state, "State transition");
            self.state = state;
        }
        self.publish();
    }

    fn publish(&self) {
        let next = CoordinatorSnapshot {
            state: self.state.clone(),
            pid: self.process.pid(),
            recent_tool_calls: self.tracker.recent_tool_calls().iter().cloned().collect(),
            current_build_time: self.tracker.current_build_time(),
            last_build_result: self.tracker.last_build_result().cloned(),
            error_output: self.error_output.clone(),
            restart_attempts: self.monitor.attempts(),
            token_totals: self.tracker.token_totals(),
        };
        self.snapshots.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

/// Append `text`, then drop from the front until at most `cap` bytes remain.
fn append_capped(buffer: &mut String, text: &str, cap: usize) {
    buffer.push_str(text);
    if buffer.len() <= cap {
        return;
    }
    let mut cut = buffer.len() - cap;
    while !buffer.is_char_boundary(cut) {
        cut += 1;
    }
    buffer.drain(..cut);
}
