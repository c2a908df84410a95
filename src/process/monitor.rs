//! Crash detection with exponential-backoff restarts.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::RestartConfig;

/// Callback invoked when a scheduled restart is due.
pub type RestartCallback = Arc<dyn Fn() + Send + Sync>;

/// Delay before the given restart attempt: 1s, 2s, 4s, 8s, ...
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    Duration::from_secs(1u64 << exponent)
}

/// Schedules restarts after abnormal exits.
///
/// At most one restart is pending at a time; scheduling a new one cancels
/// the previous. Restarts stop once `max_attempts` is reached until
/// [`reset`](Self::reset) is called.
pub struct CrashMonitor {
    max_attempts: u32,
    auto_restart: bool,
    attempts: u32,
    last_crash_time: Option<DateTime<Utc>>,
    pending: Option<CancellationToken>,
    on_restart: RestartCallback,
}

impl std::fmt::Debug for CrashMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashMonitor")
            .field("max_attempts", &self.max_attempts)
            .field("auto_restart", &self.auto_restart)
            .field("attempts", &self.attempts)
            .field("last_crash_time", &self.last_crash_time)
            .field("pending", &self.has_pending_restart())
            .finish_non_exhaustive()
    }
}

impl CrashMonitor {
    /// Create a monitor that calls `on_restart` when a restart is due.
    #[must_use]
    pub fn new(config: &RestartConfig, on_restart: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            max_attempts: config.max_attempts,
            auto_restart: config.auto_restart,
            attempts: 0,
            last_crash_time: None,
            pending: None,
            on_restart: Arc::new(on_restart),
        }
    }

    /// React to a process exit.
    ///
    /// Returns the delay of the restart that was scheduled, if any. Must be
    /// called from within a tokio runtime.
    pub fn handle_termination(&mut self, code: i32) -> Option<Duration> {
        if code == 0 {
            self.reset();
            return None;
        }

        self.last_crash_time = Some(Utc::now());

        if !self.auto_restart {
            tracing::debug!(code, "Auto-restart disabled");
            return None;
        }

        if self.attempts >= self.max_attempts {
            tracing::warn!(
                code,
                attempts = self.attempts,
                max = self.max_attempts,
                "Restart limit reached, giving up"
            );
            return None;
        }

        self.attempts += 1;
        let delay = backoff_delay(self.attempts);
        self.schedule(delay);

        tracing::info!(
            code,
            attempt = self.attempts,
            max = self.max_attempts,
            delay_secs = delay.as_secs(),
            "Scheduling MCP server restart"
        );

        Some(delay)
    }

    fn schedule(&mut self, delay: Duration) {
        self.cancel_pending_restart();

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let on_restart = Arc::clone(&self.on_restart);

        tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {
                    tracing::debug!("Pending restart cancelled");
                }
                () = tokio::time::sleep(delay) => on_restart(),
            }
        });

        self.pending = Some(token);
    }

    /// Zero the attempt counter and cancel any pending restart.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_crash_time = None;
        self.cancel_pending_restart();
    }

    /// Cancel a pending restart without touching the counter.
    pub fn cancel_pending_restart(&mut self) {
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
    }

    /// Restart attempts since the last reset.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// When the last abnormal exit was seen.
    #[must_use]
    pub fn last_crash_time(&self) -> Option<DateTime<Utc>> {
        self.last_crash_time
    }

    /// Whether another automatic restart is allowed.
    #[must_use]
    pub fn can_restart(&self) -> bool {
        self.auto_restart && self.attempts < self.max_attempts
    }

    /// Whether a restart is scheduled and not yet fired or cancelled.
    #[must_use]
    pub fn has_pending_restart(&self) -> bool {
        self.pending.as_ref().is_some_and(|t| !t.is_cancelled())
    }
}

impl Drop for CrashMonitor {
    fn drop(&mut self) {
        self.cancel_pending_restart();
    }
}
