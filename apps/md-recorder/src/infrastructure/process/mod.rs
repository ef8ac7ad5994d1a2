//! Worker Process Adapters
//!
//! OS-level implementations of the supervision ports:
//!
//! - [`CommandLauncher`]: starts the worker as a child process
//! - [`ChildWorker`]: SIGTERM, bounded wait, SIGKILL on a tokio child
//! - [`ScheduleGate`]: trading-window check against exchange-local time

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use tokio::process::{Child, Command};

use crate::application::ports::{TradingGate, WorkerHandle, WorkerLauncher};
use crate::application::services::supervisor::SupervisorError;
use crate::domain::schedule::TradingSchedule;
use crate::domain::tick::exchange_offset;

/// Subcommand the supervisor passes to its own executable.
pub const WORKER_SUBCOMMAND: &str = "worker";

// =============================================================================
// Launcher
// =============================================================================

/// Launches worker processes from a fixed command line.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl CommandLauncher {
    /// Launch `program` with `args`.
    #[must_use]
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    /// Set an environment variable for every launched worker.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Launch the current executable in worker mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the current executable path cannot be resolved.
    pub fn current_exe() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, [WORKER_SUBCOMMAND]))
    }
}

impl WorkerLauncher for CommandLauncher {
    fn launch(&self) -> Result<Box<dyn WorkerHandle>, SupervisorError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(SupervisorError::Spawn)?;

        tracing::debug!(program = %self.program.display(), pid = ?child.id(), "Spawned worker process");
        Ok(Box::new(ChildWorker::new(child)))
    }
}

// =============================================================================
// Child Handle
// =============================================================================

/// Handle to a spawned worker process.
#[derive(Debug)]
pub struct ChildWorker {
    child: Child,
    pid: Option<u32>,
}

impl ChildWorker {
    /// Wrap a spawned child.
    #[must_use]
    pub fn new(child: Child) -> Self {
        let pid = child.id();
        Self { child, pid }
    }
}

#[async_trait]
impl WorkerHandle for ChildWorker {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                tracing::info!(pid = ?self.pid, %status, "Worker exited");
                true
            }
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(pid = ?self.pid, error = %e, "Failed to poll worker status");
                false
            }
        }
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> Result<(), SupervisorError> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let logged_pid = self.pid.unwrap_or_default();
        let pid = self
            .child
            .id()
            .and_then(|pid| i32::try_from(pid).ok())
            .ok_or_else(|| SupervisorError::SignalDeliveryFailure {
                pid: logged_pid,
                reason: "process already reaped".to_string(),
            })?;

        kill(Pid::from_raw(pid), Signal::SIGTERM).map_err(|errno| {
            SupervisorError::SignalDeliveryFailure {
                pid: logged_pid,
                reason: errno.to_string(),
            }
        })
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> Result<(), SupervisorError> {
        self.child
            .start_kill()
            .map_err(|e| SupervisorError::SignalDeliveryFailure {
                pid: self.pid.unwrap_or_default(),
                reason: e.to_string(),
            })
    }

    async fn wait_for_exit(&mut self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(pid = ?self.pid, %status, "Worker reaped");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(pid = ?self.pid, error = %e, "Failed to wait for worker");
                false
            }
            Err(_) => false,
        }
    }

    async fn force_kill(&mut self) -> Result<(), SupervisorError> {
        self.child.kill().await.map_err(SupervisorError::KillFailed)
    }
}

// =============================================================================
// Schedule Gate
// =============================================================================

/// Trading gate backed by a schedule evaluated in exchange-local time.
#[derive(Debug, Clone)]
pub struct ScheduleGate {
    schedule: TradingSchedule,
    offset: FixedOffset,
}

impl ScheduleGate {
    /// Gate on `schedule` in the exchange timezone (UTC+8).
    #[must_use]
    pub fn new(schedule: TradingSchedule) -> Self {
        Self {
            schedule,
            offset: exchange_offset(),
        }
    }

    /// Whether `now` falls inside a trading window.
    #[must_use]
    pub fn is_trading_at(&self, now: DateTime<Utc>) -> bool {
        self.schedule
            .is_trading(now.with_timezone(&self.offset).time())
    }

    /// The schedule being enforced.
    #[must_use]
    pub const fn schedule(&self) -> &TradingSchedule {
        &self.schedule
    }
}

impl TradingGate for ScheduleGate {
    fn is_trading(&self) -> bool {
        self.is_trading_at(Utc::now())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use test_case::test_case;

    use super::*;

    #[test_case(0, 30, true; "08:30 local opens day session")]
    #[test_case(7, 15, true; "15:15 local closes day session")]
    #[test_case(7, 16, false; "15:16 local is between sessions")]
    #[test_case(10, 0, false; "18:00 local")]
    #[test_case(12, 30, true; "20:30 local opens night session")]
    #[test_case(17, 0, true; "01:00 local night session")]
    #[test_case(18, 46, false; "02:46 local after night close")]
    fn gate_uses_exchange_time(utc_hour: u32, utc_minute: u32, expected: bool) {
        let gate = ScheduleGate::new(TradingSchedule::default());
        let now = Utc
            .with_ymd_and_hms(2025, 3, 3, utc_hour, utc_minute, 0)
            .unwrap();
        assert_eq!(gate.is_trading_at(now), expected);
    }

    #[tokio::test]
    async fn launch_failure_is_spawn_error() {
        let launcher = CommandLauncher::new("/nonexistent/md-recorder", [WORKER_SUBCOMMAND]);
        assert!(matches!(launcher.launch(), Err(SupervisorError::Spawn(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exited_child_is_detected() {
        let launcher = CommandLauncher::new("true", Vec::<String>::new());
        let mut worker = launcher.launch().unwrap();
        assert!(worker.id().is_some());

        assert!(worker.wait_for_exit(Duration::from_secs(5)).await);
        assert!(worker.has_exited());
        assert!(matches!(
            worker.terminate(),
            Err(SupervisorError::SignalDeliveryFailure { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launched_child_sees_configured_env() {
        let launcher = CommandLauncher::new(
            "sh",
            ["-c", r#"[ "$RECORDER_LAUNCH_CHECK" = yes ] && exec sleep 30"#],
        )
        .with_env("RECORDER_LAUNCH_CHECK", "yes");
        let mut worker = launcher.launch().unwrap();

        assert!(!worker.wait_for_exit(Duration::from_millis(300)).await);
        worker.terminate().unwrap();
        assert!(worker.wait_for_exit(Duration::from_secs(5)).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sigterm_stops_sleeping_child() {
        let launcher = CommandLauncher::new("sleep", ["30"]);
        let mut worker = launcher.launch().unwrap();
        assert!(!worker.has_exited());

        worker.terminate().unwrap();
        assert!(worker.wait_for_exit(Duration::from_secs(5)).await);
    }
}
