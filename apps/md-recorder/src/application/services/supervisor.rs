//! Process Supervisor
//!
//! Keeps exactly one worker process alive while the trading gate is open and
//! none while it is closed. Polls on a fixed interval; each poll is one
//! transition of a two-state machine:
//!
//! ```text
//!              trading / launch
//!   NoWorker ─────────────────────▶ Running
//!      ▲                              │
//!      │  not trading / SIGTERM,      │ trading / no-op
//!      │  wait grace, then SIGKILL    │
//!      └──────────────────────────────┘
//! ```
//!
//! A worker that exits on its own is reaped and the state falls back to
//! `NoWorker`; the next poll inside a window starts a fresh one.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{TradingGate, WorkerHandle, WorkerLauncher};
use crate::infrastructure::metrics;

/// Default time between schedule checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default time a worker gets to exit after SIGTERM.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

// =============================================================================
// Errors
// =============================================================================

/// Supervisor errors. All of them are absorbed by the escalation policy;
/// they surface only in logs.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The worker process could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// The termination signal could not be delivered.
    #[error("failed to signal worker {pid}: {reason}")]
    SignalDeliveryFailure {
        /// Worker process id.
        pid: u32,
        /// OS error text.
        reason: String,
    },

    /// The worker ignored SIGTERM for the whole grace period.
    #[error("worker {pid} did not exit within {grace:?}")]
    WorkerUnresponsive {
        /// Worker process id.
        pid: u32,
        /// Grace period that elapsed.
        grace: Duration,
    },

    /// The forced kill could not be issued.
    #[error("failed to kill worker: {0}")]
    KillFailed(#[source] std::io::Error),
}

// =============================================================================
// Configuration and State
// =============================================================================

/// Supervisor timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Time between polls.
    pub poll_interval: Duration,
    /// Time a worker gets to exit after SIGTERM before it is killed.
    pub grace_period: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Whether a worker is currently owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No worker process.
    NoWorker,
    /// A worker process is running.
    Running,
}

/// How a worker was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Exited within the grace period after SIGTERM.
    Graceful,
    /// Killed after the grace period elapsed.
    Forced,
    /// SIGTERM could not be delivered; the worker is treated as gone.
    AlreadyExited,
}

impl ShutdownOutcome {
    /// Metric label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Graceful => "graceful",
            Self::Forced => "forced",
            Self::AlreadyExited => "already_exited",
        }
    }
}

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Outside trading hours with no worker.
    Idle,
    /// A worker was started.
    Spawned {
        /// Process id of the new worker.
        pid: Option<u32>,
    },
    /// Launch failed; retried on the next poll.
    SpawnFailed,
    /// Inside trading hours with a live worker.
    StillRunning,
    /// The worker exited on its own and was reaped.
    WorkerLost,
    /// The worker was stopped because trading hours ended.
    Stopped(ShutdownOutcome),
}

// =============================================================================
// Supervisor
// =============================================================================

/// Trading-window process supervisor.
pub struct ProcessSupervisor<G, L> {
    gate: G,
    launcher: L,
    config: SupervisorConfig,
    worker: Option<Box<dyn WorkerHandle>>,
}

impl<G: TradingGate, L: WorkerLauncher> ProcessSupervisor<G, L> {
    /// Create a supervisor with no worker.
    pub const fn new(gate: G, launcher: L, config: SupervisorConfig) -> Self {
        Self {
            gate,
            launcher,
            config,
            worker: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SupervisorState {
        if self.worker.is_some() {
            SupervisorState::Running
        } else {
            SupervisorState::NoWorker
        }
    }

    /// Run one poll.
    pub async fn tick(&mut self) -> Transition {
        if let Some(worker) = self.worker.as_mut()
            && worker.has_exited()
        {
            let pid = worker.id();
            self.worker = None;
            metrics::set_worker_running(false);
            tracing::warn!(?pid, "Worker exited unexpectedly");
            return Transition::WorkerLost;
        }

        match (self.worker.is_some(), self.gate.is_trading()) {
            (false, false) => Transition::Idle,
            (false, true) => self.spawn(),
            (true, true) => Transition::StillRunning,
            (true, false) => {
                tracing::info!("Trading window closed, stopping worker");
                self.stop_worker()
                    .await
                    .map_or(Transition::Idle, Transition::Stopped)
            }
        }
    }

    /// Stop the current worker, if any.
    ///
    /// The handle is taken out of the supervisor first, so a worker is
    /// never shut down twice.
    pub async fn stop_worker(&mut self) -> Option<ShutdownOutcome> {
        let mut worker = self.worker.take()?;
        let outcome = shutdown(worker.as_mut(), self.config.grace_period).await;

        metrics::record_worker_shutdown(outcome.as_str());
        metrics::set_worker_running(false);
        Some(outcome)
    }

    /// Poll until `cancel` fires, then stop the worker.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_secs = self.config.poll_interval.as_secs_f64(),
            grace_secs = self.config.grace_period.as_secs_f64(),
            "Supervisor started"
        );

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let transition = self.tick().await;
                    tracing::debug!(?transition, state = ?self.state(), "Poll complete");
                }
            }
        }

        if let Some(outcome) = self.stop_worker().await {
            tracing::info!(outcome = outcome.as_str(), "Worker stopped on supervisor shutdown");
        }
        tracing::info!("Supervisor stopped");
    }

    fn spawn(&mut self) -> Transition {
        match self.launcher.launch() {
            Ok(worker) => {
                let pid = worker.id();
                self.worker = Some(worker);
                metrics::record_worker_spawn();
                metrics::set_worker_running(true);
                tracing::info!(?pid, "Worker started");
                Transition::Spawned { pid }
            }
            Err(e) => {
                tracing::error!(error = %e, "Worker launch failed, retrying next poll");
                Transition::SpawnFailed
            }
        }
    }
}

/// SIGTERM, wait out the grace period, then SIGKILL.
async fn shutdown(worker: &mut dyn WorkerHandle, grace: Duration) -> ShutdownOutcome {
    let pid = worker.id().unwrap_or_default();

    if let Err(e) = worker.terminate() {
        tracing::warn!(pid, error = %e, "Treating worker as stopped");
        return ShutdownOutcome::AlreadyExited;
    }

    if worker.wait_for_exit(grace).await {
        tracing::info!(pid, "Worker exited gracefully");
        return ShutdownOutcome::Graceful;
    }

    let unresponsive = SupervisorError::WorkerUnresponsive { pid, grace };
    tracing::warn!(error = %unresponsive, "Escalating to SIGKILL");

    if let Err(e) = worker.force_kill().await {
        tracing::error!(pid, error = %e, "Forced kill failed");
    }
    ShutdownOutcome::Forced
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    #[derive(Clone, Default)]
    struct Gate(Arc<AtomicBool>);

    impl Gate {
        fn set(&self, open: bool) {
            self.0.store(open, Ordering::SeqCst);
        }
    }

    impl TradingGate for Gate {
        fn is_trading(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct Counters {
        launches: AtomicUsize,
        terminates: AtomicUsize,
        kills: AtomicUsize,
        fail_launch: AtomicBool,
        ignore_sigterm: AtomicBool,
        sigterm_fails: AtomicBool,
        exited: AtomicBool,
    }

    #[derive(Clone, Default)]
    struct Launcher(Arc<Counters>);

    struct Worker {
        pid: u32,
        counters: Arc<Counters>,
        terminated: bool,
    }

    impl WorkerLauncher for Launcher {
        fn launch(&self) -> Result<Box<dyn WorkerHandle>, SupervisorError> {
            if self.0.fail_launch.load(Ordering::SeqCst) {
                return Err(SupervisorError::Spawn(std::io::Error::other("no such binary")));
            }
            let n = self.0.launches.fetch_add(1, Ordering::SeqCst);
            self.0.exited.store(false, Ordering::SeqCst);
            Ok(Box::new(Worker {
                pid: 1000 + u32::try_from(n).unwrap(),
                counters: Arc::clone(&self.0),
                terminated: false,
            }))
        }
    }

    #[async_trait]
    impl WorkerHandle for Worker {
        fn id(&self) -> Option<u32> {
            Some(self.pid)
        }

        fn has_exited(&mut self) -> bool {
            self.counters.exited.load(Ordering::SeqCst)
        }

        fn terminate(&mut self) -> Result<(), SupervisorError> {
            self.counters.terminates.fetch_add(1, Ordering::SeqCst);
            if self.counters.sigterm_fails.load(Ordering::SeqCst) {
                return Err(SupervisorError::SignalDeliveryFailure {
                    pid: self.pid,
                    reason: "ESRCH".to_string(),
                });
            }
            self.terminated = true;
            Ok(())
        }

        async fn wait_for_exit(&mut self, _timeout: Duration) -> bool {
            self.terminated && !self.counters.ignore_sigterm.load(Ordering::SeqCst)
        }

        async fn force_kill(&mut self) -> Result<(), SupervisorError> {
            self.counters.kills.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn supervisor() -> (Gate, Arc<Counters>, ProcessSupervisor<Gate, Launcher>) {
        let gate = Gate::default();
        let launcher = Launcher::default();
        let counters = Arc::clone(&launcher.0);
        let config = SupervisorConfig {
            poll_interval: Duration::from_millis(10),
            grace_period: Duration::from_millis(10),
        };
        (gate.clone(), counters, ProcessSupervisor::new(gate, launcher, config))
    }

    #[test]
    fn default_config() {
        let config = SupervisorConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.grace_period, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn idle_outside_trading_hours() {
        let (_gate, counters, mut sup) = supervisor();
        assert_eq!(sup.tick().await, Transition::Idle);
        assert_eq!(sup.state(), SupervisorState::NoWorker);
        assert_eq!(counters.launches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn spawns_exactly_once_while_trading() {
        let (gate, counters, mut sup) = supervisor();
        gate.set(true);

        assert_eq!(sup.tick().await, Transition::Spawned { pid: Some(1000) });
        for _ in 0..5 {
            assert_eq!(sup.tick().await, Transition::StillRunning);
        }
        assert_eq!(sup.state(), SupervisorState::Running);
        assert_eq!(counters.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn graceful_stop_when_window_closes() {
        let (gate, counters, mut sup) = supervisor();
        gate.set(true);
        sup.tick().await;

        gate.set(false);
        assert_eq!(
            sup.tick().await,
            Transition::Stopped(ShutdownOutcome::Graceful)
        );
        assert_eq!(sup.state(), SupervisorState::NoWorker);
        assert_eq!(counters.terminates.load(Ordering::SeqCst), 1);
        assert_eq!(counters.kills.load(Ordering::SeqCst), 0);

        assert_eq!(sup.tick().await, Transition::Idle);
        assert_eq!(counters.terminates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unresponsive_worker_is_killed_exactly_once() {
        let (gate, counters, mut sup) = supervisor();
        counters.ignore_sigterm.store(true, Ordering::SeqCst);
        gate.set(true);
        sup.tick().await;

        gate.set(false);
        assert_eq!(sup.tick().await, Transition::Stopped(ShutdownOutcome::Forced));
        assert_eq!(sup.tick().await, Transition::Idle);
        assert_eq!(counters.terminates.load(Ordering::SeqCst), 1);
        assert_eq!(counters.kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn signal_failure_is_treated_as_stopped() {
        let (gate, counters, mut sup) = supervisor();
        counters.sigterm_fails.store(true, Ordering::SeqCst);
        gate.set(true);
        sup.tick().await;

        gate.set(false);
        assert_eq!(
            sup.tick().await,
            Transition::Stopped(ShutdownOutcome::AlreadyExited)
        );
        assert_eq!(sup.state(), SupervisorState::NoWorker);
        assert_eq!(counters.kills.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn spawn_failure_retries_next_poll() {
        let (gate, counters, mut sup) = supervisor();
        counters.fail_launch.store(true, Ordering::SeqCst);
        gate.set(true);

        assert_eq!(sup.tick().await, Transition::SpawnFailed);
        assert_eq!(sup.state(), SupervisorState::NoWorker);

        counters.fail_launch.store(false, Ordering::SeqCst);
        assert!(matches!(sup.tick().await, Transition::Spawned { .. }));
    }

    #[tokio::test]
    async fn lost_worker_is_reaped_and_respawned() {
        let (gate, counters, mut sup) = supervisor();
        gate.set(true);
        sup.tick().await;

        counters.exited.store(true, Ordering::SeqCst);
        assert_eq!(sup.tick().await, Transition::WorkerLost);
        assert_eq!(sup.state(), SupervisorState::NoWorker);

        assert_eq!(sup.tick().await, Transition::Spawned { pid: Some(1001) });
        assert_eq!(counters.launches.load(Ordering::SeqCst), 2);
        assert_eq!(counters.terminates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn lost_worker_outside_window_is_not_respawned() {
        let (gate, counters, mut sup) = supervisor();
        gate.set(true);
        sup.tick().await;

        counters.exited.store(true, Ordering::SeqCst);
        gate.set(false);
        assert_eq!(sup.tick().await, Transition::WorkerLost);
        assert_eq!(sup.tick().await, Transition::Idle);
        assert_eq!(counters.terminates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stop_without_worker_is_noop() {
        let (_gate, counters, mut sup) = supervisor();
        assert_eq!(sup.stop_worker().await, None);
        assert_eq!(counters.terminates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_stops_worker_on_cancel() {
        let (gate, counters, mut sup) = supervisor();
        gate.set(true);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(60)).await;
            trigger.cancel();
        });

        sup.run(cancel).await;

        assert_eq!(sup.state(), SupervisorState::NoWorker);
        assert_eq!(counters.launches.load(Ordering::SeqCst), 1);
        assert_eq!(counters.terminates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(ShutdownOutcome::Graceful.as_str(), "graceful");
        assert_eq!(ShutdownOutcome::Forced.as_str(), "forced");
        assert_eq!(ShutdownOutcome::AlreadyExited.as_str(), "already_exited");
    }
}
