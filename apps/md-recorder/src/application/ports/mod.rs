//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedSession`: The vendor market data session (fronts, login, subscribe)
//! - `EventEmitter`: Publishes ticks and log lines to the event bus
//! - `WorkerLauncher` / `WorkerHandle`: Spawn and signal the worker process
//!
//! ## Driver Ports (Inbound)
//!
//! - `PushSink`: Receives raw depth pushes from the feed session
//! - `TradingGate`: Tells the supervisor whether a worker should be alive

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::application::services::supervisor::SupervisorError;
use crate::domain::address::Endpoint;
use crate::domain::event::EventPayload;
use crate::domain::tick::RawTick;

// =============================================================================
// Feed Session
// =============================================================================

/// Login credentials handed to the feed session on `init`.
#[derive(Clone)]
pub struct SessionCredentials {
    /// Investor / user id.
    pub user_id: String,
    /// Password.
    pub password: String,
    /// Broker id.
    pub broker_id: String,
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("user_id", &self.user_id)
            .field("password", &"[REDACTED]")
            .field("broker_id", &self.broker_id)
            .finish()
    }
}

/// Errors raised by a feed session.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// `init` was called before any endpoint was registered.
    #[error("no endpoints registered")]
    NoEndpoints,
    /// The operation requires a logged-in session.
    #[error("feed session is not logged in")]
    NotLoggedIn,
    /// The feed source could not be reached or opened.
    #[error("feed unavailable: {0}")]
    Unavailable(String),
}

/// Vendor market data session.
///
/// Implementations own the connection and the inbound push thread, and
/// deliver every push to the [`PushSink`] they were constructed with.
pub trait FeedSession: Send + Sync {
    /// Register one candidate front before `init`. The session decides which
    /// endpoint wins the first working connection.
    fn register_endpoint(&self, endpoint: &Endpoint);

    /// Begin connecting with the registered endpoints and log in.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] if the session cannot start.
    fn init(&self, credentials: &SessionCredentials) -> Result<(), FeedError>;

    /// Whether login has completed.
    fn is_logged_in(&self) -> bool;

    /// Request pushes for a symbol. Only valid once logged in.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::NotLoggedIn`] before login completes.
    fn subscribe_market_data(&self, symbol: &str) -> Result<(), FeedError>;

    /// Close the session. Must tolerate being called more than once.
    fn close(&self);
}

/// Receives raw depth pushes from a feed session.
pub trait PushSink: Send + Sync {
    /// Handle one market update.
    fn on_push(&self, raw: RawTick);
}

// =============================================================================
// Event Emission
// =============================================================================

/// Publishes events by topic.
pub trait EventEmitter: Send + Sync {
    /// Emit a payload on a topic.
    fn emit(&self, topic: &str, payload: EventPayload);
}

// =============================================================================
// Process Supervision
// =============================================================================

/// Decides whether the worker should currently be alive.
pub trait TradingGate: Send + Sync {
    /// Whether now falls inside a trading window.
    fn is_trading(&self) -> bool;
}

/// Starts worker processes.
pub trait WorkerLauncher: Send + Sync {
    /// Spawn a new worker.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Spawn`] if the process cannot be started.
    fn launch(&self) -> Result<Box<dyn WorkerHandle>, SupervisorError>;
}

/// A running worker process.
#[async_trait]
pub trait WorkerHandle: Send {
    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Whether the process has already exited (reaping it if so).
    fn has_exited(&mut self) -> bool;

    /// Send the cooperative termination signal.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::SignalDeliveryFailure`] if the signal
    /// cannot be delivered.
    fn terminate(&mut self) -> Result<(), SupervisorError>;

    /// Wait up to `timeout` for the process to exit. Returns `true` if it did.
    async fn wait_for_exit(&mut self, timeout: Duration) -> bool;

    /// Forcefully terminate the process and wait for it unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::KillFailed`] if the kill cannot be issued.
    async fn force_kill(&mut self) -> Result<(), SupervisorError>;
}
