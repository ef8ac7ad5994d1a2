#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::panic
    )
)]

//! Market Data Recorder - Futures Tick Gateway
//!
//! Connects to a futures market data front, normalizes raw depth pushes into
//! canonical ticks, and runs the connection in a worker process that a
//! supervisor keeps alive only during trading windows.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and logic
//!   - `address`: Front address template expansion
//!   - `tick`: Raw pushes, canonical ticks, exchanges
//!   - `subscription`: Subscribe requests and the symbol/exchange registry
//!   - `schedule`: Trading windows
//!   - `event`: Topic-addressed events
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Feed session, event emitter, worker process interfaces
//!   - `services`: Normalizer, connector, supervisor, recorder worker
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Replay feed session
//!   - `broadcast`: Event bus
//!   - `process`: Child process launcher and schedule gate
//!   - `config`: Environment and gateway settings
//!   - `metrics` / `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//!                        supervisor process
//!   ScheduleGate ──► ProcessSupervisor ──spawn/SIGTERM/SIGKILL──┐
//!                                                               │
//!                        worker process                         ▼
//!   FeedSession ──push──► TickPipeline ──► EventBus ──► eTick.<vt_symbol>
//!        ▲                    │                     └─► eLog
//!        │              SymbolExchangeRegistry
//!        └── MarketDataConnector::subscribe ──┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::address::{AddressError, Endpoint, expand};
pub use domain::event::{EVENT_LOG, EVENT_TICK, Event, EventPayload, LogRecord};
pub use domain::schedule::{TradingSchedule, TradingWindow};
pub use domain::subscription::{SubscribeRequest, SymbolExchangeRegistry};
pub use domain::tick::{CanonicalTick, Exchange, QuoteLevel, RawTick};

// Application services
pub use application::services::{
    ConnectSettings, ConnectorError, DroppedTick, MarketDataConnector, ProcessSupervisor,
    RecorderError, RecorderWorker, ShutdownOutcome, SupervisorConfig, SupervisorError,
    SupervisorState, TickNormalizer, TickPipeline, Transition,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, GatewaySettings, RecorderConfig};

// Adapters (for integration tests)
pub use infrastructure::broadcast::{EventBus, TopicReceiver};
pub use infrastructure::feed::ReplaySession;
pub use infrastructure::process::{ChildWorker, CommandLauncher, ScheduleGate};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
