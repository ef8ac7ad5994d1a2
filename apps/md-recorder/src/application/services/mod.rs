//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `TickNormalizer`: Raw push to canonical tick, or a drop reason
//! - `MarketDataConnector` / `TickPipeline`: Session lifecycle and push path
//! - `ProcessSupervisor`: Trading-window worker lifecycle
//! - `RecorderWorker`: The application run inside the worker process

pub mod connector;
pub mod normalizer;
pub mod recorder;
pub mod supervisor;

pub use connector::{ConnectSettings, ConnectorError, MarketDataConnector, TickPipeline};
pub use normalizer::{DroppedTick, PriceAdjuster, TickNormalizer, adjust_price};
pub use recorder::{RecorderError, RecorderWorker};
pub use supervisor::{
    ProcessSupervisor, ShutdownOutcome, SupervisorConfig, SupervisorError, SupervisorState,
    Transition,
};
