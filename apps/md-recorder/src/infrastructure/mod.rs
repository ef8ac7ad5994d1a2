//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Event bus over tokio broadcast channels.
pub mod broadcast;

/// Environment configuration and gateway settings file.
pub mod config;

/// Feed session adapters.
pub mod feed;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Worker process launching, signalling, and schedule gating.
pub mod process;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
