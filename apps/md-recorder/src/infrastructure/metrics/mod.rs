//! Prometheus Metrics Module
//!
//! Exposes recorder metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Ticks**: Canonical ticks emitted per exchange, pushes dropped per reason
//! - **Subscriptions**: Registered instrument count
//! - **Workers**: Spawns, shutdown outcomes, and whether a worker is running
//!
//! # Integration
//!
//! When a port is configured, the exporter serves `/metrics` on it. Without
//! an installed recorder every `record_*` call is a no-op.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics installation error.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The exporter could not be built (e.g. the port is taken).
    #[error("failed to build Prometheus exporter: {0}")]
    Build(#[from] BuildError),
    /// Another global recorder is already installed.
    #[error("a global metrics recorder is already installed")]
    RecorderAlreadySet,
}

/// Install the Prometheus recorder and serve it on `port`.
///
/// Calling this again returns the handle installed by the first call.
///
/// Must be called from within a Tokio runtime; the exporter runs as a task.
///
/// # Errors
///
/// Returns an error if the recorder or the HTTP listener cannot be installed.
pub fn init_metrics(port: u16) -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .build()?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|_| MetricsError::RecorderAlreadySet)?;
    tokio::spawn(exporter);

    register_metrics();
    tracing::info!(port, "Prometheus exporter listening");

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Tick counters
    describe_counter!(
        "md_recorder_ticks_emitted_total",
        "Canonical ticks emitted to the event bus"
    );
    describe_counter!(
        "md_recorder_ticks_dropped_total",
        "Raw pushes dropped by the normalizer"
    );

    describe_gauge!(
        "md_recorder_subscriptions",
        "Instruments registered for market data"
    );

    // Worker lifecycle
    describe_counter!(
        "md_recorder_worker_spawns_total",
        "Worker processes started by the supervisor"
    );
    describe_counter!(
        "md_recorder_worker_shutdowns_total",
        "Worker shutdowns by outcome"
    );
    describe_gauge!(
        "md_recorder_worker_running",
        "Whether the supervisor currently owns a worker (0/1)"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a tick emitted for an exchange.
pub fn record_tick_emitted(exchange: &'static str) {
    counter!("md_recorder_ticks_emitted_total", "exchange" => exchange).increment(1);
}

/// Record a dropped push.
pub fn record_tick_dropped(reason: &'static str) {
    counter!("md_recorder_ticks_dropped_total", "reason" => reason).increment(1);
}

/// Update the registered instrument count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("md_recorder_subscriptions").set(count as f64);
}

/// Record a worker spawn.
pub fn record_worker_spawn() {
    counter!("md_recorder_worker_spawns_total").increment(1);
}

/// Record a worker shutdown.
pub fn record_worker_shutdown(outcome: &'static str) {
    counter!("md_recorder_worker_shutdowns_total", "outcome" => outcome).increment(1);
}

/// Update whether a worker is running.
pub fn set_worker_running(running: bool) {
    gauge!("md_recorder_worker_running").set(if running { 1.0 } else { 0.0 });
}

// =============================================================================
// Tests
// =============================================================================
