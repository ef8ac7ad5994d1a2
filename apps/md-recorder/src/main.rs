//! Market Data Recorder Binary
//!
//! Runs either the trading-window supervisor or the recording worker it
//! spawns.
//!
//! # Usage
//!
//! ```bash
//! md-recorder supervise   # default; spawns `md-recorder worker` in trading hours
//! md-recorder worker      # connect, subscribe and record until SIGTERM
//! ```
//!
//! # Environment Variables
//!
//! ## Worker
//! - `RECORDER_GATEWAY_SETTINGS`: Gateway JSON file (default: connect_ctp.json)
//! - `RECORDER_FEED_REPLAY`: Replay file of raw pushes (required)
//! - `RECORDER_REPLAY_PACE_MS`: Delay between replayed pushes (default: 0)
//! - `RECORDER_SYMBOLS`: vt-symbols to record (default: au2504.SHFE,sc2504.INE)
//! - `RECORDER_LOGIN_TIMEOUT_SECS`: Login wait (default: 20)
//! - `RECORDER_EVENT_CAPACITY`: Event bus capacity (default: 4096)
//!
//! ## Supervisor
//! - `RECORDER_TRADING_WINDOWS`: Windows in UTC+8 (default: 08:30-15:15,20:30-02:45)
//! - `RECORDER_POLL_INTERVAL_SECS`: Schedule poll interval (default: 5)
//! - `RECORDER_GRACE_PERIOD_SECS`: SIGTERM grace period (default: 30)
//!
//! ## Both
//! - `RECORDER_METRICS_PORT`: Prometheus port (default: 0 = disabled)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: md-recorder-supervisor / md-recorder-worker)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use md_recorder::application::ports::EventEmitter;
use md_recorder::infrastructure::broadcast::{EventBus, TopicReceiver};
use md_recorder::infrastructure::config::{GatewaySettings, RecorderConfig};
use md_recorder::infrastructure::feed::ReplaySession;
use md_recorder::infrastructure::process::{CommandLauncher, ScheduleGate};
use md_recorder::infrastructure::telemetry::{self, SUPERVISOR_SERVICE_NAME, WORKER_SERVICE_NAME};
use md_recorder::{
    EventPayload, MarketDataConnector, ProcessSupervisor, RecorderWorker, SymbolExchangeRegistry,
    TickNormalizer, TickPipeline, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Gateway name stamped on every tick.
const GATEWAY_NAME: &str = "CTP";

#[derive(Debug, Parser)]
#[command(name = "md-recorder", version, about)]
struct Cli {
    #[command(subcommand)]
    role: Option<Role>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Role {
    /// Start and stop the worker according to the trading schedule.
    Supervise,
    /// Record market data until terminated.
    Worker,
}

impl Role {
    const fn service_name(self) -> &'static str {
        match self {
            Self::Supervise => SUPERVISOR_SERVICE_NAME,
            Self::Worker => WORKER_SERVICE_NAME,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let role = Cli::parse().role.unwrap_or(Role::Supervise);

    // Installed before any startup work so an early SIGTERM is not lost.
    let shutdown = install_shutdown_handler();

    load_dotenv();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let _telemetry_guard = telemetry::init(role.service_name());

    let config = RecorderConfig::from_env()?;
    log_config(role, &config);

    if config.metrics_port != 0
        && let Err(e) = init_metrics(config.metrics_port)
    {
        tracing::warn!(error = %e, port = config.metrics_port, "Metrics disabled");
    }

    match role {
        Role::Supervise => run_supervisor(config, shutdown).await,
        Role::Worker => run_worker(config, shutdown).await,
    }
}

async fn run_supervisor(
    config: RecorderConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let launcher = CommandLauncher::current_exe().context("resolving worker executable")?;
    let gate = ScheduleGate::new(config.schedule);
    let mut supervisor = ProcessSupervisor::new(gate, launcher, config.supervisor);

    supervisor.run(shutdown).await;
    Ok(())
}

async fn run_worker(config: RecorderConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let settings = GatewaySettings::load(&config.gateway_settings)?;
    let connect = settings.connect_settings();
    let replay_path = config.replay_path()?.to_path_buf();

    let bus = Arc::new(EventBus::new(config.event_capacity));
    let registry = Arc::new(SymbolExchangeRegistry::new());

    let listener = tokio::spawn(log_events(bus.subscribe(""), shutdown.clone()));

    let pipeline = Arc::new(TickPipeline::new(
        TickNormalizer::new(GATEWAY_NAME),
        Arc::clone(&registry),
        Arc::clone(&bus) as Arc<dyn EventEmitter>,
    ));
    let session = Arc::new(ReplaySession::new(replay_path, pipeline).with_pace(config.replay.pace));
    let connector = Arc::new(MarketDataConnector::new(session, registry));
    let worker = Arc::new(RecorderWorker::new(
        connector,
        bus as Arc<dyn EventEmitter>,
        config.symbols,
        config.login_timeout,
    ));

    let started = tokio::select! {
        result = worker.start(&connect) => result,
        () = shutdown.cancelled() => Ok(()),
    };

    match &started {
        Ok(()) => {
            tracing::info!("Recorder running");
            shutdown.cancelled().await;
        }
        Err(e) => tracing::error!(error = %e, "Recorder failed to start"),
    }

    let closing = Arc::clone(&worker);
    tokio::task::spawn_blocking(move || closing.shutdown())
        .await
        .context("closing market data session")?;

    shutdown.cancel();
    let _ = listener.await;

    tracing::info!("Recorder stopped");
    started.map_err(Into::into)
}

/// Log every event on the bus until shutdown.
async fn log_events(mut rx: TopicReceiver, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => {
                    if let EventPayload::Tick(tick) = &event.payload {
                        tracing::info!(
                            topic = %event.topic,
                            datetime = %tick.datetime,
                            last_price = %tick.last_price,
                            volume = tick.volume,
                            "Tick"
                        );
                    }
                }
                None => break,
            },
        }
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(role: Role, config: &RecorderConfig) {
    let symbols: Vec<String> = config.symbols.iter().map(ToString::to_string).collect();
    tracing::info!(
        role = ?role,
        gateway_settings = %config.gateway_settings.display(),
        symbols = ?symbols,
        trading_windows = %config.schedule,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        poll_secs = config.supervisor.poll_interval.as_secs(),
        grace_secs = config.supervisor.grace_period.as_secs(),
        login_timeout_secs = config.login_timeout.as_secs(),
        replay = ?config.replay.path,
        "Timing"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Install SIGTERM and SIGINT handlers.
///
/// The returned token is cancelled on the first signal received.
#[allow(clippy::expect_used)]
fn install_shutdown_handler() -> CancellationToken {
    let shutdown_token = CancellationToken::new();
    let token = shutdown_token.clone();

    #[cfg(unix)]
    {
        use signal::unix::SignalKind;

        let mut terminate = signal::unix::signal(SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown");
        let mut interrupt = signal::unix::signal(SignalKind::interrupt())
            .expect("SIGINT handler installation is critical for graceful shutdown");

        tokio::spawn(async move {
            tokio::select! {
                _ = terminate.recv() => {
                    tracing::info!("Received SIGTERM, initiating shutdown");
                }
                _ = interrupt.recv() => {
                    tracing::info!("Received SIGINT, initiating shutdown");
                }
            }
            token.cancel();
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
        tracing::info!("Received Ctrl+C, initiating shutdown");
        token.cancel();
    });

    shutdown_token
}
