//! Market Data Connector
//!
//! Owns the lifecycle of one feed session: resolves front addresses,
//! connects exactly once, records subscriptions in the shared registry and
//! forwards them, and closes idempotently.
//!
//! The push path lives in [`TickPipeline`], which the feed session calls on
//! its own thread for every depth update.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;

use crate::application::ports::{
    EventEmitter, FeedError, FeedSession, PushSink, SessionCredentials,
};
use crate::application::services::normalizer::{DroppedTick, TickNormalizer};
use crate::domain::address::{self, AddressError, Endpoint};
use crate::domain::event::{EventPayload, tick_topic};
use crate::domain::subscription::{SubscribeRequest, SymbolExchangeRegistry};
use crate::domain::tick::RawTick;
use crate::infrastructure::metrics;

// =============================================================================
// Errors
// =============================================================================

/// Connector errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// `connect` was called on a session that is already connected.
    #[error("session is already connected")]
    DuplicateConnectAttempt,
    /// The connector has been closed and cannot be reused.
    #[error("session has been closed")]
    SessionClosed,
    /// Subscriptions are only accepted after login.
    #[error("cannot subscribe {symbol} before login")]
    NotLoggedIn {
        /// Symbol that was requested.
        symbol: String,
    },
    /// A front address template could not be expanded.
    #[error("malformed address template: {0}")]
    MalformedAddressTemplate(#[from] AddressError),
    /// The feed session rejected the operation.
    #[error(transparent)]
    Feed(#[from] FeedError),
}

// =============================================================================
// Connect Settings
// =============================================================================

/// Everything `connect` needs.
#[derive(Debug, Clone)]
pub struct ConnectSettings {
    /// Trading front template. Validated only; the order side is disabled.
    pub trading_server: String,
    /// Market data front template.
    pub market_data_server: String,
    /// Login credentials.
    pub credentials: SessionCredentials,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectStatus {
    Idle,
    Connected,
    Closed,
}

// =============================================================================
// Connector
// =============================================================================

/// Single-use market data connection.
pub struct MarketDataConnector {
    session: Arc<dyn FeedSession>,
    registry: Arc<SymbolExchangeRegistry>,
    status: Mutex<ConnectStatus>,
}

impl MarketDataConnector {
    /// Create a connector over a session. The registry must be the same one
    /// the session's [`TickPipeline`] reads.
    #[must_use]
    pub fn new(session: Arc<dyn FeedSession>, registry: Arc<SymbolExchangeRegistry>) -> Self {
        Self {
            session,
            registry,
            status: Mutex::new(ConnectStatus::Idle),
        }
    }

    /// Expand both front templates, register the market data endpoints in
    /// order and start the session.
    ///
    /// Returns the registered market data endpoints.
    ///
    /// # Errors
    ///
    /// - [`ConnectorError::DuplicateConnectAttempt`] if already connected;
    ///   the session is not touched.
    /// - [`ConnectorError::SessionClosed`] after [`close`](Self::close).
    /// - [`ConnectorError::MalformedAddressTemplate`] if either template is bad.
    /// - [`ConnectorError::Feed`] if the session fails to start.
    pub fn connect(&self, settings: &ConnectSettings) -> Result<Vec<Endpoint>, ConnectorError> {
        let mut status = self.status.lock();
        match *status {
            ConnectStatus::Connected => return Err(ConnectorError::DuplicateConnectAttempt),
            ConnectStatus::Closed => return Err(ConnectorError::SessionClosed),
            ConnectStatus::Idle => {}
        }

        let trading = address::expand(&settings.trading_server)?;
        let market_data = address::expand(&settings.market_data_server)?;

        tracing::info!(
            fronts = trading.len(),
            first = ?trading.first().map(Endpoint::as_str),
            "Trading fronts resolved (order side disabled)"
        );

        for endpoint in &market_data {
            tracing::debug!(endpoint = %endpoint, "Registering market data front");
            self.session.register_endpoint(endpoint);
        }

        self.session.init(&settings.credentials)?;
        *status = ConnectStatus::Connected;

        tracing::info!(fronts = market_data.len(), "Market data session started");
        Ok(market_data)
    }

    /// Record the symbol's exchange, then forward the subscription.
    ///
    /// Repeated calls overwrite the mapping and re-forward the request.
    ///
    /// # Errors
    ///
    /// - [`ConnectorError::SessionClosed`] after [`close`](Self::close).
    /// - [`ConnectorError::NotLoggedIn`] before login; the registry is not
    ///   written.
    /// - [`ConnectorError::Feed`] if the session rejects the request.
    pub fn subscribe(&self, request: &SubscribeRequest) -> Result<(), ConnectorError> {
        if *self.status.lock() == ConnectStatus::Closed {
            return Err(ConnectorError::SessionClosed);
        }
        if !self.session.is_logged_in() {
            return Err(ConnectorError::NotLoggedIn {
                symbol: request.symbol.clone(),
            });
        }

        let previous = self.registry.insert(request.symbol.clone(), request.exchange);
        if let Some(previous) = previous
            && previous != request.exchange
        {
            tracing::warn!(
                symbol = %request.symbol,
                previous = %previous,
                exchange = %request.exchange,
                "Subscription moved to a different exchange"
            );
        }

        self.session.subscribe_market_data(&request.symbol)?;
        metrics::set_subscriptions(self.registry.len());

        tracing::info!(vt_symbol = %request.vt_symbol(), "Subscribed");
        Ok(())
    }

    /// Close the session. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        let previous = {
            let mut status = self.status.lock();
            std::mem::replace(&mut *status, ConnectStatus::Closed)
        };

        match previous {
            ConnectStatus::Closed => false,
            ConnectStatus::Connected => {
                self.session.close();
                tracing::info!("Market data session closed");
                true
            }
            ConnectStatus::Idle => true,
        }
    }

    /// Whether `connect` has succeeded and `close` has not been called.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.status.lock() == ConnectStatus::Connected
    }

    /// Whether the session reports a completed login.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.is_connected() && self.session.is_logged_in()
    }

    /// The shared symbol registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SymbolExchangeRegistry> {
        &self.registry
    }
}

// =============================================================================
// Tick Pipeline
// =============================================================================

/// Push sink that normalizes pushes and emits canonical ticks.
pub struct TickPipeline {
    normalizer: TickNormalizer,
    registry: Arc<SymbolExchangeRegistry>,
    emitter: Arc<dyn EventEmitter>,
}

impl TickPipeline {
    /// Create a pipeline.
    #[must_use]
    pub fn new(
        normalizer: TickNormalizer,
        registry: Arc<SymbolExchangeRegistry>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            normalizer,
            registry,
            emitter,
        }
    }

    /// Normalize one push against `current_date` and emit it on its tick topic.
    ///
    /// # Errors
    ///
    /// Returns the drop reason; nothing is emitted in that case.
    pub fn process(&self, raw: &RawTick, current_date: NaiveDate) -> Result<(), DroppedTick> {
        let tick = self.normalizer.normalize(raw, &self.registry, current_date)?;
        let exchange = tick.exchange;
        self.emitter
            .emit(&tick_topic(&tick.vt_symbol()), EventPayload::Tick(Box::new(tick)));
        metrics::record_tick_emitted(exchange.as_str());
        Ok(())
    }

    fn local_date(&self) -> NaiveDate {
        Utc::now()
            .with_timezone(&self.normalizer.timezone())
            .date_naive()
    }
}

impl PushSink for TickPipeline {
    fn on_push(&self, raw: RawTick) {
        if let Err(reason) = self.process(&raw, self.local_date()) {
            metrics::record_tick_dropped(reason.as_str());
            tracing::trace!(symbol = %raw.instrument_id, reason = %reason, "Push dropped");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
