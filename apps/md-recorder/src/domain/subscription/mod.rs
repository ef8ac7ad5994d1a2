//! Subscription Tracking
//!
//! Requests to receive market data for an instrument, and the registry that
//! remembers which exchange each subscribed symbol belongs to.
//!
//! # Design
//!
//! The front only pushes the instrument id; the exchange is known from the
//! subscription. The registry is written by the subscribe path and read by
//! the push-handling thread for every tick, so it sits behind a lock and is
//! shared through an `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use parking_lot::RwLock;

use crate::domain::tick::{Exchange, UnknownExchange};

// =============================================================================
// Subscribe Request
// =============================================================================

/// Request to receive pushes for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscribeRequest {
    /// Instrument symbol (`au2504`).
    pub symbol: String,
    /// Exchange the instrument trades on.
    pub exchange: Exchange,
}

impl SubscribeRequest {
    /// Create a new request.
    #[must_use]
    pub fn new(symbol: impl Into<String>, exchange: Exchange) -> Self {
        Self {
            symbol: symbol.into(),
            exchange,
        }
    }

    /// Symbol qualified by exchange (`au2504.SHFE`).
    #[must_use]
    pub fn vt_symbol(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SubscribeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.symbol, self.exchange)
    }
}

/// A vt-symbol that cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VtSymbolError {
    /// No `.` separating symbol and exchange.
    #[error("vt-symbol {0:?} must have the form <symbol>.<exchange>")]
    MissingExchange(String),
    /// Exchange suffix is not a known exchange.
    #[error(transparent)]
    UnknownExchange(#[from] UnknownExchange),
}

impl FromStr for SubscribeRequest {
    type Err = VtSymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (symbol, exchange) = s
            .rsplit_once('.')
            .filter(|(symbol, _)| !symbol.is_empty())
            .ok_or_else(|| VtSymbolError::MissingExchange(s.to_string()))?;

        Ok(Self::new(symbol, exchange.parse()?))
    }
}

// =============================================================================
// Symbol Exchange Registry
// =============================================================================

/// Thread-safe map from subscribed symbol to exchange.
///
/// Entries are inserted or overwritten on subscribe and never removed; the
/// registry lives as long as the connector session.
///
/// # Example
///
/// ```rust
/// use md_recorder::domain::subscription::SymbolExchangeRegistry;
/// use md_recorder::domain::tick::Exchange;
///
/// let registry = SymbolExchangeRegistry::new();
/// assert_eq!(registry.get("au2504"), None);
///
/// registry.insert("au2504", Exchange::Shfe);
/// assert_eq!(registry.get("au2504"), Some(Exchange::Shfe));
/// ```
#[derive(Debug, Default)]
pub struct SymbolExchangeRegistry {
    entries: RwLock<HashMap<String, Exchange>>,
}

impl SymbolExchangeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the exchange for a symbol.
    ///
    /// Returns the previous exchange, if any.
    pub fn insert(&self, symbol: impl Into<String>, exchange: Exchange) -> Option<Exchange> {
        self.entries.write().insert(symbol.into(), exchange)
    }

    /// Look up the exchange for a symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<Exchange> {
        self.entries.read().get(symbol).copied()
    }

    /// Whether the symbol has been registered.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.entries.read().contains_key(symbol)
    }

    /// Number of registered symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no symbol has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Registered symbols, in arbitrary order.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
