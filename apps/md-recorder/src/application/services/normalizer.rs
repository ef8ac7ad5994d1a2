//! Tick Normalization
//!
//! Turns a raw depth push into a [`CanonicalTick`], or drops it.
//!
//! # Rules (in order)
//!
//! 1. No update time: dropped as [`DroppedTick::NoTimestamp`].
//! 2. Symbol not in the registry (not subscribed yet): dropped as
//!    [`DroppedTick::UnknownSymbol`].
//! 3. The date comes from `ActionDay`, unless it is empty or the exchange
//!    fills it with the trading day (DCE); then the current local date is used.
//! 4. `date + UpdateTime + UpdateMillisec` is parsed as a fixed-width
//!    timestamp and placed in the exchange timezone.
//! 5. Every price passes through the price adjuster.
//! 6. Levels 2-5 are filled only when level-2 bid or ask volume is non-zero.
//!
//! Drops are normal filtering outcomes: they are counted, never retried.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

use crate::domain::subscription::SymbolExchangeRegistry;
use crate::domain::tick::{
    CanonicalTick, Exchange, QuoteLevel, RawLevel, RawTick, exchange_offset,
};

/// Fixed-width layout of the reconstructed timestamp.
const TIMESTAMP_FORMAT: &str = "%Y%m%d %H:%M:%S%.3f";

/// Maps a raw vendor price to a usable price.
pub type PriceAdjuster = fn(f64) -> f64;

/// Default price adjustment.
///
/// The front reports "no value" as `f64::MAX`; that sentinel and any
/// non-finite value become zero.
#[must_use]
pub fn adjust_price(price: f64) -> f64 {
    if price.is_finite() && price < f64::MAX {
        price
    } else {
        0.0
    }
}

/// Reason a push was not turned into a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum DroppedTick {
    /// The push has no update time.
    #[error("push has no update time")]
    NoTimestamp,
    /// The symbol has not been subscribed (or the push raced the subscription).
    #[error("symbol has not been subscribed")]
    UnknownSymbol,
    /// Date, time or millisecond fields do not form a valid timestamp.
    #[error("update time cannot be parsed")]
    MalformedTimestamp,
}

impl DroppedTick {
    /// Metric label for the reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NoTimestamp => "no_timestamp",
            Self::UnknownSymbol => "unknown_symbol",
            Self::MalformedTimestamp => "malformed_timestamp",
        }
    }
}

/// Converts raw pushes into canonical ticks.
#[derive(Debug, Clone)]
pub struct TickNormalizer {
    gateway_name: String,
    adjust: PriceAdjuster,
    timezone: FixedOffset,
}

impl TickNormalizer {
    /// Create a normalizer using [`adjust_price`] and the exchange timezone.
    #[must_use]
    pub fn new(gateway_name: impl Into<String>) -> Self {
        Self {
            gateway_name: gateway_name.into(),
            adjust: adjust_price,
            timezone: exchange_offset(),
        }
    }

    /// Replace the price adjuster.
    #[must_use]
    pub fn with_price_adjuster(mut self, adjust: PriceAdjuster) -> Self {
        self.adjust = adjust;
        self
    }

    /// Timezone attached to tick timestamps.
    #[must_use]
    pub const fn timezone(&self) -> FixedOffset {
        self.timezone
    }

    /// Normalize one push.
    ///
    /// `current_date` is the exchange-local calendar date, used when the
    /// push's action day cannot be trusted.
    ///
    /// # Errors
    ///
    /// Returns the [`DroppedTick`] reason when the push is filtered out.
    pub fn normalize(
        &self,
        raw: &RawTick,
        registry: &SymbolExchangeRegistry,
        current_date: NaiveDate,
    ) -> Result<CanonicalTick, DroppedTick> {
        if raw.update_time.trim().is_empty() {
            return Err(DroppedTick::NoTimestamp);
        }

        let symbol = raw.instrument_id.as_str();
        let exchange = registry.get(symbol).ok_or(DroppedTick::UnknownSymbol)?;
        let datetime = self.resolve_datetime(raw, exchange, current_date)?;

        let depth = raw
            .has_depth()
            .then(|| [2, 3, 4, 5].map(|level| self.quote_level(raw.level(level))));

        Ok(CanonicalTick {
            symbol: symbol.to_string(),
            exchange,
            datetime,
            name: symbol.to_string(),
            volume: raw.volume,
            turnover: to_decimal(raw.turnover),
            open_interest: to_decimal(raw.open_interest),
            last_price: self.price(raw.last_price),
            open_price: self.price(raw.open_price),
            high_price: self.price(raw.highest_price),
            low_price: self.price(raw.lowest_price),
            pre_close: self.price(raw.pre_close_price),
            limit_up: self.price(raw.upper_limit_price),
            limit_down: self.price(raw.lower_limit_price),
            level_1: self.quote_level(raw.level(1)),
            depth,
            gateway_name: self.gateway_name.clone(),
        })
    }

    fn resolve_datetime(
        &self,
        raw: &RawTick,
        exchange: Exchange,
        current_date: NaiveDate,
    ) -> Result<DateTime<FixedOffset>, DroppedTick> {
        let millis = u32::try_from(raw.update_millisec)
            .ok()
            .filter(|ms| *ms < 1000)
            .ok_or(DroppedTick::MalformedTimestamp)?;

        let action_day = raw.action_day.trim();
        let date = if action_day.is_empty() || exchange.has_unreliable_action_day() {
            current_date.format("%Y%m%d").to_string()
        } else {
            action_day.to_string()
        };

        let stamp = format!("{date} {}.{millis:03}", raw.update_time.trim());
        NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT)
            .ok()
            .and_then(|naive| naive.and_local_timezone(self.timezone).single())
            .ok_or(DroppedTick::MalformedTimestamp)
    }

    fn price(&self, raw: f64) -> Decimal {
        to_decimal((self.adjust)(raw))
    }

    fn quote_level(&self, raw: Option<RawLevel>) -> QuoteLevel {
        let raw = raw.unwrap_or_default();
        QuoteLevel {
            bid_price: self.price(raw.bid_price),
            bid_volume: raw.bid_volume,
            ask_price: self.price(raw.ask_price),
            ask_volume: raw.ask_volume,
        }
    }
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}
