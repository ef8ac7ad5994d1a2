//! Market Data Tick Types
//!
//! Wire-level depth snapshots as pushed by the futures front ([`RawTick`]) and
//! the canonical record produced by normalization ([`CanonicalTick`]).
//!
//! Raw field names follow the vendor's depth market data struct so replay
//! files and captured pushes deserialize without a mapping layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Exchange-local UTC offset in seconds (China Standard Time, no DST).
pub const EXCHANGE_UTC_OFFSET_SECS: i32 = 8 * 3600;

/// Number of quote levels a depth push carries.
pub const DEPTH_LEVELS: usize = 5;

/// Fixed exchange-local timezone attached to every tick timestamp.
#[must_use]
#[allow(clippy::expect_used)]
pub fn exchange_offset() -> FixedOffset {
    FixedOffset::east_opt(EXCHANGE_UTC_OFFSET_SECS).expect("UTC+8 is a valid fixed offset")
}

// =============================================================================
// Exchange
// =============================================================================

/// Futures exchanges reachable through the front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    /// China Financial Futures Exchange.
    Cffex,
    /// Shanghai Futures Exchange.
    Shfe,
    /// Zhengzhou Commodity Exchange.
    Czce,
    /// Dalian Commodity Exchange.
    Dce,
    /// Shanghai International Energy Exchange.
    Ine,
    /// Guangzhou Futures Exchange.
    Gfex,
}

impl Exchange {
    /// Exchange code as used in vt-symbols (`au2504.SHFE`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cffex => "CFFEX",
            Self::Shfe => "SHFE",
            Self::Czce => "CZCE",
            Self::Dce => "DCE",
            Self::Ine => "INE",
            Self::Gfex => "GFEX",
        }
    }

    /// Whether the exchange fills `ActionDay` with the trading day instead of
    /// the calendar day, so the local date must be used instead.
    #[must_use]
    pub const fn has_unreliable_action_day(&self) -> bool {
        matches!(self, Self::Dce)
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown exchange code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown exchange code: {0}")]
pub struct UnknownExchange(pub String);

impl FromStr for Exchange {
    type Err = UnknownExchange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CFFEX" => Ok(Self::Cffex),
            "SHFE" => Ok(Self::Shfe),
            "CZCE" => Ok(Self::Czce),
            "DCE" => Ok(Self::Dce),
            "INE" => Ok(Self::Ine),
            "GFEX" => Ok(Self::Gfex),
            _ => Err(UnknownExchange(s.to_string())),
        }
    }
}

// =============================================================================
// Raw Tick
// =============================================================================

/// Unmodified depth market data push for one instrument at one instant.
///
/// Not every field is populated by every exchange; absent fields default to
/// empty strings and zeroes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct RawTick {
    #[serde(rename = "TradingDay")]
    pub trading_day: String,
    #[serde(rename = "InstrumentID")]
    pub instrument_id: String,
    #[serde(rename = "ExchangeID")]
    pub exchange_id: String,
    #[serde(rename = "LastPrice")]
    pub last_price: f64,
    #[serde(rename = "PreClosePrice")]
    pub pre_close_price: f64,
    #[serde(rename = "OpenPrice")]
    pub open_price: f64,
    #[serde(rename = "HighestPrice")]
    pub highest_price: f64,
    #[serde(rename = "LowestPrice")]
    pub lowest_price: f64,
    #[serde(rename = "ClosePrice")]
    pub close_price: f64,
    #[serde(rename = "Volume")]
    pub volume: i64,
    #[serde(rename = "Turnover")]
    pub turnover: f64,
    #[serde(rename = "OpenInterest")]
    pub open_interest: f64,
    #[serde(rename = "UpperLimitPrice")]
    pub upper_limit_price: f64,
    #[serde(rename = "LowerLimitPrice")]
    pub lower_limit_price: f64,
    #[serde(rename = "UpdateTime")]
    pub update_time: String,
    #[serde(rename = "UpdateMillisec")]
    pub update_millisec: i32,
    #[serde(rename = "BidPrice1")]
    pub bid_price_1: f64,
    #[serde(rename = "BidVolume1")]
    pub bid_volume_1: i64,
    #[serde(rename = "AskPrice1")]
    pub ask_price_1: f64,
    #[serde(rename = "AskVolume1")]
    pub ask_volume_1: i64,
    #[serde(rename = "BidPrice2")]
    pub bid_price_2: f64,
    #[serde(rename = "BidVolume2")]
    pub bid_volume_2: i64,
    #[serde(rename = "AskPrice2")]
    pub ask_price_2: f64,
    #[serde(rename = "AskVolume2")]
    pub ask_volume_2: i64,
    #[serde(rename = "BidPrice3")]
    pub bid_price_3: f64,
    #[serde(rename = "BidVolume3")]
    pub bid_volume_3: i64,
    #[serde(rename = "AskPrice3")]
    pub ask_price_3: f64,
    #[serde(rename = "AskVolume3")]
    pub ask_volume_3: i64,
    #[serde(rename = "BidPrice4")]
    pub bid_price_4: f64,
    #[serde(rename = "BidVolume4")]
    pub bid_volume_4: i64,
    #[serde(rename = "AskPrice4")]
    pub ask_price_4: f64,
    #[serde(rename = "AskVolume4")]
    pub ask_volume_4: i64,
    #[serde(rename = "BidPrice5")]
    pub bid_price_5: f64,
    #[serde(rename = "BidVolume5")]
    pub bid_volume_5: i64,
    #[serde(rename = "AskPrice5")]
    pub ask_price_5: f64,
    #[serde(rename = "AskVolume5")]
    pub ask_volume_5: i64,
    #[serde(rename = "ActionDay")]
    pub action_day: String,
}

/// One raw bid/ask level as pushed by the front.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawLevel {
    /// Bid price.
    pub bid_price: f64,
    /// Bid volume.
    pub bid_volume: i64,
    /// Ask price.
    pub ask_price: f64,
    /// Ask volume.
    pub ask_volume: i64,
}

impl RawTick {
    /// Quote level `1..=5`; `None` for any other index.
    #[must_use]
    pub const fn level(&self, level: usize) -> Option<RawLevel> {
        let (bid_price, bid_volume, ask_price, ask_volume) = match level {
            1 => (self.bid_price_1, self.bid_volume_1, self.ask_price_1, self.ask_volume_1),
            2 => (self.bid_price_2, self.bid_volume_2, self.ask_price_2, self.ask_volume_2),
            3 => (self.bid_price_3, self.bid_volume_3, self.ask_price_3, self.ask_volume_3),
            4 => (self.bid_price_4, self.bid_volume_4, self.ask_price_4, self.ask_volume_4),
            5 => (self.bid_price_5, self.bid_volume_5, self.ask_price_5, self.ask_volume_5),
            _ => return None,
        };
        Some(RawLevel {
            bid_price,
            bid_volume,
            ask_price,
            ask_volume,
        })
    }

    /// Whether the push carries depth beyond level 1.
    #[must_use]
    pub const fn has_depth(&self) -> bool {
        self.bid_volume_2 != 0 || self.ask_volume_2 != 0
    }
}

// =============================================================================
// Canonical Tick
// =============================================================================

/// One normalized bid/ask level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLevel {
    /// Bid price.
    pub bid_price: Decimal,
    /// Bid volume.
    pub bid_volume: i64,
    /// Ask price.
    pub ask_price: Decimal,
    /// Ask volume.
    pub ask_volume: i64,
}

/// Normalized tick record emitted to the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTick {
    /// Instrument symbol (`au2504`).
    pub symbol: String,
    /// Exchange the symbol was subscribed on.
    pub exchange: Exchange,
    /// Exchange-local timestamp with millisecond precision.
    pub datetime: DateTime<FixedOffset>,
    /// Display name.
    pub name: String,
    /// Cumulative traded volume.
    pub volume: i64,
    /// Cumulative turnover.
    pub turnover: Decimal,
    /// Open interest.
    pub open_interest: Decimal,
    /// Last traded price.
    pub last_price: Decimal,
    /// Session open price.
    pub open_price: Decimal,
    /// Session high.
    pub high_price: Decimal,
    /// Session low.
    pub low_price: Decimal,
    /// Previous close.
    pub pre_close: Decimal,
    /// Upper price limit.
    pub limit_up: Decimal,
    /// Lower price limit.
    pub limit_down: Decimal,
    /// Best bid/ask.
    pub level_1: QuoteLevel,
    /// Levels 2-5; `None` when the push reported no depth.
    pub depth: Option<[QuoteLevel; DEPTH_LEVELS - 1]>,
    /// Name of the gateway that produced the tick.
    pub gateway_name: String,
}

impl CanonicalTick {
    /// Symbol qualified by exchange (`au2504.SHFE`).
    #[must_use]
    pub fn vt_symbol(&self) -> String {
        format!("{}.{}", self.symbol, self.exchange)
    }

    /// Quote level `1..=5`, or `None` if the level is out of range or no
    /// depth was reported.
    #[must_use]
    pub fn level(&self, level: usize) -> Option<&QuoteLevel> {
        match level {
            1 => Some(&self.level_1),
            2..=DEPTH_LEVELS => self.depth.as_ref().map(|depth| &depth[level - 2]),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
