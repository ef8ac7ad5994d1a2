//! Trading Window Schedule
//!
//! Time-of-day intervals during which the worker process should be alive.
//! Bounds are inclusive; a window whose start is after its end wraps past
//! midnight (the night session).

use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;

/// Default windows: day session and night session, opened 15 minutes before
/// the bell so the feed is connected when trading starts.
pub const DEFAULT_TRADING_WINDOWS: &str = "08:30-15:15,20:30-02:45";

// =============================================================================
// Trading Window
// =============================================================================

/// One inclusive `start..=end` time-of-day interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWindow {
    /// Window opens at this time.
    pub start: NaiveTime,
    /// Window closes after this time.
    pub end: NaiveTime,
}

impl TradingWindow {
    /// Create a new window.
    #[must_use]
    pub const fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether the window crosses midnight.
    #[must_use]
    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    /// Whether `time` falls inside the window.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.wraps_midnight() {
            time >= self.start || time <= self.end
        } else {
            self.start <= time && time <= self.end
        }
    }
}

impl fmt::Display for TradingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M:%S"),
            self.end.format("%H:%M:%S")
        )
    }
}

// =============================================================================
// Trading Schedule
// =============================================================================

/// A set of trading windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingSchedule {
    windows: Vec<TradingWindow>,
}

impl Default for TradingSchedule {
    fn default() -> Self {
        Self::new(vec![
            TradingWindow::new(hm(8, 30), hm(15, 15)),
            TradingWindow::new(hm(20, 30), hm(2, 45)),
        ])
    }
}

impl TradingSchedule {
    /// Create a schedule from explicit windows.
    #[must_use]
    pub const fn new(windows: Vec<TradingWindow>) -> Self {
        Self { windows }
    }

    /// Whether `time` falls inside any window.
    #[must_use]
    pub fn is_trading(&self, time: NaiveTime) -> bool {
        self.windows.iter().any(|window| window.contains(time))
    }

    /// The configured windows.
    #[must_use]
    pub fn windows(&self) -> &[TradingWindow] {
        &self.windows
    }
}

impl fmt::Display for TradingSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, window) in self.windows.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{window}")?;
        }
        Ok(())
    }
}

/// A schedule string that cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    /// No windows were given.
    #[error("trading schedule is empty")]
    Empty,
    /// A window is not of the form `HH:MM-HH:MM`.
    #[error("trading window {0:?} must have the form HH:MM-HH:MM")]
    MalformedWindow(String),
    /// A bound is not a valid time of day.
    #[error("invalid time of day {0:?}")]
    InvalidTime(String),
}

impl FromStr for TradingSchedule {
    type Err = ScheduleError;

    /// Parse `"08:30-15:15,20:30-02:45"`; seconds are optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ScheduleError::Empty);
        }

        s.split(',')
            .map(str::trim)
            .map(|window| {
                let (start, end) = window
                    .split_once('-')
                    .ok_or_else(|| ScheduleError::MalformedWindow(window.to_string()))?;
                Ok(TradingWindow::new(parse_time(start)?, parse_time(end)?))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }
}

fn parse_time(s: &str) -> Result<NaiveTime, ScheduleError> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| ScheduleError::InvalidTime(s.to_string()))
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default()
}

// =============================================================================
// Tests
// =============================================================================
