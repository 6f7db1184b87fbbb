//! Bar — the fundamental OHLCV unit the dispatcher and driver walk over.

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};

/// Naive (market-local) timestamp. The core never reasons about time
/// zones; callers are expected to hand it market-local instants
/// consistently (spec §4.9's "default bar time" constant included).
pub type Timestamp = chrono::NaiveDateTime;

/// Default bar time composed onto date-only timestamps (15:00 market-local),
/// so date- and datetime-parameterized calls produce identical orders
/// (spec §9 "Default bar time for date-only APIs").
pub fn default_bar_time() -> chrono::NaiveTime {
    chrono::NaiveTime::from_hms_opt(15, 0, 0).expect("valid constant time")
}

/// Compose a date-only timestamp using [`default_bar_time`].
pub fn at_default_bar_time(date: chrono::NaiveDate) -> Timestamp {
    date.and_time(default_bar_time())
}

/// OHLCV bar for a single symbol at a single timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// Construct a bar, enforcing `low <= min(open, close) <= max(open, close) <= high`.
    pub fn new(
        symbol: impl Into<String>,
        timestamp: Timestamp,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Result<Self> {
        let lo = open.min(close);
        let hi = open.max(close);
        if low > lo || hi > high {
            return Err(BacktestError::BarInvariantViolation {
                open,
                high,
                low,
                close,
            });
        }
        Ok(Self {
            symbol: symbol.into(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}
