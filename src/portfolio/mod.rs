//! Portfolio — the mapping from symbol to security (spec §3, §6 "Time
//! series store" / "Security attributes provider").

pub mod market_hours;

use std::collections::BTreeMap;

use crate::domain::{Bar, SecurityAttributes, Timestamp};

/// A tradable security: static attributes plus its bar time series, indexed
/// by timestamp for exact lookup and ascending iteration.
#[derive(Debug, Clone)]
pub struct Security {
    pub attributes: SecurityAttributes,
    bars: BTreeMap<Timestamp, Bar>,
}

impl Security {
    pub fn new(attributes: SecurityAttributes) -> Self {
        Self {
            attributes,
            bars: BTreeMap::new(),
        }
    }

    pub fn insert_bar(&mut self, bar: Bar) {
        self.bars.insert(bar.timestamp, bar);
    }

    /// Exact lookup by timestamp. A miss is expected and skipped by callers
    /// (spec §6, "NotFound is expected and skipped").
    pub fn bar_at(&self, timestamp: Timestamp) -> Option<&Bar> {
        self.bars.get(&timestamp)
    }

    pub fn bars_ascending(&self) -> impl Iterator<Item = &Bar> {
        self.bars.values()
    }

    pub fn timestamps_in(&self, range: &DateRange) -> impl Iterator<Item = Timestamp> + '_ {
        let range = *range;
        self.bars.keys().copied().filter(move |&t| range.contains(t))
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// Mapping from symbol to security (spec §3).
#[derive(Debug, Clone, Default)]
pub struct Portfolio {
    securities: std::collections::HashMap<String, Security>,
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: impl Into<String>, security: Security) {
        self.securities.insert(symbol.into(), security);
    }

    pub fn get(&self, symbol: &str) -> Option<&Security> {
        self.securities.get(symbol)
    }

    pub fn get_mut(&mut self, symbol: &str) -> Option<&mut Security> {
        self.securities.get_mut(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.securities.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Security)> {
        self.securities.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A closed date range used to scope bar iteration (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl DateRange {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::at_default_bar_time;

    fn ts(d: u32) -> Timestamp {
        at_default_bar_time(chrono::NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
    }

    #[test]
    fn bar_lookup_misses_are_none() {
        let security = Security::new(SecurityAttributes::us_equity("SPY"));
        assert!(security.bar_at(ts(1)).is_none());
    }

    #[test]
    fn date_range_is_inclusive() {
        let range = DateRange::new(ts(1), ts(10));
        assert!(range.contains(ts(1)));
        assert!(range.contains(ts(10)));
        assert!(!range.contains(ts(11)));
    }
}
