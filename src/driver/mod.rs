//! Simulation driver — walks the unified timestamp sequence of every range,
//! in a fixed per-bar phase order, enforcing end-of-range flat-out (spec §3,
//! §4.9).

use std::collections::{BTreeSet, HashMap};

use chrono::Datelike;

use crate::broker::Broker;
use crate::domain::Timestamp;
use crate::error::{BacktestError, Result};
use crate::portfolio::DateRange;
use crate::strategy::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    Daily,
    Weekly,
    Monthly,
    Intraday,
}

impl Timeframe {
    /// Snap a range's endpoints per spec §4.9: Daily snaps weekend
    /// endpoints to the nearest prior/next weekday; Weekly snaps to
    /// first-of-week (Monday); Monthly to first-of-month; Intraday uses the
    /// timestamps as given.
    pub fn normalize(self, range: DateRange) -> DateRange {
        match self {
            Timeframe::Daily => DateRange::new(
                Self::nearest_weekday_forward(range.start),
                Self::nearest_weekday_backward(range.end),
            ),
            Timeframe::Weekly => DateRange::new(
                Self::start_of_week(range.start),
                Self::start_of_week(range.end),
            ),
            Timeframe::Monthly => DateRange::new(
                Self::start_of_month(range.start),
                Self::start_of_month(range.end),
            ),
            Timeframe::Intraday => range,
        }
    }

    fn nearest_weekday_forward(ts: Timestamp) -> Timestamp {
        let mut date = ts.date();
        while matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
            date = date.succ_opt().expect("date in range");
        }
        date.and_time(ts.time())
    }

    fn nearest_weekday_backward(ts: Timestamp) -> Timestamp {
        let mut date = ts.date();
        while matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
            date = date.pred_opt().expect("date in range");
        }
        date.and_time(ts.time())
    }

    fn start_of_week(ts: Timestamp) -> Timestamp {
        let date = ts.date();
        let days_since_monday = date.weekday().num_days_from_monday();
        (date - chrono::Duration::days(days_since_monday as i64)).and_time(ts.time())
    }

    fn start_of_month(ts: Timestamp) -> Timestamp {
        let date = ts.date();
        date.with_day(1).expect("day 1 is always valid").and_time(ts.time())
    }
}

/// Validate that `timeframe` and an explicit start/end pair are a coherent
/// combination (spec §6, factory's `UnsupportedTimeframe`). Intraday is the
/// only timeframe that requires full (non-midnight) timestamps; the rest
/// are date-oriented and reject start == end spanning less than a day
/// unless Intraday.
pub fn validate_timeframe_range(timeframe: Timeframe, range: DateRange) -> Result<()> {
    if range.start > range.end {
        return Err(BacktestError::UnsupportedTimeframe(format!(
            "range start {} is after end {}",
            range.start, range.end
        )));
    }
    if timeframe != Timeframe::Intraday
        && (range.start.time() != crate::domain::default_bar_time()
            || range.end.time() != crate::domain::default_bar_time())
    {
        return Err(BacktestError::UnsupportedTimeframe(
            "non-intraday timeframe requires date-only (default-bar-time) range bounds".into(),
        ));
    }
    Ok(())
}

pub struct BacktestDriver {
    pub timeframe: Timeframe,
    pub ranges: Vec<DateRange>,
}

impl BacktestDriver {
    pub fn new(timeframe: Timeframe, ranges: Vec<DateRange>) -> Self {
        let ranges = ranges.into_iter().map(|r| timeframe.normalize(r)).collect();
        Self { timeframe, ranges }
    }

    /// Run every range against every strategy (spec §4.9).
    pub fn run(&self, strategies: &[Strategy]) -> Result<()> {
        if strategies.is_empty() {
            return Err(BacktestError::NoStrategies);
        }
        let num_ranges = self.ranges.len();
        for (range_index, range) in self.ranges.iter().enumerate() {
            let is_last_range = range_index + 1 == num_ranges;
            let multiple_ranges_remain = num_ranges > 1;

            let timestamps = self.unified_timestamps(strategies, *range);
            if timestamps.is_empty() {
                continue;
            }
            let last_timestamp = *timestamps.last().expect("non-empty");

            for window in timestamps.windows(2) {
                let t_order = window[0];
                let t_fill = window[1];

                for strategy in strategies {
                    let symbols: Vec<String> = strategy
                        .portfolio
                        .borrow()
                        .symbols()
                        .map(|s| s.to_string())
                        .collect();
                    for symbol in &symbols {
                        strategy.update_bar_number(symbol);
                        if multiple_ranges_remain && t_fill >= last_timestamp && !is_last_range {
                            Broker::exit_long_all_units_on_open(&strategy.broker, symbol, t_order)?;
                            Broker::exit_short_all_units_on_open(&strategy.broker, symbol, t_order)?;
                        } else {
                            strategy.exit_orders(symbol, t_order)?;
                            strategy.entry_orders(symbol, t_order)?;
                        }
                    }

                    let bars_at_fill = Self::bars_at(strategy, t_fill);
                    strategy.process_pending_orders(t_fill, &bars_at_fill)?;
                }
            }
        }
        Ok(())
    }

    fn unified_timestamps(&self, strategies: &[Strategy], range: DateRange) -> Vec<Timestamp> {
        let mut set = BTreeSet::new();
        for strategy in strategies {
            let portfolio = strategy.portfolio.borrow();
            for (_, security) in portfolio.iter() {
                for timestamp in security.timestamps_in(&range) {
                    set.insert(timestamp);
                }
            }
        }
        set.into_iter().collect()
    }

    fn bars_at(strategy: &Strategy, timestamp: Timestamp) -> HashMap<String, crate::domain::Bar> {
        let mut bars = HashMap::new();
        let portfolio = strategy.portfolio.borrow();
        for (symbol, security) in portfolio.iter() {
            if let Some(bar) = security.bar_at(timestamp) {
                bars.insert(symbol.to_string(), bar.clone());
            }
        }
        bars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::at_default_bar_time;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> Timestamp {
        at_default_bar_time(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn daily_snaps_weekend_endpoints() {
        // 2024-01-06 is a Saturday, 2024-01-07 a Sunday.
        let range = DateRange::new(date(2024, 1, 6), date(2024, 1, 7));
        let normalized = Timeframe::Daily.normalize(range);
        assert_eq!(normalized.start, date(2024, 1, 8));
        assert_eq!(normalized.end, date(2024, 1, 5));
    }

    #[test]
    fn weekly_snaps_to_monday() {
        let range = DateRange::new(date(2024, 1, 10), date(2024, 1, 10));
        let normalized = Timeframe::Weekly.normalize(range);
        assert_eq!(normalized.start.date(), NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
    }

    #[test]
    fn monthly_snaps_to_first_of_month() {
        let range = DateRange::new(date(2024, 3, 17), date(2024, 3, 17));
        let normalized = Timeframe::Monthly.normalize(range);
        assert_eq!(normalized.start.date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn empty_strategy_list_fails() {
        let driver = BacktestDriver::new(Timeframe::Daily, vec![DateRange::new(date(2024, 1, 2), date(2024, 1, 3))]);
        let err = driver.run(&[]).unwrap_err();
        assert!(matches!(err, BacktestError::NoStrategies));
    }
}
