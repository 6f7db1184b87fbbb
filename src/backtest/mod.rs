//! Backtest — construction factory and result query surface over a finished
//! run (spec §6).

use crate::domain::Timestamp;
use crate::driver::{validate_timeframe_range, BacktestDriver, Timeframe};
use crate::error::{BacktestError, Result};
use crate::portfolio::DateRange;
use crate::returns::{self, ExpandedBarMetrics, TimestampedReturn};
use crate::stats::StatisticsPolicy;
use crate::strategy::Strategy;

/// A configured run: a driver bound to a timeframe/range, and the
/// strategies it will drive. Construct with [`Backtest::make`] or
/// [`Backtest::make_with_bounds`], add strategies, then [`Backtest::run`].
pub struct Backtest {
    driver: BacktestDriver,
    strategies: Vec<Strategy>,
}

impl Backtest {
    /// `make(timeframe, range)` (spec §6): validates the timeframe/range
    /// combination before constructing anything.
    pub fn make(timeframe: Timeframe, range: DateRange) -> Result<Self> {
        validate_timeframe_range(timeframe, range)?;
        Ok(Self {
            driver: BacktestDriver::new(timeframe, vec![range]),
            strategies: Vec::new(),
        })
    }

    /// `make(timeframe, start, end)` (spec §6): convenience constructor over
    /// explicit bounds rather than a pre-built [`DateRange`].
    pub fn make_with_bounds(timeframe: Timeframe, start: Timestamp, end: Timestamp) -> Result<Self> {
        Self::make(timeframe, DateRange::new(start, end))
    }

    /// Construct over several ranges run back-to-back, each flattening
    /// positions at its boundary except the last (spec §4.9).
    pub fn make_multi_range(timeframe: Timeframe, ranges: Vec<DateRange>) -> Result<Self> {
        for range in &ranges {
            validate_timeframe_range(timeframe, *range)?;
        }
        Ok(Self {
            driver: BacktestDriver::new(timeframe, ranges),
            strategies: Vec::new(),
        })
    }

    pub fn add_strategy(&mut self, strategy: Strategy) {
        self.strategies.push(strategy);
    }

    pub fn run(&self) -> Result<()> {
        self.driver.run(&self.strategies)
    }

    pub fn num_strategies(&self) -> usize {
        self.strategies.len()
    }

    pub fn strategies(&self) -> impl Iterator<Item = &Strategy> {
        self.strategies.iter()
    }

    fn strategy(&self, name: &str) -> Result<&Strategy> {
        self.strategies
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| BacktestError::BrokerConfig(format!("no strategy named '{name}'")))
    }

    pub fn closed_trades(&self, strategy_name: &str) -> Result<usize> {
        Ok(self.strategy(strategy_name)?.broker.borrow().transaction_manager().borrow().count_closed())
    }

    pub fn open_trades(&self, strategy_name: &str) -> Result<usize> {
        Ok(self.strategy(strategy_name)?.broker.borrow().transaction_manager().borrow().count_open())
    }

    /// Total bars held across every closed and open trade (spec §6).
    pub fn total_bars_held(&self, strategy_name: &str) -> Result<usize> {
        let broker = self.strategy(strategy_name)?.broker.borrow();
        let closed: usize = broker.all_closed_units().map(|u| u.num_bars_held()).sum();
        let open: usize = broker.all_open_units().map(|u| u.num_bars_held()).sum();
        Ok(closed + open)
    }

    /// Total trades (closed + open), annualized over the run's own date
    /// span using a 365.25-day year (spec §6). Fails with
    /// [`BacktestError::ZeroDuration`] if the span is non-positive.
    pub fn estimated_annualized_trades(&self, strategy_name: &str) -> Result<f64> {
        let total = self.closed_trades(strategy_name)? + self.open_trades(strategy_name)?;
        let span = self.driver.ranges.first().ok_or(BacktestError::ZeroDuration)?;
        let days = (span.end.date() - span.start.date()).num_days();
        if days <= 0 {
            return Err(BacktestError::ZeroDuration);
        }
        let years = days as f64 / 365.25;
        Ok(total as f64 / years)
    }

    pub fn profit_factor(&self, strategy_name: &str, policy: &dyn StatisticsPolicy) -> Result<f64> {
        let broker = self.strategy(strategy_name)?.broker.borrow();
        Ok(policy.profit_factor(&returns::flat_returns(&broker)))
    }

    pub fn required_win_rate(&self, strategy_name: &str, policy: &dyn StatisticsPolicy) -> Result<f64> {
        let broker = self.strategy(strategy_name)?.broker.borrow();
        Ok(policy.required_win_rate(&returns::flat_returns(&broker)))
    }

    pub fn consecutive_losses(&self, strategy_name: &str, policy: &dyn StatisticsPolicy) -> Result<u32> {
        let broker = self.strategy(strategy_name)?.broker.borrow();
        Ok(policy.consecutive_losses(&returns::closed_trade_outcomes(&broker)))
    }

    pub fn flat_returns(&self, strategy_name: &str) -> Result<Vec<f64>> {
        let broker = self.strategy(strategy_name)?.broker.borrow();
        Ok(returns::flat_returns(&broker))
    }

    pub fn timestamped_returns(&self, strategy_name: &str) -> Result<Vec<TimestampedReturn>> {
        let broker = self.strategy(strategy_name)?.broker.borrow();
        Ok(returns::timestamped_returns(&broker))
    }

    pub fn expanded_returns(&self, strategy_name: &str) -> Result<Vec<ExpandedBarMetrics>> {
        let broker = self.strategy(strategy_name)?.broker.borrow();
        Ok(returns::expanded_returns(&broker))
    }
}
