//! Strategy façade — holds a broker, a portfolio handle, and per-security
//! bar counters; emits entry/exit orders per bar (spec §3, §4.8).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::broker::Broker;
use crate::domain::{Bar, Timestamp};
use crate::error::Result;
use crate::pattern::PatternEvaluator;
use crate::portfolio::Portfolio;
use crate::position::Direction;

/// Flags controlling pyramiding allowance, max concurrent units, and an
/// optional bar-count-based max holding period (spec §3).
#[derive(Debug, Clone, Copy)]
pub struct StrategyOptions {
    pub pyramiding_enabled: bool,
    pub max_additional_units: u32,
    pub max_holding_bars: Option<u32>,
    pub stop_loss_pct: Option<f64>,
    pub profit_target_pct: Option<f64>,
    /// Direction this strategy's entry signal trades in. The pattern
    /// evaluator (spec §6) only reports that a signal fired, not a side —
    /// direction is the strategy's own concern, not the pattern's.
    pub entry_direction: Direction,
}

impl Default for StrategyOptions {
    fn default() -> Self {
        Self {
            pyramiding_enabled: false,
            max_additional_units: 0,
            max_holding_bars: None,
            stop_loss_pct: None,
            profit_target_pct: None,
            entry_direction: Direction::Long,
        }
    }
}

impl StrategyOptions {
    /// `pyramidingEnabled AND numOpenUnits(symbol) < 1 + maxAdditionalUnits` (spec §4.8).
    pub fn can_pyramid(&self, num_open_units: usize) -> bool {
        self.pyramiding_enabled && (num_open_units as u32) < 1 + self.max_additional_units
    }
}

pub struct Strategy {
    pub name: String,
    pub broker: Rc<RefCell<Broker>>,
    pub portfolio: Rc<RefCell<Portfolio>>,
    pub options: StrategyOptions,
    pattern: Box<dyn PatternEvaluator>,
    /// Per-security bar counter, advanced by [`Self::update_bar_number`]
    /// (spec §4.8's `updateBarNumber` hook). Wrapped in a `RefCell` so the
    /// driver can advance it through a shared `&Strategy` alongside the
    /// other three per-bar hooks.
    bars_seen: RefCell<HashMap<String, u32>>,
}

impl Strategy {
    pub fn new(
        name: impl Into<String>,
        broker: Rc<RefCell<Broker>>,
        portfolio: Rc<RefCell<Portfolio>>,
        options: StrategyOptions,
        pattern: Box<dyn PatternEvaluator>,
    ) -> Self {
        Self {
            name: name.into(),
            broker,
            portfolio,
            options,
            pattern,
            bars_seen: RefCell::new(HashMap::new()),
        }
    }

    /// Advance this security's per-bar counter (spec §4.8 `updateBarNumber`).
    pub fn update_bar_number(&self, symbol: &str) {
        *self.bars_seen.borrow_mut().entry(symbol.to_string()).or_insert(0) += 1;
    }

    /// Number of bars [`Self::update_bar_number`] has observed for `symbol`.
    pub fn bar_number(&self, symbol: &str) -> u32 {
        self.bars_seen.borrow().get(symbol).copied().unwrap_or(0)
    }

    /// Submit per-unit profit-target/stop-loss orders for every open unit,
    /// plus a market exit for any unit past `maxHoldingBars` (spec §4.8).
    pub fn exit_orders(&self, symbol: &str, timestamp: Timestamp) -> Result<()> {
        let units: Vec<_> = match self.broker.borrow().position(symbol) {
            Some(position) => position.units().to_vec(),
            None => return Ok(()),
        };
        for (index, unit) in units.iter().enumerate() {
            // A unit with an exit order still outstanding (e.g. waiting on a
            // security whose bar hasn't landed yet this timestamp) must not
            // get a second one stacked on top of it — the dispatcher would
            // resolve both against the same unit, and the second to fire
            // would find it already closed (spec §4.8).
            if self.broker.borrow().has_pending_exit(unit.id) {
                continue;
            }
            let one_based = index + 1;
            if unit.is_long() {
                if let Some(target) = unit.profit_target_price {
                    Broker::exit_long_unit_at_limit(&self.broker, symbol, timestamp, one_based, target)?;
                }
                if let Some(stop) = unit.stop_loss_price {
                    Broker::exit_long_unit_at_stop(&self.broker, symbol, timestamp, one_based, stop)?;
                }
            } else if unit.is_short() {
                if let Some(target) = unit.profit_target_price {
                    Broker::exit_short_unit_at_limit(&self.broker, symbol, timestamp, one_based, target)?;
                }
                if let Some(stop) = unit.stop_loss_price {
                    Broker::exit_short_unit_at_stop(&self.broker, symbol, timestamp, one_based, stop)?;
                }
            }
            if let Some(max_bars) = self.options.max_holding_bars {
                if unit.num_bars_held() as u32 >= max_bars {
                    if unit.is_long() {
                        Broker::exit_long_unit_on_open(&self.broker, symbol, timestamp, one_based)?;
                    } else {
                        Broker::exit_short_unit_on_open(&self.broker, symbol, timestamp, one_based)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Evaluate the pattern; if it fires and the position is flat or
    /// pyramiding permits another unit, submit a market entry (spec §4.8).
    pub fn entry_orders(&self, symbol: &str, timestamp: Timestamp) -> Result<()> {
        let portfolio = self.portfolio.borrow();
        let Some(security) = portfolio.get(symbol) else {
            return Ok(());
        };
        if !self.pattern.signal_fires(security, timestamp) {
            return Ok(());
        }
        let num_open = self.broker.borrow().num_open_units(symbol);
        if num_open > 0 && !self.options.can_pyramid(num_open) {
            return Ok(());
        }
        match self.options.entry_direction {
            Direction::Short => {
                Broker::enter_short_on_open(
                    &self.broker,
                    symbol,
                    timestamp,
                    1,
                    self.options.stop_loss_pct,
                    self.options.profit_target_pct,
                )?;
            }
            _ => {
                Broker::enter_long_on_open(
                    &self.broker,
                    symbol,
                    timestamp,
                    1,
                    self.options.stop_loss_pct,
                    self.options.profit_target_pct,
                )?;
            }
        }
        Ok(())
    }

    pub fn process_pending_orders(&self, fill_timestamp: Timestamp, bars_at_fill: &HashMap<String, Bar>) -> Result<()> {
        Broker::process_pending_orders(&self.broker, fill_timestamp, bars_at_fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pyramiding_predicate_respects_cap() {
        let options = StrategyOptions {
            pyramiding_enabled: true,
            max_additional_units: 2,
            ..Default::default()
        };
        assert!(options.can_pyramid(1));
        assert!(options.can_pyramid(2));
        assert!(!options.can_pyramid(3));
    }

    #[test]
    fn pyramiding_disabled_never_allows_additional_units() {
        let options = StrategyOptions {
            pyramiding_enabled: false,
            max_additional_units: 5,
            ..Default::default()
        };
        assert!(!options.can_pyramid(1));
    }
}
