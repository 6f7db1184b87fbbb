//! Position unit — a single open leg of a (possibly pyramided) position
//! (spec §3, §4.2).

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, PositionId, Timestamp};
use crate::error::{BacktestError, Result};
use crate::position::direction::Direction;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionUnit {
    pub id: PositionId,
    pub symbol: String,
    pub direction: Direction,
    pub entry_timestamp: Timestamp,
    pub entry_price: f64,
    pub units: u32,
    /// Bars observed since entry, inclusive of the entry bar itself.
    pub history: Vec<Bar>,
    pub stop_loss_price: Option<f64>,
    pub profit_target_price: Option<f64>,
    pub exit_timestamp: Option<Timestamp>,
    pub exit_price: Option<f64>,
}

impl PositionUnit {
    pub fn new(
        id: PositionId,
        symbol: impl Into<String>,
        direction: Direction,
        entry_bar: Bar,
        entry_price: f64,
        units: u32,
        stop_loss_price: Option<f64>,
        profit_target_price: Option<f64>,
    ) -> Self {
        let entry_timestamp = entry_bar.timestamp;
        Self {
            id,
            symbol: symbol.into(),
            direction,
            entry_timestamp,
            entry_price,
            units,
            history: vec![entry_bar],
            stop_loss_price,
            profit_target_price,
            exit_timestamp: None,
            exit_price: None,
        }
    }

    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }

    pub fn is_short(&self) -> bool {
        self.direction == Direction::Short
    }

    pub fn is_open(&self) -> bool {
        self.exit_timestamp.is_none()
    }

    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Bars since entry, inclusive of the entry bar (spec §4.2, §8 invariant
    /// `numBarsHeld ≥ 1`).
    pub fn num_bars_held(&self) -> usize {
        self.history.len()
    }

    /// Append a bar to the open-position history. Fails on a closed unit.
    pub fn observe_bar(&mut self, bar: Bar) -> Result<()> {
        if self.is_closed() {
            return Err(BacktestError::PositionFlat(self.symbol.clone()));
        }
        self.history.push(bar);
        Ok(())
    }

    /// Close the unit at `timestamp`/`price`. Fails if already closed.
    pub fn close(&mut self, timestamp: Timestamp, price: f64) -> Result<()> {
        if self.is_closed() {
            return Err(BacktestError::PositionFlat(self.symbol.clone()));
        }
        self.exit_timestamp = Some(timestamp);
        self.exit_price = Some(price);
        Ok(())
    }

    /// The unit's exit price. Fails with [`BacktestError::PositionFlat`] if
    /// still open.
    pub fn exit_price(&self) -> Result<f64> {
        self.exit_price
            .ok_or_else(|| BacktestError::PositionFlat(self.symbol.clone()))
    }

    /// R-multiple: realized (or mark-to-market) P&L expressed in units of
    /// initial risk, when a stop price is set. `None` if no stop was set.
    pub fn r_multiple(&self) -> Option<f64> {
        let stop = self.stop_loss_price?;
        let risk = (self.entry_price - stop).abs();
        if risk == 0.0 {
            return None;
        }
        let reference = self
            .exit_price
            .or_else(|| self.history.last().map(|b| b.close))?;
        let pnl = (reference - self.entry_price) * self.direction.sign();
        Some(pnl / risk)
    }
}
