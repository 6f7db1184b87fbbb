//! Instrument position — the aggregate of 0..N open units sharing one
//! symbol and direction (spec §3, §4.3).

use crate::error::{BacktestError, Result};
use crate::position::direction::Direction;
use crate::position::unit::PositionUnit;

#[derive(Debug, Default, Clone)]
pub struct InstrumentPosition {
    symbol: String,
    units: Vec<PositionUnit>,
}

impl InstrumentPosition {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            units: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// `Flat` iff there are no open units, else the shared direction of all
    /// open units.
    pub fn direction(&self) -> Direction {
        self.units.first().map(|u| u.direction).unwrap_or(Direction::Flat)
    }

    pub fn is_flat(&self) -> bool {
        self.units.is_empty()
    }

    pub fn num_open_units(&self) -> usize {
        self.units.len()
    }

    /// Append a new unit. Fails with [`BacktestError::DirectionConflict`] if
    /// the position is already open in the opposite direction.
    pub fn add_unit(&mut self, unit: PositionUnit) -> Result<()> {
        if let Some(existing) = self.units.first() {
            if existing.direction != unit.direction {
                return Err(BacktestError::DirectionConflict {
                    symbol: self.symbol.clone(),
                    timestamp: unit.entry_timestamp,
                    existing: existing.direction,
                });
            }
        }
        self.units.push(unit);
        Ok(())
    }

    /// 1-based lookup, matching the external numbering convention (spec
    /// §4.3).
    pub fn unit(&self, index: usize) -> Result<&PositionUnit> {
        self.units.get(index.wrapping_sub(1)).ok_or_else(|| BacktestError::UnknownUnit {
            symbol: self.symbol.clone(),
            index,
            open_units: self.units.len(),
        })
    }

    pub fn unit_mut(&mut self, index: usize) -> Result<&mut PositionUnit> {
        let open_units = self.units.len();
        let symbol = self.symbol.clone();
        self.units
            .get_mut(index.wrapping_sub(1))
            .ok_or(BacktestError::UnknownUnit { symbol, index, open_units })
    }

    pub fn units(&self) -> &[PositionUnit] {
        &self.units
    }

    /// Remove the 1-based `index`th unit and return it (closed). Remaining
    /// units keep their original relative order, so the surviving units are
    /// contiguously renumbered 1..k by the new slice length.
    pub fn remove_unit(&mut self, index: usize) -> Result<PositionUnit> {
        if index == 0 || index > self.units.len() {
            return Err(BacktestError::UnknownUnit {
                symbol: self.symbol.clone(),
                index,
                open_units: self.units.len(),
            });
        }
        Ok(self.units.remove(index - 1))
    }

    /// Remove and return the unit with the given position id, wherever it
    /// currently sits in the list. Used by the broker, which addresses
    /// units by position id rather than by their (renumbered-on-removal)
    /// 1-based index.
    pub fn remove_by_position_id(&mut self, id: crate::domain::PositionId) -> Result<PositionUnit> {
        let index = self
            .units
            .iter()
            .position(|u| u.id == id)
            .ok_or_else(|| BacktestError::UnknownUnit {
                symbol: self.symbol.clone(),
                index: 0,
                open_units: self.units.len(),
            })?;
        Ok(self.units.remove(index))
    }

    /// Append `bar` to every open unit's history.
    pub fn observe_bar(&mut self, bar: crate::domain::Bar) -> Result<()> {
        for unit in &mut self.units {
            unit.observe_bar(bar.clone())?;
        }
        Ok(())
    }
}
