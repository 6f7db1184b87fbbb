//! Position model: a single open leg ([`unit::PositionUnit`]) and the
//! per-symbol aggregate of pyramided legs ([`instrument_position::InstrumentPosition`])
//! (spec §3, §4.2, §4.3).

mod direction;
mod instrument_position;
mod unit;

pub use direction::Direction;
pub use instrument_position::InstrumentPosition;
pub use unit::PositionUnit;
