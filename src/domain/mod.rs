//! Core domain types shared across the crate: identifiers, bars, and
//! security attributes. Orders, positions, and transactions get their own
//! top-level modules since each carries substantial behavior of its own.

mod bar;
mod ids;
mod instrument;

pub use bar::{at_default_bar_time, default_bar_time, Bar, Timestamp};
pub use ids::{OrderId, PositionId, PositionIdGen};
pub use instrument::{round_half_to_even, AssetClass, SecurityAttributes};
