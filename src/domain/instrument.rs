//! Instrument/security attributes and tick-rounding primitives.

use serde::{Deserialize, Serialize};

/// Asset classification, used by the tick-size policies (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetClass {
    Equity,
    Etf,
    Future,
    Option,
}

impl AssetClass {
    pub fn is_equity_like(self) -> bool {
        matches!(self, AssetClass::Equity | AssetClass::Etf | AssetClass::Option)
    }
}

/// Static attributes of a tradable security, consumed by the tick-size
/// policy and by the broker's rounding of computed limit/stop prices
/// (spec §6 "Security attributes provider").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAttributes {
    pub symbol: String,
    pub asset_class: AssetClass,
    /// Native minimum price increment before any policy override.
    pub native_tick: f64,
    /// Big-point value (futures contract multiplier); 1.0 for equities.
    pub big_point_value: f64,
    /// Whether this security's historical prices are split-adjusted
    /// (consumed by [`crate::tick::TickPolicy::SubPennyRule`]).
    pub split_adjusted: bool,
}

impl SecurityAttributes {
    pub fn us_equity(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class: AssetClass::Equity,
            native_tick: 0.01,
            big_point_value: 1.0,
            split_adjusted: true,
        }
    }

    pub fn future(symbol: impl Into<String>, native_tick: f64, big_point_value: f64) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class: AssetClass::Future,
            native_tick,
            big_point_value,
            split_adjusted: true,
        }
    }

    /// Half of the native tick — used as the rounding resolution for
    /// derived limit/stop prices (spec §4.6, "tick-divided-by-two").
    pub fn half_tick(&self) -> f64 {
        self.native_tick / 2.0
    }
}

/// Round `price` to the nearest multiple of `resolution` using
/// round-half-to-even (banker's rounding). A general-purpose building
/// block; [`crate::tick::round_to_tick`] composes it with half-tick
/// tie-breaking to implement spec §4.6's full rounding rule.
pub fn round_half_to_even(price: f64, resolution: f64) -> f64 {
    if resolution <= 0.0 || price.is_nan() {
        return price;
    }
    let units = price / resolution;
    let rounded = round_ties_even(units);
    rounded * resolution
}

pub(crate) fn round_ties_even(x: f64) -> f64 {
    let floor = x.floor();
    let diff = x - floor;
    if diff < 0.5 {
        floor
    } else if diff > 0.5 {
        floor + 1.0
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}
