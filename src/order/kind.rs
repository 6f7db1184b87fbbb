//! The closed sum of order kinds (spec §3, §4.1). Concrete fill behavior
//! differs only in the fill predicate, the computed fill price, and the
//! allowed state transitions — all driven off `kind` rather than a trait
//! hierarchy per side.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    MarketEntryLong,
    MarketEntryShort,
    MarketExitSell,
    MarketExitCover,
    LimitExitSell,
    LimitExitCover,
    StopExitSell,
    StopExitCover,
}

/// Same-bar processing priority: market=1, stop=5, limit=10, lower first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(pub u8);

impl OrderKind {
    pub fn priority(self) -> Priority {
        match self {
            OrderKind::MarketEntryLong
            | OrderKind::MarketEntryShort
            | OrderKind::MarketExitSell
            | OrderKind::MarketExitCover => Priority(1),
            OrderKind::StopExitSell | OrderKind::StopExitCover => Priority(5),
            OrderKind::LimitExitSell | OrderKind::LimitExitCover => Priority(10),
        }
    }

    pub fn is_entry(self) -> bool {
        matches!(self, OrderKind::MarketEntryLong | OrderKind::MarketEntryShort)
    }

    pub fn is_exit(self) -> bool {
        !self.is_entry()
    }

    pub fn is_market(self) -> bool {
        matches!(
            self,
            OrderKind::MarketEntryLong
                | OrderKind::MarketEntryShort
                | OrderKind::MarketExitSell
                | OrderKind::MarketExitCover
        )
    }

    pub fn is_stop(self) -> bool {
        matches!(self, OrderKind::StopExitSell | OrderKind::StopExitCover)
    }

    pub fn is_limit(self) -> bool {
        matches!(self, OrderKind::LimitExitSell | OrderKind::LimitExitCover)
    }

    /// Whether the order's fill predicate is satisfied against `bar`
    /// (spec §4.1's fill predicate table), given the order's limit/stop
    /// price where applicable.
    pub fn fill_predicate(self, bar: &Bar, limit: Option<f64>, stop: Option<f64>) -> bool {
        match self {
            OrderKind::MarketEntryLong
            | OrderKind::MarketEntryShort
            | OrderKind::MarketExitSell
            | OrderKind::MarketExitCover => true,
            OrderKind::LimitExitSell => limit.is_some_and(|l| bar.high >= l),
            OrderKind::LimitExitCover => limit.is_some_and(|l| bar.low <= l),
            OrderKind::StopExitSell => stop.is_some_and(|s| bar.low <= s),
            OrderKind::StopExitCover => stop.is_some_and(|s| bar.high >= s),
        }
    }

    /// Fill price for the kind against `bar`, given the order's limit/stop
    /// price. Callers must have already confirmed [`Self::fill_predicate`].
    pub fn fill_price(self, bar: &Bar, limit: Option<f64>, stop: Option<f64>) -> Option<f64> {
        match self {
            OrderKind::MarketEntryLong
            | OrderKind::MarketEntryShort
            | OrderKind::MarketExitSell
            | OrderKind::MarketExitCover => Some(bar.open),
            OrderKind::LimitExitSell => limit.map(|l| if bar.open >= l { bar.open } else { l }),
            OrderKind::LimitExitCover => limit.map(|l| if bar.open <= l { bar.open } else { l }),
            OrderKind::StopExitSell => stop.map(|s| if bar.open <= s { bar.open } else { s }),
            OrderKind::StopExitCover => stop.map(|s| if bar.open >= s { bar.open } else { s }),
        }
    }

    /// Side-specific validation of a candidate fill price (spec §4.1):
    /// sell-limit ≥ limit, cover-limit ≤ limit, sell-stop ≤ stop, cover-stop ≥ stop.
    /// Market orders have no price predicate to validate.
    pub fn validates_fill_price(self, price: f64, limit: Option<f64>, stop: Option<f64>) -> bool {
        match self {
            OrderKind::MarketEntryLong
            | OrderKind::MarketEntryShort
            | OrderKind::MarketExitSell
            | OrderKind::MarketExitCover => true,
            OrderKind::LimitExitSell => limit.is_some_and(|l| price >= l),
            OrderKind::LimitExitCover => limit.is_some_and(|l| price <= l),
            OrderKind::StopExitSell => stop.is_some_and(|s| price <= s),
            OrderKind::StopExitCover => stop.is_some_and(|s| price >= s),
        }
    }
}
