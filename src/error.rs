//! Crate-wide error type.
//!
//! One [`BacktestError`] variant per terminal condition named in the
//! design's error table; every fallible operation in this crate returns
//! [`Result<T>`].

use thiserror::Error;

use crate::domain::{OrderId, PositionId, Timestamp};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BacktestError {
    #[error("bar invariant violated: low {low} > min(open, close) or high {high} < max(open, close) (open={open}, close={close})")]
    BarInvariantViolation {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("order construction invalid: {0}")]
    OrderConstructionInvalid(String),

    #[error("order {order} not executed: fill price {fill_price} violates side predicate")]
    OrderNotExecuted { order: OrderId, fill_price: f64 },

    #[error("order {0} already in a terminal state")]
    OrderAlreadyTerminal(OrderId),

    #[error("transaction invariant violated: entry order symbol/direction does not match position for {0}")]
    TransactionInvariantViolation(PositionId),

    #[error("transaction for position {0} already registered")]
    DuplicatePositionId(PositionId),

    #[error("entry for {symbol} at {timestamp} conflicts with existing {existing:?} position")]
    DirectionConflict {
        symbol: String,
        timestamp: Timestamp,
        existing: crate::position::Direction,
    },

    #[error("unit index {index} out of range for {symbol} ({open_units} open units)")]
    UnknownUnit {
        symbol: String,
        index: usize,
        open_units: usize,
    },

    #[error("{0} has no open position")]
    PositionFlat(String),

    #[error("broker configuration invalid: {0}")]
    BrokerConfig(String),

    #[error("unsupported timeframe/range combination: {0}")]
    UnsupportedTimeframe(String),

    #[error("driver was given an empty strategy list")]
    NoStrategies,

    #[error("zero-duration range for annualized-trade query")]
    ZeroDuration,
}

pub type Result<T> = std::result::Result<T, BacktestError>;
