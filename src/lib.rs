//! Event-driven backtesting core: order lifecycle, broker, positions,
//! transactions, and a bar-driven simulation driver.
//!
//! The object graph is single-threaded and built on `Rc<RefCell<_>>` with
//! `Weak` observer references throughout — a strategy owns a broker, the
//! broker owns a transaction manager and a dispatcher, and fills propagate
//! back up through non-owning observer callbacks rather than return values.

pub mod backtest;
pub mod broker;
pub mod dispatcher;
pub mod domain;
pub mod driver;
pub mod error;
pub mod order;
pub mod pattern;
pub mod portfolio;
pub mod position;
pub mod returns;
pub mod stats;
pub mod strategy;
pub mod tick;
pub mod transaction;

pub use backtest::Backtest;
pub use broker::Broker;
pub use driver::{BacktestDriver, Timeframe};
pub use error::{BacktestError, Result};
pub use strategy::{Strategy, StrategyOptions};
