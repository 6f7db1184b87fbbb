//! Transaction — entry order + position + (eventual) exit order (spec §3,
//! §4.4).

use std::rc::Weak;

use crate::domain::{OrderId, PositionId, Timestamp};
use crate::error::{BacktestError, Result};
use crate::order::Order;
use crate::position::{Direction, PositionUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Open,
    Complete,
}

/// Non-owning observer of a transaction's Open → Complete transition.
pub trait TransactionObserver {
    fn on_transaction_completed(&self, transaction: &Transaction) -> Result<()>;
}

pub struct Transaction {
    pub position_id: PositionId,
    pub entry_order_id: OrderId,
    pub exit_order_id: Option<OrderId>,
    pub symbol: String,
    pub direction: Direction,
    pub entry_timestamp: Timestamp,
    pub status: TransactionStatus,
    observers: Vec<Weak<dyn TransactionObserver>>,
}

impl Transaction {
    /// Construct a transaction linking `entry_order` to `unit`. Fails with
    /// [`BacktestError::TransactionInvariantViolation`] if the entry order's
    /// symbol/direction doesn't match the position's.
    pub fn new(entry_order: &Order, unit: &PositionUnit) -> Result<Self> {
        let order_direction = match entry_order.kind {
            crate::order::OrderKind::MarketEntryLong => Direction::Long,
            crate::order::OrderKind::MarketEntryShort => Direction::Short,
            _ => {
                return Err(BacktestError::TransactionInvariantViolation(unit.id));
            }
        };
        if entry_order.symbol != unit.symbol || order_direction != unit.direction {
            return Err(BacktestError::TransactionInvariantViolation(unit.id));
        }
        Ok(Self {
            position_id: unit.id,
            entry_order_id: entry_order.id,
            exit_order_id: None,
            symbol: unit.symbol.clone(),
            direction: unit.direction,
            entry_timestamp: unit.entry_timestamp,
            status: TransactionStatus::Open,
            observers: Vec::new(),
        })
    }

    pub fn add_observer(&mut self, observer: Weak<dyn TransactionObserver>) {
        self.observers.push(observer);
    }

    pub fn is_open(&self) -> bool {
        self.status == TransactionStatus::Open
    }

    /// Open → Complete on an exit fill. Notifies observers; a no-op if
    /// already complete (mirrors the dispatcher's "exit on already-closed
    /// position" cancellation path, which must not double-complete).
    pub fn complete(&mut self, exit_order_id: OrderId) -> Result<()> {
        if self.status == TransactionStatus::Complete {
            return Ok(());
        }
        self.exit_order_id = Some(exit_order_id);
        self.status = TransactionStatus::Complete;
        let mut first_err = None;
        for observer in &self.observers {
            if let Some(observer) = observer.upgrade() {
                if let Err(err) = observer.on_transaction_completed(self) {
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// "Copy" per spec §4.4: a new transaction referring to the same entry
    /// order/position, with independent state mirroring this one, but no
    /// observers — wiring is rebuilt by whoever re-registers it (the
    /// transaction manager), never carried along automatically.
    pub fn duplicate(&self) -> Self {
        Self {
            position_id: self.position_id,
            entry_order_id: self.entry_order_id,
            exit_order_id: self.exit_order_id,
            symbol: self.symbol.clone(),
            direction: self.direction,
            entry_timestamp: self.entry_timestamp,
            status: self.status,
            observers: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::at_default_bar_time;
    use crate::order::OrderKind;
    use crate::position::PositionUnit;

    fn bar(d: u32, price: f64) -> crate::domain::Bar {
        crate::domain::Bar::new(
            "SPY",
            at_default_bar_time(chrono::NaiveDate::from_ymd_opt(2024, 1, d).unwrap()),
            price,
            price + 1.0,
            price - 1.0,
            price,
            1_000,
        )
        .unwrap()
    }

    #[test]
    fn mismatched_direction_is_rejected() {
        let order = Order::new(
            "SPY",
            1,
            bar(1, 100.0).timestamp,
            OrderKind::MarketEntryLong,
            None,
            None,
            None,
            None,
        )
        .unwrap();
        let unit = PositionUnit::new(
            PositionId(0),
            "SPY",
            Direction::Short,
            bar(1, 100.0),
            100.0,
            1,
            None,
            None,
        );
        let err = Transaction::new(&order, &unit).unwrap_err();
        assert!(matches!(err, BacktestError::TransactionInvariantViolation(_)));
    }

    #[test]
    fn duplicate_carries_no_observers() {
        let order = Order::new(
            "SPY",
            1,
            bar(1, 100.0).timestamp,
            OrderKind::MarketEntryLong,
            None,
            None,
            None,
            None,
        )
        .unwrap();
        let unit = PositionUnit::new(
            PositionId(0),
            "SPY",
            Direction::Long,
            bar(1, 100.0),
            100.0,
            1,
            None,
            None,
        );
        let txn = Transaction::new(&order, &unit).unwrap();
        let copy = txn.duplicate();
        assert!(copy.observers.is_empty());
        assert_eq!(copy.status, txn.status);
    }
}
