//! Order — immutable intent plus a one-shot state machine (spec §3, §4.1).

use std::rc::Weak;

use serde::{Deserialize, Serialize};

use crate::domain::{Bar, OrderId, Timestamp};
use crate::error::{BacktestError, Result};
use crate::order::kind::OrderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Executed,
    Canceled,
}

/// Non-owning observer of an order's terminal transition. Implementors
/// typically wrap their mutable state in a `RefCell` internally so this
/// trait's methods can take `&self` (spec §3's "non-owning observer"
/// requirement rules out `&mut self` here — a `Weak` reference can't be
/// borrowed mutably without one).
pub trait OrderObserver {
    fn on_order_executed(&self, order: &Order) -> Result<()>;
    fn on_order_canceled(&self, order: &Order) -> Result<()>;
}

/// A single order: immutable attributes plus the fill/cancel state machine.
#[derive(Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub units: u32,
    pub timestamp: Timestamp,
    pub kind: OrderKind,
    pub limit_price: Option<f64>,
    pub stop_price: Option<f64>,
    /// Entry orders only: the percentage used to derive the paired
    /// stop-loss exit once the entry fills.
    pub stop_loss_pct: Option<f64>,
    /// Entry orders only: the percentage used to derive the paired
    /// profit-target exit once the entry fills.
    pub profit_target_pct: Option<f64>,
    pub status: OrderStatus,
    pub filled_at: Option<Timestamp>,
    pub filled_price: Option<f64>,

    #[serde(skip)]
    observers: Vec<Weak<dyn OrderObserver>>,
}

impl std::fmt::Debug for Order {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Order")
            .field("id", &self.id)
            .field("symbol", &self.symbol)
            .field("units", &self.units)
            .field("timestamp", &self.timestamp)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .finish()
    }
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        units: u32,
        timestamp: Timestamp,
        kind: OrderKind,
        limit_price: Option<f64>,
        stop_price: Option<f64>,
        stop_loss_pct: Option<f64>,
        profit_target_pct: Option<f64>,
    ) -> Result<Self> {
        if units == 0 {
            return Err(BacktestError::OrderConstructionInvalid(
                "unit count must be > 0".into(),
            ));
        }
        Ok(Self {
            id: OrderId::next(),
            symbol: symbol.into(),
            units,
            timestamp,
            kind,
            limit_price,
            stop_price,
            stop_loss_pct,
            profit_target_pct,
            status: OrderStatus::Pending,
            filled_at: None,
            filled_price: None,
            observers: Vec::new(),
        })
    }

    pub fn add_observer(&mut self, observer: Weak<dyn OrderObserver>) {
        self.observers.push(observer);
    }

    /// Replace the observer list wholesale with a single `observer` (spec §4.6,
    /// §9 "shared-state broker copy"). Used when a broker is duplicated: its
    /// cloned orders must stop pointing at the source broker and point at the
    /// copy instead, or the copy is silently inert.
    pub fn retarget_observers(&mut self, observer: Weak<dyn OrderObserver>) {
        self.observers = vec![observer];
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    pub fn is_terminal(&self) -> bool {
        self.status != OrderStatus::Pending
    }

    /// Evaluate this order's fill predicate and price against `bar`, but do
    /// not mutate state — used by the dispatcher to decide whether to call
    /// [`Self::execute`] or [`Self::cancel`].
    pub fn evaluate(&self, bar: &Bar) -> Option<f64> {
        if !self.kind.fill_predicate(bar, self.limit_price, self.stop_price) {
            return None;
        }
        self.kind.fill_price(bar, self.limit_price, self.stop_price)
    }

    /// Transition Pending → Executed at `timestamp`/`price`, then notify
    /// observers. Fails with [`BacktestError::OrderAlreadyTerminal`] if not
    /// pending, or [`BacktestError::OrderNotExecuted`] if `timestamp`/`price`
    /// violate the order's own invariants.
    pub fn execute(&mut self, timestamp: Timestamp, price: f64) -> Result<()> {
        if self.is_terminal() {
            return Err(BacktestError::OrderAlreadyTerminal(self.id));
        }
        let timestamp_ok = if self.kind.is_market() {
            timestamp >= self.timestamp
        } else {
            timestamp > self.timestamp
        };
        if !timestamp_ok
            || !self
                .kind
                .validates_fill_price(price, self.limit_price, self.stop_price)
        {
            self.status = OrderStatus::Canceled;
            self.filled_at = Some(timestamp);
            return Err(BacktestError::OrderNotExecuted {
                order: self.id,
                fill_price: price,
            });
        }
        self.status = OrderStatus::Executed;
        self.filled_at = Some(timestamp);
        self.filled_price = Some(price);
        self.notify_executed()
    }

    /// Transition Pending → Canceled, then notify observers.
    pub fn cancel(&mut self, timestamp: Timestamp) -> Result<()> {
        if self.is_terminal() {
            return Err(BacktestError::OrderAlreadyTerminal(self.id));
        }
        self.status = OrderStatus::Canceled;
        self.filled_at = Some(timestamp);
        self.notify_canceled()
    }

    fn notify_executed(&self) -> Result<()> {
        let mut first_err = None;
        for observer in &self.observers {
            if let Some(observer) = observer.upgrade() {
                if let Err(err) = observer.on_order_executed(self) {
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn notify_canceled(&self) -> Result<()> {
        let mut first_err = None;
        for observer in &self.observers {
            if let Some(observer) = observer.upgrade() {
                if let Err(err) = observer.on_order_canceled(self) {
                    first_err.get_or_insert(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::at_default_bar_time;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ts(d: u32) -> Timestamp {
        at_default_bar_time(chrono::NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
    }

    struct Recorder {
        executed: RefCell<Vec<OrderId>>,
        canceled: RefCell<Vec<OrderId>>,
        fail: bool,
    }

    impl OrderObserver for Recorder {
        fn on_order_executed(&self, order: &Order) -> Result<()> {
            self.executed.borrow_mut().push(order.id);
            if self.fail {
                Err(BacktestError::OrderConstructionInvalid("boom".into()))
            } else {
                Ok(())
            }
        }

        fn on_order_canceled(&self, order: &Order) -> Result<()> {
            self.canceled.borrow_mut().push(order.id);
            Ok(())
        }
    }

    #[test]
    fn zero_units_is_rejected() {
        let err = Order::new(
            "SPY",
            0,
            ts(1),
            OrderKind::MarketEntryLong,
            None,
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, BacktestError::OrderConstructionInvalid(_)));
    }

    #[test]
    fn execute_transitions_and_notifies_once() {
        let mut order = Order::new(
            "SPY",
            1,
            ts(1),
            OrderKind::MarketEntryLong,
            None,
            None,
            None,
            None,
        )
        .unwrap();
        let observer = Rc::new(Recorder {
            executed: RefCell::new(Vec::new()),
            canceled: RefCell::new(Vec::new()),
            fail: false,
        });
        order.add_observer(Rc::downgrade(&observer) as Weak<dyn OrderObserver>);

        order.execute(ts(2), 100.0).unwrap();
        assert_eq!(order.status, OrderStatus::Executed);
        assert_eq!(observer.executed.borrow().as_slice(), &[order.id]);

        let err = order.execute(ts(3), 101.0).unwrap_err();
        assert!(matches!(err, BacktestError::OrderAlreadyTerminal(_)));
    }

    #[test]
    fn all_observers_notified_even_if_one_errors() {
        let mut order = Order::new(
            "SPY",
            1,
            ts(1),
            OrderKind::MarketEntryLong,
            None,
            None,
            None,
            None,
        )
        .unwrap();
        let failing = Rc::new(Recorder {
            executed: RefCell::new(Vec::new()),
            canceled: RefCell::new(Vec::new()),
            fail: true,
        });
        let ok = Rc::new(Recorder {
            executed: RefCell::new(Vec::new()),
            canceled: RefCell::new(Vec::new()),
            fail: false,
        });
        order.add_observer(Rc::downgrade(&failing) as Weak<dyn OrderObserver>);
        order.add_observer(Rc::downgrade(&ok) as Weak<dyn OrderObserver>);

        let result = order.execute(ts(2), 100.0);
        assert!(result.is_err());
        assert_eq!(failing.executed.borrow().len(), 1);
        assert_eq!(ok.executed.borrow().len(), 1);
    }

    #[test]
    fn limit_exit_sell_rejects_price_below_limit() {
        let mut order = Order::new(
            "SPY",
            1,
            ts(1),
            OrderKind::LimitExitSell,
            Some(110.0),
            None,
            None,
            None,
        )
        .unwrap();
        let err = order.execute(ts(2), 109.0).unwrap_err();
        assert!(matches!(err, BacktestError::OrderNotExecuted { .. }));
        assert_eq!(order.status, OrderStatus::Canceled);
    }
}
