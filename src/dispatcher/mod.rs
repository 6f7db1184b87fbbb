//! Order dispatcher — per-kind pending-order queues plus per-bar fill
//! evaluation in a fixed phase order (spec §3, §4.5).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::domain::{Bar, Timestamp};
use crate::error::Result;
use crate::order::{Order, OrderKind};
use crate::position::InstrumentPosition;

/// Fixed processing order: exits before entries on the same bar prevent
/// spurious overlap; stops before limits match the conventional worst-case
/// assumption when both could trigger on the same bar (spec §4.5).
const PHASE_ORDER: [OrderKind; 8] = [
    OrderKind::MarketExitSell,
    OrderKind::MarketExitCover,
    OrderKind::MarketEntryLong,
    OrderKind::MarketEntryShort,
    OrderKind::StopExitSell,
    OrderKind::StopExitCover,
    OrderKind::LimitExitSell,
    OrderKind::LimitExitCover,
];

#[derive(Default)]
pub struct OrderDispatcher {
    queues: HashMap<OrderKind, Vec<Rc<RefCell<Order>>>>,
    sorted_view: RefCell<Option<Vec<Rc<RefCell<Order>>>>>,
}

impl OrderDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_order(&mut self, order: Rc<RefCell<Order>>) {
        let kind = order.borrow().kind;
        self.queues.entry(kind).or_default().push(order);
        self.sorted_view.replace(None);
    }

    /// Lazily-materialized view of every pending order across all eight
    /// queues, sorted by order timestamp. Rebuilt the first time this is
    /// read after an insertion (spec §9 "lazy sorted view").
    pub fn pending_orders_by_timestamp(&self) -> Vec<Rc<RefCell<Order>>> {
        if self.sorted_view.borrow().is_none() {
            let mut all: Vec<Rc<RefCell<Order>>> = self.queues.values().flatten().cloned().collect();
            all.sort_by_key(|o| o.borrow().timestamp);
            self.sorted_view.replace(Some(all));
        }
        self.sorted_view.borrow().clone().unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.queues.values().map(|q| q.len()).sum()
    }

    /// Evaluate every pending order against `fill_timestamp`, using
    /// `bars_at_fill` (the bar per symbol landing exactly at that
    /// timestamp, if any) and `positions` to decide flatness. Executes or
    /// cancels orders whose predicate resolves this bar; leaves the rest
    /// pending. Notification/error handling follows the order's own
    /// observer-notification rules (spec §4.1); the first error encountered
    /// across all orders processed this call is returned after every order
    /// has still been given a chance to transition.
    pub fn process_pending_orders(
        &mut self,
        fill_timestamp: Timestamp,
        bars_at_fill: &HashMap<String, Bar>,
        positions: &HashMap<String, InstrumentPosition>,
    ) -> Result<()> {
        let mut first_err = None;
        for kind in PHASE_ORDER {
            let Some(queue) = self.queues.get_mut(&kind) else {
                continue;
            };
            let mut remaining = Vec::with_capacity(queue.len());
            for order_rc in queue.drain(..) {
                let is_flat = {
                    let order = order_rc.borrow();
                    positions
                        .get(&order.symbol)
                        .map(|p| p.is_flat())
                        .unwrap_or(true)
                        && order.kind.is_exit()
                };
                let order_timestamp = order_rc.borrow().timestamp;

                if order_timestamp == fill_timestamp && is_flat {
                    if let Err(e) = order_rc.borrow_mut().cancel(fill_timestamp) {
                        first_err.get_or_insert(e);
                    }
                    continue;
                }

                if fill_timestamp > order_timestamp {
                    let symbol = order_rc.borrow().symbol.clone();
                    let Some(bar) = bars_at_fill.get(&symbol) else {
                        remaining.push(order_rc);
                        continue;
                    };
                    let still_flat = order_rc.borrow().kind.is_exit()
                        && positions.get(&symbol).map(|p| p.is_flat()).unwrap_or(true);
                    if still_flat {
                        if let Err(e) = order_rc.borrow_mut().cancel(fill_timestamp) {
                            first_err.get_or_insert(e);
                        }
                        continue;
                    }
                    let evaluated = order_rc.borrow().evaluate(bar);
                    match evaluated {
                        Some(price) => {
                            if let Err(e) = order_rc.borrow_mut().execute(fill_timestamp, price) {
                                first_err.get_or_insert(e);
                            }
                        }
                        None => {
                            if let Err(e) = order_rc.borrow_mut().cancel(fill_timestamp) {
                                first_err.get_or_insert(e);
                            }
                        }
                    }
                    continue;
                }

                remaining.push(order_rc);
            }
            self.queues.insert(kind, remaining);
        }
        self.sorted_view.replace(None);
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
