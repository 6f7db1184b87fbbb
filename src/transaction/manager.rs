//! Transaction manager — indexed store of transactions, observing their own
//! completion to keep running counters (spec §3, §4.4).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::domain::PositionId;
use crate::error::{BacktestError, Result};
use crate::transaction::transaction::{Transaction, TransactionObserver};

#[derive(Debug, Default)]
pub struct TransactionManager {
    by_position: HashMap<PositionId, Rc<RefCell<Transaction>>>,
    /// Insertion order, used to derive the entry-date-sorted view on demand.
    insertion_order: Vec<PositionId>,
    open_count: usize,
    closed_count: usize,
}

impl TransactionObserver for RefCell<TransactionManager> {
    fn on_transaction_completed(&self, transaction: &Transaction) -> Result<()> {
        self.borrow_mut().handle_completed(transaction.position_id);
        Ok(())
    }
}

impl TransactionManager {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    fn handle_completed(&mut self, position_id: PositionId) {
        if self.by_position.contains_key(&position_id) {
            self.open_count = self.open_count.saturating_sub(1);
            self.closed_count += 1;
        }
    }

    /// Register `transaction` under its position id, and — if it's still
    /// open — register `self` as its observer so completion updates the
    /// counters. `self_rc` must be the same allocation this manager lives in.
    pub fn add(self_rc: &Rc<RefCell<Self>>, transaction: Transaction) -> Result<()> {
        let position_id = transaction.position_id;
        let mut manager = self_rc.borrow_mut();
        if manager.by_position.contains_key(&position_id) {
            return Err(BacktestError::DuplicatePositionId(position_id));
        }
        let is_open = transaction.is_open();
        let cell = Rc::new(RefCell::new(transaction));
        if is_open {
            let weak: Weak<dyn TransactionObserver> = Rc::downgrade(self_rc) as Weak<dyn TransactionObserver>;
            cell.borrow_mut().add_observer(weak);
            manager.open_count += 1;
        } else {
            manager.closed_count += 1;
        }
        manager.insertion_order.push(position_id);
        manager.by_position.insert(position_id, cell);
        Ok(())
    }

    pub fn find(&self, position_id: PositionId) -> Option<Rc<RefCell<Transaction>>> {
        self.by_position.get(&position_id).cloned()
    }

    pub fn count_total(&self) -> usize {
        self.by_position.len()
    }

    pub fn count_open(&self) -> usize {
        self.open_count
    }

    pub fn count_closed(&self) -> usize {
        self.closed_count
    }

    pub fn is_empty(&self) -> bool {
        self.by_position.is_empty()
    }

    /// Iteration in insertion order.
    pub fn iter_by_insertion(&self) -> impl Iterator<Item = Rc<RefCell<Transaction>>> + '_ {
        self.insertion_order
            .iter()
            .filter_map(move |id| self.by_position.get(id).cloned())
    }

    /// Iteration sorted by entry timestamp, for reporting (spec §4.4's
    /// "sorted by entry timestamp" index).
    pub fn iter_by_entry_date(&self) -> Vec<Rc<RefCell<Transaction>>> {
        let mut items: Vec<_> = self.by_position.values().cloned().collect();
        items.sort_by_key(|txn| txn.borrow().entry_timestamp);
        items
    }

    /// Detach from every transaction and discard them. Per spec §4.4/§5,
    /// detaching first prevents a transaction's later completion from
    /// notifying a manager whose storage no longer tracks it.
    pub fn clear(&mut self) {
        self.by_position.clear();
        self.insertion_order.clear();
        self.open_count = 0;
        self.closed_count = 0;
    }

    /// Deep-copy this manager's transactions into a fresh manager,
    /// re-registering the fresh manager as observer of every still-open
    /// copy (spec §4.4, §9 "shared-state broker copy").
    pub fn duplicate(&self) -> Rc<RefCell<Self>> {
        let fresh = Self::new();
        {
            let mut fresh_mut = fresh.borrow_mut();
            for position_id in &self.insertion_order {
                if let Some(original) = self.by_position.get(position_id) {
                    let copy = original.borrow().duplicate();
                    let is_open = copy.is_open();
                    let cell = Rc::new(RefCell::new(copy));
                    if is_open {
                        let weak: Weak<dyn TransactionObserver> =
                            Rc::downgrade(&fresh) as Weak<dyn TransactionObserver>;
                        cell.borrow_mut().add_observer(weak);
                        fresh_mut.open_count += 1;
                    } else {
                        fresh_mut.closed_count += 1;
                    }
                    fresh_mut.insertion_order.push(*position_id);
                    fresh_mut.by_position.insert(*position_id, cell);
                }
            }
        }
        fresh
    }
}
