//! Broker — the mediator a strategy talks to: order creation, fill
//! routing into positions/transactions, and the query surface over both
//! (spec §3, §4.6).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::dispatcher::OrderDispatcher;
use crate::domain::{Bar, OrderId, PositionId, PositionIdGen, Timestamp};
use crate::error::{BacktestError, Result};
use crate::order::{Order, OrderKind, OrderObserver};
use crate::position::{Direction, InstrumentPosition, PositionUnit};
use crate::portfolio::Portfolio;
use crate::tick::{round_to_tick, TickPolicy};
use crate::transaction::{Transaction, TransactionManager};

/// Which unit(s) of a symbol's position an exit order targets.
#[derive(Debug, Clone, Copy)]
enum ExitTarget {
    Unit(PositionId),
}

pub struct Broker {
    portfolio: Rc<RefCell<Portfolio>>,
    tick_policy: TickPolicy,
    dispatcher: OrderDispatcher,
    transaction_manager: Rc<RefCell<TransactionManager>>,
    positions: HashMap<String, InstrumentPosition>,
    closed_units: HashMap<String, Vec<PositionUnit>>,
    position_id_gen: PositionIdGen,
    exit_targets: HashMap<OrderId, ExitTarget>,
}

impl OrderObserver for RefCell<Broker> {
    fn on_order_executed(&self, order: &Order) -> Result<()> {
        self.borrow_mut().handle_executed(order)
    }

    fn on_order_canceled(&self, order: &Order) -> Result<()> {
        self.borrow_mut().handle_canceled(order);
        Ok(())
    }
}

impl Broker {
    /// Construct a broker over `portfolio`. Non-owning observer wiring is
    /// set up lazily as orders/transactions are created, so construction
    /// itself cannot fail on observer grounds; it still validates that a
    /// portfolio handle was actually supplied (spec §4.6, "Broker
    /// construction requires a non-null portfolio").
    pub fn new(portfolio: Option<Rc<RefCell<Portfolio>>>) -> Result<Rc<RefCell<Self>>> {
        let portfolio = portfolio.ok_or_else(|| BacktestError::BrokerConfig("portfolio is required".into()))?;
        Ok(Rc::new(RefCell::new(Self {
            portfolio,
            tick_policy: TickPolicy::NoFractions,
            dispatcher: OrderDispatcher::new(),
            transaction_manager: TransactionManager::new(),
            positions: HashMap::new(),
            closed_units: HashMap::new(),
            position_id_gen: PositionIdGen::default(),
            exit_targets: HashMap::new(),
        })))
    }

    pub fn with_tick_policy(mut self, policy: TickPolicy) -> Self {
        self.tick_policy = policy;
        self
    }

    pub fn transaction_manager(&self) -> Rc<RefCell<TransactionManager>> {
        self.transaction_manager.clone()
    }

    pub fn position(&self, symbol: &str) -> Option<&InstrumentPosition> {
        self.positions.get(symbol)
    }

    pub fn num_open_units(&self, symbol: &str) -> usize {
        self.positions.get(symbol).map(|p| p.num_open_units()).unwrap_or(0)
    }

    pub fn closed_units(&self, symbol: &str) -> &[PositionUnit] {
        self.closed_units.get(symbol).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Every closed unit across every symbol, in no particular order.
    pub fn all_closed_units(&self) -> impl Iterator<Item = &PositionUnit> {
        self.closed_units.values().flatten()
    }

    /// Every still-open unit across every symbol, in no particular order.
    pub fn all_open_units(&self) -> impl Iterator<Item = &PositionUnit> {
        self.positions.values().flat_map(|p| p.units().iter())
    }

    /// Whether `position_id` already has an exit order outstanding. A
    /// strategy should not stack a second exit order on a unit that still
    /// has one pending (spec §4.8) — once the first fills, the second would
    /// find the unit already removed and fail with `UnknownUnit`.
    pub fn has_pending_exit(&self, position_id: PositionId) -> bool {
        self.exit_targets
            .values()
            .any(|target| matches!(target, ExitTarget::Unit(id) if *id == position_id))
    }

    /// Closed units sorted by entry timestamp (spec §4.10/§6 "consecutive
    /// losses" walks realized trades in chronological order).
    pub fn closed_units_by_entry_date(&self) -> Vec<&PositionUnit> {
        let mut units: Vec<&PositionUnit> = self.all_closed_units().collect();
        units.sort_by_key(|u| u.entry_timestamp);
        units
    }

    fn register_order(self_rc: &Rc<RefCell<Self>>, order: Order) -> Rc<RefCell<Order>> {
        let cell = Rc::new(RefCell::new(order));
        let weak: Weak<dyn OrderObserver> = Rc::downgrade(self_rc) as Weak<dyn OrderObserver>;
        cell.borrow_mut().add_observer(weak);
        self_rc.borrow_mut().dispatcher.add_order(cell.clone());
        cell
    }

    fn effective_tick(&self, symbol: &str, timestamp: Timestamp, reference_price: f64) -> f64 {
        match self.portfolio.borrow().get(symbol) {
            Some(security) => self
                .tick_policy
                .effective_tick_at_price(timestamp.date(), &security.attributes, reference_price),
            None => 0.01,
        }
    }

    // --- Entries -----------------------------------------------------

    pub fn enter_long_on_open(
        self_rc: &Rc<RefCell<Self>>,
        symbol: &str,
        timestamp: Timestamp,
        units: u32,
        stop_loss_pct: Option<f64>,
        profit_target_pct: Option<f64>,
    ) -> Result<OrderId> {
        Self::enter_on_open(self_rc, symbol, timestamp, units, OrderKind::MarketEntryLong, stop_loss_pct, profit_target_pct)
    }

    pub fn enter_short_on_open(
        self_rc: &Rc<RefCell<Self>>,
        symbol: &str,
        timestamp: Timestamp,
        units: u32,
        stop_loss_pct: Option<f64>,
        profit_target_pct: Option<f64>,
    ) -> Result<OrderId> {
        Self::enter_on_open(self_rc, symbol, timestamp, units, OrderKind::MarketEntryShort, stop_loss_pct, profit_target_pct)
    }

    fn enter_on_open(
        self_rc: &Rc<RefCell<Self>>,
        symbol: &str,
        timestamp: Timestamp,
        units: u32,
        kind: OrderKind,
        stop_loss_pct: Option<f64>,
        profit_target_pct: Option<f64>,
    ) -> Result<OrderId> {
        let order = Order::new(symbol, units, timestamp, kind, None, None, stop_loss_pct, profit_target_pct)?;
        let id = order.id;
        Self::register_order(self_rc, order);
        Ok(id)
    }

    // --- Exits: all units ---------------------------------------------

    pub fn exit_long_all_units_on_open(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp) -> Result<Vec<OrderId>> {
        Self::exit_all_units(self_rc, symbol, timestamp, OrderKind::MarketExitSell, None, None)
    }

    pub fn exit_short_all_units_on_open(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp) -> Result<Vec<OrderId>> {
        Self::exit_all_units(self_rc, symbol, timestamp, OrderKind::MarketExitCover, None, None)
    }

    pub fn exit_long_all_units_at_limit(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp, price: f64) -> Result<Vec<OrderId>> {
        Self::exit_all_units(self_rc, symbol, timestamp, OrderKind::LimitExitSell, Some(price), None)
    }

    pub fn exit_short_all_units_at_limit(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp, price: f64) -> Result<Vec<OrderId>> {
        Self::exit_all_units(self_rc, symbol, timestamp, OrderKind::LimitExitCover, Some(price), None)
    }

    pub fn exit_long_all_units_at_stop(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp, price: f64) -> Result<Vec<OrderId>> {
        Self::exit_all_units(self_rc, symbol, timestamp, OrderKind::StopExitSell, None, Some(price))
    }

    pub fn exit_short_all_units_at_stop(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp, price: f64) -> Result<Vec<OrderId>> {
        Self::exit_all_units(self_rc, symbol, timestamp, OrderKind::StopExitCover, None, Some(price))
    }

    /// `reference_price`/`pct` variants: the limit/stop is computed from a
    /// per-unit reference price adjusted by `pct` and tick-rounded (spec
    /// §4.6). Each open unit gets its own order since each may have a
    /// distinct reference price (its own entry price, typically).
    pub fn exit_long_all_units_at_limit_pct(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp, pct: f64) -> Result<Vec<OrderId>> {
        Self::exit_all_units_pct(self_rc, symbol, timestamp, OrderKind::LimitExitSell, pct)
    }

    pub fn exit_short_all_units_at_limit_pct(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp, pct: f64) -> Result<Vec<OrderId>> {
        Self::exit_all_units_pct(self_rc, symbol, timestamp, OrderKind::LimitExitCover, pct)
    }

    pub fn exit_long_all_units_at_stop_pct(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp, pct: f64) -> Result<Vec<OrderId>> {
        Self::exit_all_units_pct(self_rc, symbol, timestamp, OrderKind::StopExitSell, pct)
    }

    pub fn exit_short_all_units_at_stop_pct(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp, pct: f64) -> Result<Vec<OrderId>> {
        Self::exit_all_units_pct(self_rc, symbol, timestamp, OrderKind::StopExitCover, pct)
    }

    fn exit_all_units(
        self_rc: &Rc<RefCell<Self>>,
        symbol: &str,
        timestamp: Timestamp,
        kind: OrderKind,
        limit: Option<f64>,
        stop: Option<f64>,
    ) -> Result<Vec<OrderId>> {
        let unit_ids: Vec<(PositionId, u32)> = {
            let broker = self_rc.borrow();
            broker
                .positions
                .get(symbol)
                .map(|p| p.units().iter().map(|u| (u.id, u.units)).collect())
                .unwrap_or_default()
        };
        let mut ids = Vec::with_capacity(unit_ids.len());
        for (position_id, units) in unit_ids {
            ids.push(Self::exit_unit(self_rc, symbol, timestamp, units, kind, limit, stop, position_id)?);
        }
        Ok(ids)
    }

    fn exit_all_units_pct(
        self_rc: &Rc<RefCell<Self>>,
        symbol: &str,
        timestamp: Timestamp,
        kind: OrderKind,
        pct: f64,
    ) -> Result<Vec<OrderId>> {
        let unit_specs: Vec<(PositionId, u32, f64)> = {
            let broker = self_rc.borrow();
            broker
                .positions
                .get(symbol)
                .map(|p| p.units().iter().map(|u| (u.id, u.units, u.entry_price)).collect())
                .unwrap_or_default()
        };
        let mut ids = Vec::with_capacity(unit_specs.len());
        for (position_id, units, reference_price) in unit_specs {
            let raw = match kind {
                OrderKind::LimitExitSell | OrderKind::StopExitCover => reference_price * (1.0 + pct / 100.0),
                _ => reference_price * (1.0 - pct / 100.0),
            };
            let tick = {
                let broker = self_rc.borrow();
                broker.effective_tick(symbol, timestamp, reference_price)
            };
            let price = round_to_tick(raw, tick);
            let (limit, stop) = if kind.is_limit() { (Some(price), None) } else { (None, Some(price)) };
            ids.push(Self::exit_unit(self_rc, symbol, timestamp, units, kind, limit, stop, position_id)?);
        }
        Ok(ids)
    }

    pub fn exit_long_unit_on_open(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp, index: usize) -> Result<OrderId> {
        Self::exit_single_unit(self_rc, symbol, timestamp, index, OrderKind::MarketExitSell, None, None)
    }

    pub fn exit_short_unit_on_open(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp, index: usize) -> Result<OrderId> {
        Self::exit_single_unit(self_rc, symbol, timestamp, index, OrderKind::MarketExitCover, None, None)
    }

    pub fn exit_long_unit_at_limit(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp, index: usize, price: f64) -> Result<OrderId> {
        Self::exit_single_unit(self_rc, symbol, timestamp, index, OrderKind::LimitExitSell, Some(price), None)
    }

    pub fn exit_long_unit_at_stop(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp, index: usize, price: f64) -> Result<OrderId> {
        Self::exit_single_unit(self_rc, symbol, timestamp, index, OrderKind::StopExitSell, None, Some(price))
    }

    pub fn exit_short_unit_at_limit(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp, index: usize, price: f64) -> Result<OrderId> {
        Self::exit_single_unit(self_rc, symbol, timestamp, index, OrderKind::LimitExitCover, Some(price), None)
    }

    pub fn exit_short_unit_at_stop(self_rc: &Rc<RefCell<Self>>, symbol: &str, timestamp: Timestamp, index: usize, price: f64) -> Result<OrderId> {
        Self::exit_single_unit(self_rc, symbol, timestamp, index, OrderKind::StopExitCover, None, Some(price))
    }

    fn exit_single_unit(
        self_rc: &Rc<RefCell<Self>>,
        symbol: &str,
        timestamp: Timestamp,
        index: usize,
        kind: OrderKind,
        limit: Option<f64>,
        stop: Option<f64>,
    ) -> Result<OrderId> {
        let (position_id, units) = {
            let broker = self_rc.borrow();
            let position = broker
                .positions
                .get(symbol)
                .ok_or_else(|| BacktestError::PositionFlat(symbol.to_string()))?;
            let unit = position.unit(index)?;
            (unit.id, unit.units)
        };
        Self::exit_unit(self_rc, symbol, timestamp, units, kind, limit, stop, position_id)
    }

    #[allow(clippy::too_many_arguments)]
    fn exit_unit(
        self_rc: &Rc<RefCell<Self>>,
        symbol: &str,
        timestamp: Timestamp,
        units: u32,
        kind: OrderKind,
        limit: Option<f64>,
        stop: Option<f64>,
        position_id: PositionId,
    ) -> Result<OrderId> {
        let order = Order::new(symbol, units, timestamp, kind, limit, stop, None, None)?;
        let id = order.id;
        self_rc.borrow_mut().exit_targets.insert(id, ExitTarget::Unit(position_id));
        Self::register_order(self_rc, order);
        Ok(id)
    }

    /// Deep-copy this broker: fresh position book, fresh closed-unit history,
    /// a fresh [`TransactionManager`] (itself deep-copied, re-observing its
    /// own still-open transactions), and every pending order cloned into a
    /// fresh dispatcher with its observer retargeted at the copy rather than
    /// at `self_rc`. Spec §4.6's critical invariant: skipping the retarget
    /// step leaves the copy silently inert — it would never hear about a
    /// fill because the cloned orders would still be shouting at the
    /// original broker (spec §9 "shared-state broker copy").
    pub fn duplicate(self_rc: &Rc<RefCell<Self>>) -> Rc<RefCell<Self>> {
        let (portfolio, tick_policy, positions, closed_units, position_id_gen, exit_targets, pending, transaction_manager) = {
            let broker = self_rc.borrow();
            (
                broker.portfolio.clone(),
                broker.tick_policy,
                broker.positions.clone(),
                broker.closed_units.clone(),
                broker.position_id_gen.clone(),
                broker.exit_targets.clone(),
                broker.dispatcher.pending_orders_by_timestamp(),
                broker.transaction_manager.duplicate(),
            )
        };

        let fresh = Rc::new(RefCell::new(Self {
            portfolio,
            tick_policy,
            dispatcher: OrderDispatcher::new(),
            transaction_manager,
            positions,
            closed_units,
            position_id_gen,
            exit_targets,
        }));

        let weak: Weak<dyn OrderObserver> = Rc::downgrade(&fresh) as Weak<dyn OrderObserver>;
        for order_rc in pending {
            let mut order = order_rc.borrow().clone();
            order.retarget_observers(weak.clone());
            fresh.borrow_mut().dispatcher.add_order(Rc::new(RefCell::new(order)));
        }

        fresh
    }

    // --- Per-bar processing --------------------------------------------

    pub fn process_pending_orders(
        self_rc: &Rc<RefCell<Self>>,
        fill_timestamp: Timestamp,
        bars_at_fill: &HashMap<String, Bar>,
    ) -> Result<()> {
        // A fill triggers `Order::execute` -> `notify_executed` ->
        // `on_order_executed`, which re-enters this same `RefCell<Broker>`
        // via the order's `Weak<dyn OrderObserver>`. The dispatcher can't run
        // while `self_rc` is still borrowed, so the dispatcher is taken out
        // of the broker for the duration of the call and put back after.
        let positions_snapshot = self_rc.borrow().positions_snapshot();
        let mut dispatcher = std::mem::take(&mut self_rc.borrow_mut().dispatcher);

        let result = dispatcher.process_pending_orders(fill_timestamp, bars_at_fill, &positions_snapshot);

        self_rc.borrow_mut().dispatcher = dispatcher;

        let mut broker = self_rc.borrow_mut();
        for (symbol, bar) in bars_at_fill {
            if let Some(position) = broker.positions.get_mut(symbol) {
                let _ = position.observe_bar(*bar);
            }
        }
        result
    }

    fn positions_snapshot(&self) -> HashMap<String, InstrumentPosition> {
        let mut snapshot = HashMap::new();
        for (symbol, position) in &self.positions {
            let mut shallow = InstrumentPosition::new(symbol.clone());
            for unit in position.units() {
                let _ = shallow.add_unit(unit.clone());
            }
            snapshot.insert(symbol.clone(), shallow);
        }
        snapshot
    }

    // --- Fill handling --------------------------------------------------

    fn handle_executed(&mut self, order: &Order) -> Result<()> {
        if order.kind.is_entry() {
            self.handle_entry_executed(order)
        } else {
            self.handle_exit_executed(order)
        }
    }

    /// A canceled exit order frees its unit up for a fresh exit order next
    /// bar (`has_pending_exit` reads `exit_targets`, so a stale entry here
    /// would wedge the unit shut forever).
    fn handle_canceled(&mut self, order: &Order) {
        self.exit_targets.remove(&order.id);
    }

    fn handle_entry_executed(&mut self, order: &Order) -> Result<()> {
        let direction = if order.kind == OrderKind::MarketEntryLong {
            Direction::Long
        } else {
            Direction::Short
        };
        let fill_price = order.filled_price.unwrap_or(order.limit_price.unwrap_or(0.0));
        let fill_timestamp = order.filled_at.unwrap_or(order.timestamp);
        let tick = self.effective_tick(&order.symbol, fill_timestamp, fill_price);

        let stop_loss_price = order.stop_loss_pct.map(|pct| {
            let raw = match direction {
                Direction::Long => fill_price * (1.0 - pct / 100.0),
                _ => fill_price * (1.0 + pct / 100.0),
            };
            round_to_tick(raw, tick)
        });
        let profit_target_price = order.profit_target_pct.map(|pct| {
            let raw = match direction {
                Direction::Long => fill_price * (1.0 + pct / 100.0),
                _ => fill_price * (1.0 - pct / 100.0),
            };
            round_to_tick(raw, tick)
        });

        let position_id = self.position_id_gen.next_id();
        let entry_bar = Bar::new(
            order.symbol.clone(),
            fill_timestamp,
            fill_price,
            fill_price,
            fill_price,
            fill_price,
            0,
        )?;
        let unit = PositionUnit::new(
            position_id,
            order.symbol.clone(),
            direction,
            entry_bar,
            fill_price,
            order.units,
            stop_loss_price,
            profit_target_price,
        );

        let transaction = Transaction::new(order, &unit)?;

        self.positions
            .entry(order.symbol.clone())
            .or_insert_with(|| InstrumentPosition::new(order.symbol.clone()))
            .add_unit(unit)?;

        TransactionManager::add(&self.transaction_manager, transaction)
    }

    fn handle_exit_executed(&mut self, order: &Order) -> Result<()> {
        let Some(ExitTarget::Unit(position_id)) = self.exit_targets.remove(&order.id) else {
            return Ok(());
        };
        let position = self
            .positions
            .get_mut(&order.symbol)
            .ok_or_else(|| BacktestError::PositionFlat(order.symbol.clone()))?;
        let mut unit = position.remove_by_position_id(position_id)?;
        let fill_price = order.filled_price.unwrap_or(0.0);
        let fill_timestamp = order.filled_at.unwrap_or(order.timestamp);
        unit.close(fill_timestamp, fill_price)?;
        let unit_id = unit.id;
        self.closed_units.entry(order.symbol.clone()).or_default().push(unit);

        // `if let Some(x) = self.transaction_manager.borrow().find(...)` would
        // keep the `Ref<TransactionManager>` alive for the whole body even
        // though `find` returns an owned `Rc` — and `complete` re-enters the
        // same `RefCell<TransactionManager>` via its self-observer. Binding
        // the lookup to its own statement ends that borrow first.
        let transaction = self.transaction_manager.borrow().find(unit_id);
        if let Some(transaction) = transaction {
            transaction.borrow_mut().complete(order.id)?;
        }
        Ok(())
    }
}
