//! Dispatcher phase-ordering (spec §4.5): every pending order, regardless of
//! which of the eight per-kind queues it landed in or the order it was
//! inserted, gets evaluated exactly once per `process_pending_orders` call.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use backtest_core::dispatcher::OrderDispatcher;
use backtest_core::domain::{at_default_bar_time, Bar, PositionId};
use backtest_core::order::{Order, OrderKind, OrderStatus};
use backtest_core::position::{Direction, InstrumentPosition, PositionUnit};

fn ts(d: u32) -> backtest_core::domain::Timestamp {
    at_default_bar_time(chrono::NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
}

fn bar(symbol: &str, d: u32, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar::new(symbol, ts(d), open, high, low, close, 1_000).unwrap()
}

fn open_position(symbol: &str, direction: Direction, entry_price: f64) -> InstrumentPosition {
    let mut position = InstrumentPosition::new(symbol);
    let entry_bar = bar(symbol, 1, entry_price, entry_price, entry_price, entry_price);
    position
        .add_unit(PositionUnit::new(PositionId(1), symbol, direction, entry_bar, entry_price, 1, None, None))
        .unwrap();
    position
}

/// One order of each kind family is queued out of phase order (limit before
/// market, cover before sell); a single call still resolves every one of
/// them against its own bar.
#[test]
fn every_queued_kind_resolves_within_one_call() {
    let mut dispatcher = OrderDispatcher::new();

    let limit_exit = Rc::new(RefCell::new(
        Order::new("AAA", 1, ts(1), OrderKind::LimitExitSell, Some(105.0), None, None, None).unwrap(),
    ));
    let market_entry = Rc::new(RefCell::new(
        Order::new("BBB", 1, ts(1), OrderKind::MarketEntryLong, None, None, None, None).unwrap(),
    ));
    let stop_exit = Rc::new(RefCell::new(
        Order::new("CCC", 1, ts(1), OrderKind::StopExitSell, None, Some(95.0), None, None).unwrap(),
    ));
    let market_exit = Rc::new(RefCell::new(
        Order::new("DDD", 1, ts(1), OrderKind::MarketExitSell, None, None, None, None).unwrap(),
    ));

    dispatcher.add_order(limit_exit.clone());
    dispatcher.add_order(market_entry.clone());
    dispatcher.add_order(stop_exit.clone());
    dispatcher.add_order(market_exit.clone());
    assert_eq!(dispatcher.pending_count(), 4);

    let mut bars = HashMap::new();
    bars.insert("AAA".to_string(), bar("AAA", 2, 104.0, 106.0, 103.0, 105.5));
    bars.insert("BBB".to_string(), bar("BBB", 2, 50.0, 51.0, 49.0, 50.5));
    bars.insert("CCC".to_string(), bar("CCC", 2, 94.5, 96.0, 90.0, 91.0));
    bars.insert("DDD".to_string(), bar("DDD", 2, 80.0, 81.0, 79.0, 80.5));

    let mut positions = HashMap::new();
    positions.insert("AAA".to_string(), open_position("AAA", Direction::Long, 100.0));
    positions.insert("CCC".to_string(), open_position("CCC", Direction::Long, 100.0));
    positions.insert("DDD".to_string(), open_position("DDD", Direction::Long, 100.0));

    dispatcher.process_pending_orders(ts(2), &bars, &positions).unwrap();

    assert_eq!(dispatcher.pending_count(), 0);
    assert_eq!(limit_exit.borrow().status, OrderStatus::Executed);
    assert_eq!(market_entry.borrow().status, OrderStatus::Executed);
    assert_eq!(stop_exit.borrow().status, OrderStatus::Executed);
    assert_eq!(market_exit.borrow().status, OrderStatus::Executed);
}

/// A resting exit order for a symbol that is already flat at its own
/// timestamp is canceled rather than evaluated (spec §4.5's "stale exit on a
/// flat position" rule), regardless of which phase it belongs to.
#[test]
fn exit_on_an_already_flat_position_is_canceled_at_its_own_timestamp() {
    let mut dispatcher = OrderDispatcher::new();
    let stale_exit = Rc::new(RefCell::new(
        Order::new("AAA", 1, ts(2), OrderKind::LimitExitSell, Some(105.0), None, None, None).unwrap(),
    ));
    dispatcher.add_order(stale_exit.clone());

    let bars = HashMap::new();
    let positions = HashMap::new(); // no entry for "AAA" at all -> flat.

    dispatcher.process_pending_orders(ts(2), &bars, &positions).unwrap();

    assert_eq!(stale_exit.borrow().status, OrderStatus::Canceled);
}
