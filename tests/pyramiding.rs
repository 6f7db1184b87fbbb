//! Pyramiding end-to-end (spec §8 scenario 2): two entries filled at 101.50
//! and 105.50 with independent 3% profit targets, tick-rounded to 104.55 and
//! 108.67; a later bar whose high reaches 113.00 fills both, closing both
//! trades.

use std::collections::HashMap;

use backtest_core::domain::{at_default_bar_time, Bar, SecurityAttributes, Timestamp};
use backtest_core::portfolio::{Portfolio, Security};
use backtest_core::Broker;

fn ts(d: u32) -> Timestamp {
    at_default_bar_time(chrono::NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
}

fn bar(d: u32, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar::new("SPY", ts(d), open, high, low, close, 1_000).unwrap()
}

fn broker_with_spy() -> std::rc::Rc<std::cell::RefCell<Broker>> {
    let mut portfolio = Portfolio::new();
    portfolio.insert("SPY", Security::new(SecurityAttributes::us_equity("SPY")));
    let portfolio = std::rc::Rc::new(std::cell::RefCell::new(portfolio));
    Broker::new(Some(portfolio)).unwrap()
}

#[test]
fn two_pyramided_units_close_independently_when_both_targets_are_hit() {
    let broker = broker_with_spy();

    Broker::enter_long_on_open(&broker, "SPY", ts(1), 1, None, Some(3.0)).unwrap();
    let mut bars = HashMap::new();
    bars.insert("SPY".to_string(), bar(2, 101.50, 102.0, 101.0, 101.50));
    Broker::process_pending_orders(&broker, ts(2), &bars).unwrap();

    Broker::enter_long_on_open(&broker, "SPY", ts(2), 1, None, Some(3.0)).unwrap();
    let mut bars2 = HashMap::new();
    bars2.insert("SPY".to_string(), bar(3, 105.50, 106.0, 105.0, 105.50));
    Broker::process_pending_orders(&broker, ts(3), &bars2).unwrap();

    assert_eq!(broker.borrow().num_open_units("SPY"), 2);
    let targets: Vec<f64> = broker
        .borrow()
        .position("SPY")
        .unwrap()
        .units()
        .iter()
        .map(|u| u.profit_target_price.unwrap())
        .collect();
    assert_eq!(targets, vec![104.55, 108.67]);

    // Place each unit's own profit-target limit order, then run a bar whose
    // high reaches past both.
    Broker::exit_long_unit_at_limit(&broker, "SPY", ts(3), 1, 104.55).unwrap();
    Broker::exit_long_unit_at_limit(&broker, "SPY", ts(3), 2, 108.67).unwrap();

    let mut bars3 = HashMap::new();
    bars3.insert("SPY".to_string(), bar(4, 100.0, 113.0, 99.0, 110.0));
    Broker::process_pending_orders(&broker, ts(4), &bars3).unwrap();

    assert_eq!(broker.borrow().num_open_units("SPY"), 0);
    assert_eq!(broker.borrow().closed_units("SPY").len(), 2);
    assert_eq!(broker.borrow().transaction_manager().borrow().count_closed(), 2);

    let exit_prices: Vec<f64> = broker
        .borrow()
        .closed_units("SPY")
        .iter()
        .map(|u| u.exit_price.unwrap())
        .collect();
    assert!(exit_prices.contains(&104.55));
    assert!(exit_prices.contains(&108.67));
}
