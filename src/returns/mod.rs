//! Return extractor — per-bar return series spanning both closed trades and
//! still-open positions (spec §3, §4.10).

use crate::broker::Broker;
use crate::domain::Timestamp;
use crate::position::PositionUnit;

/// A single per-bar fractional return, timestamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampedReturn {
    pub timestamp: Timestamp,
    pub value: f64,
}

/// Close-to-close, open-to-close, high-to-open, and low-to-open fractional
/// moves for one bar (spec §4.10's "expanded variant").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpandedBarMetrics {
    pub timestamp: Timestamp,
    pub close_to_close: f64,
    pub open_to_close: f64,
    pub high_to_open: f64,
    pub low_to_open: f64,
}

fn bar_return(close: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        0.0
    } else {
        (close - reference) / reference
    }
}

/// `(timestamp, close)` points spanning one unit's lifetime: its observed
/// bar history, plus — if closed — a final synthetic point at the exit
/// price/timestamp. The history never records the closing bar itself (the
/// broker moves a unit to closed state before the driver's next
/// `observe_bar` pass would otherwise append it), so the exit point has to
/// be appended here to capture the trade's last leg of return.
fn closes(unit: &PositionUnit) -> Vec<(Timestamp, f64)> {
    let mut points: Vec<(Timestamp, f64)> = unit.history.iter().map(|b| (b.timestamp, b.close)).collect();
    if let (Some(exit_ts), Some(exit_price)) = (unit.exit_timestamp, unit.exit_price) {
        points.push((exit_ts, exit_price));
    }
    points
}

/// Per-bar returns for one unit: the entry bar's return is anchored to the
/// entry price (and so is ~0, since the synthetic entry bar's close equals
/// the fill price); every later bar is anchored to the prior bar's close.
/// Short units get the sign negated (spec §4.10).
fn unit_returns(unit: &PositionUnit) -> Vec<TimestampedReturn> {
    let points = closes(unit);
    let sign = unit.direction.sign();
    let mut out = Vec::with_capacity(points.len());
    let mut reference = unit.entry_price;
    for (timestamp, close) in points {
        out.push(TimestampedReturn {
            timestamp,
            value: bar_return(close, reference) * sign,
        });
        reference = close;
    }
    out
}

/// Flat per-bar return series for every closed trade, then every still-open
/// unit, across every symbol in `broker`'s portfolio.
pub fn flat_returns(broker: &Broker) -> Vec<f64> {
    timestamped_returns(broker).into_iter().map(|r| r.value).collect()
}

/// Same series as [`flat_returns`], carrying each bar's timestamp.
pub fn timestamped_returns(broker: &Broker) -> Vec<TimestampedReturn> {
    let mut out = Vec::new();
    for unit in broker.all_closed_units() {
        out.extend(unit_returns(unit));
    }
    for unit in broker.all_open_units() {
        out.extend(unit_returns(unit));
    }
    out
}

/// Expanded per-bar metrics for every closed and open unit. A bar whose
/// prior close is zero is skipped rather than producing an infinite or NaN
/// ratio.
pub fn expanded_returns(broker: &Broker) -> Vec<ExpandedBarMetrics> {
    let closed: Vec<&PositionUnit> = broker.all_closed_units().collect();
    let open: Vec<&PositionUnit> = broker.all_open_units().collect();
    let mut out = Vec::new();
    for unit in closed.into_iter().chain(open) {
        out.extend(expanded_unit_metrics(unit));
    }
    out
}

fn expanded_unit_metrics(unit: &PositionUnit) -> Vec<ExpandedBarMetrics> {
    let history = &unit.history;
    if history.len() < 2 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(history.len() - 1);
    for window in history.windows(2) {
        let prev_close = window[0].close;
        let bar = &window[1];
        if prev_close == 0.0 || bar.open == 0.0 {
            continue;
        }
        out.push(ExpandedBarMetrics {
            timestamp: bar.timestamp,
            close_to_close: (bar.close - prev_close) / prev_close,
            open_to_close: (bar.close - bar.open) / bar.open,
            high_to_open: (bar.high - bar.open) / bar.open,
            low_to_open: (bar.low - bar.open) / bar.open,
        });
    }
    out
}

/// Win/loss outcome per closed trade, in entry-date order (spec §6
/// "consecutive losses" walks realized trades, not individual bars).
pub fn closed_trade_outcomes(broker: &Broker) -> Vec<bool> {
    broker
        .closed_units_by_entry_date()
        .into_iter()
        .filter_map(|unit| {
            let exit = unit.exit_price?;
            let pnl = (exit - unit.entry_price) * unit.direction.sign();
            Some(pnl > 0.0)
        })
        .collect()
}
