//! Pattern/signal evaluator — external contract consumed by the strategy
//! façade (spec §6).

use crate::portfolio::Security;
use crate::domain::Timestamp;

/// Given a security and a timestamp, decide whether the strategy's
/// pattern/signal fires there. Must be pure relative to that security's
/// bars at or before `timestamp` (spec §6, §9 open question: no additional
/// intraday distinguishability is assumed or required).
pub trait PatternEvaluator {
    fn signal_fires(&self, security: &Security, timestamp: Timestamp) -> bool;
}

/// Trivial evaluator useful for tests and as a default: fires whenever the
/// security has at least `lookback` bars at or before `timestamp` (i.e. it
/// always signals once enough history has accumulated). Exercises the
/// "signal without history is silent" scenario (spec §8.4) without pulling
/// in an actual pattern language.
pub struct AlwaysAfterLookback {
    pub lookback: usize,
}

impl PatternEvaluator for AlwaysAfterLookback {
    fn signal_fires(&self, security: &Security, timestamp: Timestamp) -> bool {
        security.bars_ascending().filter(|b| b.timestamp <= timestamp).count() >= self.lookback
    }
}
