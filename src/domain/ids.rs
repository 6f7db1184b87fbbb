//! Identifier types.
//!
//! `OrderId` is generated from a single process-wide [`AtomicU64`] so it
//! stays monotonic even when independent backtests run on separate
//! threads (spec §4.1, §5) — the only cross-thread shared mutable state
//! in this crate. `PositionId` is a plain per-backtest counter: positions
//! are never compared or deduplicated across independent backtest
//! instances, so nothing requires it to be atomic.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ORDER_ID: AtomicU64 = AtomicU64::new(1);

/// Unique, monotonically increasing order identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct OrderId(pub u64);

impl OrderId {
    /// Atomically allocate the next order id. Safe to call from multiple
    /// threads running independent backtests concurrently.
    pub fn next() -> Self {
        OrderId(NEXT_ORDER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Order({})", self.0)
    }
}

/// Unique position identifier, scoped to one backtest's position book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position({})", self.0)
    }
}

/// Monotonically increasing id generator for a single position book.
///
/// Unlike [`OrderId::next`], this is not required to be atomic — each
/// backtest instance owns its own `PositionIdGen` and never shares it
/// across threads (spec §5).
#[derive(Debug, Default, Clone)]
pub struct PositionIdGen {
    next: u64,
}

impl PositionIdGen {
    pub fn next_id(&mut self) -> PositionId {
        let id = PositionId(self.next);
        self.next += 1;
        id
    }
}
