//! Statistics policy — a pluggable post-hoc summary computed from a
//! strategy's reconstructed return series (spec §6's "injected statistics
//! policy").

/// Profit factor, required win rate, and consecutive-loss counting, kept
/// behind a trait so a backtest consumer can swap in its own definitions
/// without touching the query surface that calls it (spec §6).
pub trait StatisticsPolicy {
    /// Gross gains over gross losses across `bar_returns`. `f64::INFINITY`
    /// if there are gains and no losses; `0.0` if there's neither.
    fn profit_factor(&self, bar_returns: &[f64]) -> f64;

    /// The breakeven win rate implied by the realized average win/loss
    /// payoff ratio: `1 / (1 + payoffRatio)`. `0.0` if either side of
    /// `bar_returns` is empty (nothing to estimate a payoff ratio from).
    fn required_win_rate(&self, bar_returns: &[f64]) -> f64;

    /// Longest run of losing trades in `trade_wins` (entry-date order, one
    /// bool per closed trade, `true` = win).
    fn consecutive_losses(&self, trade_wins: &[bool]) -> u32;
}

/// Default statistics policy, grounded in the conventional definitions:
/// profit factor as gross-gain/gross-loss, required win rate as the
/// standard breakeven rate for a given payoff ratio, and consecutive losses
/// as the longest losing-trade streak.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassicStatistics;

impl StatisticsPolicy for ClassicStatistics {
    fn profit_factor(&self, bar_returns: &[f64]) -> f64 {
        let gains: f64 = bar_returns.iter().filter(|&&r| r > 0.0).sum();
        let losses: f64 = bar_returns.iter().filter(|&&r| r < 0.0).map(|r| r.abs()).sum();
        if losses == 0.0 {
            if gains > 0.0 {
                f64::INFINITY
            } else {
                0.0
            }
        } else {
            gains / losses
        }
    }

    fn required_win_rate(&self, bar_returns: &[f64]) -> f64 {
        let wins: Vec<f64> = bar_returns.iter().copied().filter(|&r| r > 0.0).collect();
        let losses: Vec<f64> = bar_returns.iter().copied().filter(|&r| r < 0.0).map(f64::abs).collect();
        if wins.is_empty() || losses.is_empty() {
            return 0.0;
        }
        let avg_win = wins.iter().sum::<f64>() / wins.len() as f64;
        let avg_loss = losses.iter().sum::<f64>() / losses.len() as f64;
        if avg_loss == 0.0 {
            return 0.0;
        }
        let payoff_ratio = avg_win / avg_loss;
        1.0 / (1.0 + payoff_ratio)
    }

    fn consecutive_losses(&self, trade_wins: &[bool]) -> u32 {
        let mut max_run = 0u32;
        let mut current = 0u32;
        for &win in trade_wins {
            if win {
                current = 0;
            } else {
                current += 1;
                max_run = max_run.max(current);
            }
        }
        max_run
    }
}
