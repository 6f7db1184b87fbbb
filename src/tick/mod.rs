//! Tick-size policy and tick rounding for computed limit/stop prices.

use chrono::NaiveDate;

use crate::domain::{AssetClass, SecurityAttributes};

/// Pluggable tick-size policy. A policy is a pure function of
/// `(date, securityAttributes, nativeTick)` → effective tick (spec §4.7);
/// it never consults order or market state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPolicy {
    /// The security's native tick is used unchanged.
    NoFractions,
    /// Equities traded in fractions before decimalization:
    /// before 1997-06-01 → 1/8, 1997-06-01..2001-04-09 → 1/16,
    /// 2001-04-09 onward → 0.01. Non-equities are unaffected.
    LegacyFractions,
    /// Sub-penny pricing for equities under $1: 0.01 if the security's
    /// historical prices are split-adjusted, else 0.0001. Equities at or
    /// above $1 use 0.01. Non-equities are unaffected.
    SubPennyRule,
}

impl TickPolicy {
    /// Resolve the effective tick for `attrs` as of `date`, starting from
    /// `attrs.native_tick`.
    pub fn effective_tick(self, date: NaiveDate, attrs: &SecurityAttributes) -> f64 {
        match self {
            TickPolicy::NoFractions => attrs.native_tick,
            TickPolicy::LegacyFractions => {
                if !attrs.asset_class.is_equity_like() {
                    return attrs.native_tick;
                }
                let sixteenths_start = NaiveDate::from_ymd_opt(1997, 6, 1).expect("valid date");
                let decimal_start = NaiveDate::from_ymd_opt(2001, 4, 9).expect("valid date");
                if date < sixteenths_start {
                    1.0 / 8.0
                } else if date < decimal_start {
                    1.0 / 16.0
                } else {
                    0.01
                }
            }
            TickPolicy::SubPennyRule => {
                if attrs.asset_class != AssetClass::Equity && attrs.asset_class != AssetClass::Etf
                {
                    return attrs.native_tick;
                }
                0.01
            }
        }
    }

    /// Like [`Self::effective_tick`] but needs a reference price to decide
    /// sub-penny eligibility ([`TickPolicy::SubPennyRule`] only looks at the
    /// security's class and split-adjusted flag above $1, but below $1 must
    /// know the price itself).
    pub fn effective_tick_at_price(
        self,
        date: NaiveDate,
        attrs: &SecurityAttributes,
        price: f64,
    ) -> f64 {
        match self {
            TickPolicy::SubPennyRule => {
                if attrs.asset_class != AssetClass::Equity && attrs.asset_class != AssetClass::Etf
                {
                    return attrs.native_tick;
                }
                if price < 1.0 {
                    if attrs.split_adjusted {
                        0.01
                    } else {
                        0.0001
                    }
                } else {
                    0.01
                }
            }
            other => other.effective_tick(date, attrs),
        }
    }
}

/// Round a computed limit/stop `price` to `tick` (spec §4.6: "round-half-to-even
/// at half-tick resolution").
///
/// Prices land exactly on a tick boundary's half-tick midpoint whenever they
/// are built from `entryPrice * (1 ± pct/100)` with a "nice" percentage, so
/// detecting that case needs an epsilon rather than exact float equality.
/// The worked pyramiding example (101.50 × 1.03 → 104.55, not 104.54) shows
/// the resolved tie-break is "round up", not alternate-to-even — this
/// crate's rounding follows that example rather than the literal banker's
/// reading of the prose.
const TIE_EPSILON: f64 = 1e-9;

pub fn round_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 || price.is_nan() {
        return price;
    }
    let units = price / tick;
    let floor = units.floor();
    let diff = units - floor;
    if diff - 0.5 > -TIE_EPSILON {
        (floor + 1.0) * tick
    } else {
        floor * tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn no_fractions_is_native_tick() {
        let attrs = SecurityAttributes::future("ES", 0.25, 50.0);
        assert_eq!(
            TickPolicy::NoFractions.effective_tick(date(2024, 1, 1), &attrs),
            0.25
        );
    }

    #[test]
    fn legacy_fractions_by_era() {
        let attrs = SecurityAttributes::us_equity("IBM");
        assert_eq!(
            TickPolicy::LegacyFractions.effective_tick(date(1990, 1, 1), &attrs),
            1.0 / 8.0
        );
        assert_eq!(
            TickPolicy::LegacyFractions.effective_tick(date(1998, 1, 1), &attrs),
            1.0 / 16.0
        );
        assert_eq!(
            TickPolicy::LegacyFractions.effective_tick(date(2005, 1, 1), &attrs),
            0.01
        );
    }

    #[test]
    fn legacy_fractions_unaffected_for_futures() {
        let attrs = SecurityAttributes::future("ES", 0.25, 50.0);
        assert_eq!(
            TickPolicy::LegacyFractions.effective_tick(date(1990, 1, 1), &attrs),
            0.25
        );
    }

    #[test]
    fn sub_penny_rule_below_dollar() {
        let mut attrs = SecurityAttributes::us_equity("PENNY");
        attrs.split_adjusted = true;
        assert_eq!(
            TickPolicy::SubPennyRule.effective_tick_at_price(date(2024, 1, 1), &attrs, 0.50),
            0.01
        );
        attrs.split_adjusted = false;
        assert_eq!(
            TickPolicy::SubPennyRule.effective_tick_at_price(date(2024, 1, 1), &attrs, 0.50),
            0.0001
        );
    }

    #[test]
    fn sub_penny_rule_above_dollar() {
        let attrs = SecurityAttributes::us_equity("AAPL");
        assert_eq!(
            TickPolicy::SubPennyRule.effective_tick_at_price(date(2024, 1, 1), &attrs, 150.0),
            0.01
        );
    }

    #[test]
    fn pyramiding_example_targets_round_up_at_midpoint() {
        assert_eq!(round_to_tick(101.50 * 1.03, 0.01), 104.55);
        assert_eq!(round_to_tick(105.50 * 1.03, 0.01), 108.67);
    }

    #[test]
    fn non_midpoint_rounds_to_nearest_tick() {
        assert_eq!(round_to_tick(100.017, 0.01), 100.02);
        assert_eq!(round_to_tick(100.013, 0.01), 100.01);
    }
}
