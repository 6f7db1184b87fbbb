//! Market-hours filter, recovered from the original `MarketHours`/
//! `USEquitiesMarketHours` sources (not named as a core component, but
//! referenced by the concrete market-hours scenario).

use chrono::{Datelike, Duration, NaiveTime, Weekday};

use crate::domain::Timestamp;

pub trait MarketHours {
    fn is_open(&self, timestamp: Timestamp) -> bool;
    fn next_trading_time(&self, from: Timestamp, interval: Duration) -> Timestamp;
}

/// Standard US equities session: 9:30–16:00 local, Monday through Friday.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsEquitiesMarketHours;

impl UsEquitiesMarketHours {
    fn open_time() -> NaiveTime {
        NaiveTime::from_hms_opt(9, 30, 0).expect("valid constant time")
    }

    fn close_time() -> NaiveTime {
        NaiveTime::from_hms_opt(16, 0, 0).expect("valid constant time")
    }

    fn is_weekday(timestamp: Timestamp) -> bool {
        !matches!(timestamp.weekday(), Weekday::Sat | Weekday::Sun)
    }
}

impl MarketHours for UsEquitiesMarketHours {
    fn is_open(&self, timestamp: Timestamp) -> bool {
        Self::is_weekday(timestamp)
            && timestamp.time() >= Self::open_time()
            && timestamp.time() < Self::close_time()
    }

    fn next_trading_time(&self, from: Timestamp, interval: Duration) -> Timestamp {
        let mut candidate = from + interval;
        loop {
            if Self::is_weekday(candidate) {
                if candidate.time() < Self::open_time() {
                    candidate = candidate.date().and_time(Self::open_time());
                } else if candidate.time() >= Self::close_time() {
                    candidate = (candidate.date() + Duration::days(1)).and_time(Self::open_time());
                } else {
                    return candidate;
                }
            } else {
                let days_to_monday = match candidate.weekday() {
                    Weekday::Sat => 2,
                    Weekday::Sun => 1,
                    _ => unreachable!(),
                };
                candidate = (candidate.date() + Duration::days(days_to_monday)).and_time(Self::open_time());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn open_at_session_start() {
        let hours = UsEquitiesMarketHours;
        assert!(hours.is_open(dt(2023, 1, 2, 9, 30)));
    }

    #[test]
    fn closed_at_session_end() {
        let hours = UsEquitiesMarketHours;
        assert!(!hours.is_open(dt(2023, 1, 2, 16, 0)));
    }

    #[test]
    fn closed_on_saturday() {
        let hours = UsEquitiesMarketHours;
        assert!(!hours.is_open(dt(2023, 1, 7, 10, 0)));
    }

    #[test]
    fn next_trading_time_rolls_friday_afternoon_to_monday_open() {
        let hours = UsEquitiesMarketHours;
        let next = hours.next_trading_time(dt(2023, 1, 6, 15, 45), Duration::minutes(30));
        assert_eq!(next, dt(2023, 1, 9, 9, 30));
    }
}
