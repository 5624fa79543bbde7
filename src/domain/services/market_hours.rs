//! US equity market hours
//!
//! Sessions are defined in New York local time using `chrono_tz`, so DST
//! transitions are handled by the timezone database. Every predicate takes the
//! instant to test explicitly; callers pass `Utc::now()` in production.
//! Exchange holidays are not modelled.

use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;

const SECONDS_PER_MINUTE: u32 = 60;

#[derive(Debug, Clone)]
pub struct MarketClock {
    timezone: Tz,
    /// Session open, seconds after local midnight
    open: u32,
    /// Session close, seconds after local midnight
    close: u32,
    /// Margin kept clear of the open and the close by `is_safe_window`
    buffer: u32,
}

impl Default for MarketClock {
    /// NYSE regular session, 09:30-16:00 America/New_York, 30 minute buffer
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::New_York,
            open: (9 * 60 + 30) * SECONDS_PER_MINUTE,
            close: 16 * 60 * SECONDS_PER_MINUTE,
            buffer: 30 * SECONDS_PER_MINUTE,
        }
    }
}

impl MarketClock {
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    fn local(&self, now: DateTime<Utc>) -> DateTime<Tz> {
        now.with_timezone(&self.timezone)
    }

    /// Monday through Friday in exchange-local time
    pub fn is_weekday(&self, now: DateTime<Utc>) -> bool {
        self.local(now).weekday().num_days_from_monday() < 5
    }

    /// Inside the regular session, both ends inclusive
    pub fn is_regular_session(&self, now: DateTime<Utc>) -> bool {
        let seconds = self.local(now).num_seconds_from_midnight();
        self.is_weekday(now) && self.open <= seconds && seconds <= self.close
    }

    /// Inside the regular session but at least `buffer` away from the open and the close
    pub fn is_safe_window(&self, now: DateTime<Utc>) -> bool {
        let seconds = self.local(now).num_seconds_from_midnight();
        self.is_weekday(now)
            && self.open + self.buffer <= seconds
            && seconds <= self.close - self.buffer
    }

    /// Coarse hourly check: a weekday with the local hour in `[open hour, close hour)`
    pub fn is_trading_hour(&self, now: DateTime<Utc>) -> bool {
        let hour = self.local(now).hour();
        let open_hour = self.open / 3600;
        let close_hour = self.close / 3600;
        self.is_weekday(now) && open_hour <= hour && hour < close_hour
    }

    /// Crypto markets trade around the clock
    pub fn crypto_open(&self, _now: DateTime<Utc>) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // 2024-01-08 is a Monday; New York is UTC-5 in January.
    fn utc(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_weekday() {
        let clock = MarketClock::default();
        assert!(clock.is_weekday(utc(8, 15, 0)));
        assert!(!clock.is_weekday(utc(6, 15, 0)));
        assert!(!clock.is_weekday(utc(7, 15, 0)));
        // 01:00 UTC Saturday is still Friday evening in New York
        assert!(clock.is_weekday(utc(6, 1, 0)));
    }

    #[test]
    fn test_regular_session_bounds() {
        let clock = MarketClock::default();
        assert!(!clock.is_regular_session(utc(8, 14, 29)));
        assert!(clock.is_regular_session(utc(8, 14, 30)));
        assert!(clock.is_regular_session(utc(8, 21, 0)));
        assert!(!clock.is_regular_session(utc(8, 21, 1)));
        assert!(!clock.is_regular_session(utc(6, 16, 0)));
    }

    #[test]
    fn test_safe_window_excludes_first_and_last_half_hour() {
        let clock = MarketClock::default();
        assert!(!clock.is_safe_window(utc(8, 14, 45)));
        assert!(clock.is_safe_window(utc(8, 15, 0)));
        assert!(clock.is_safe_window(utc(8, 20, 30)));
        assert!(!clock.is_safe_window(utc(8, 20, 31)));
    }

    #[test]
    fn test_trading_hour() {
        let clock = MarketClock::default();
        assert!(clock.is_trading_hour(utc(8, 14, 0)));
        assert!(clock.is_trading_hour(utc(8, 20, 59)));
        assert!(!clock.is_trading_hour(utc(8, 21, 0)));
        assert!(!clock.is_trading_hour(utc(6, 15, 0)));
    }

    #[test]
    fn test_daylight_saving_time() {
        let clock = MarketClock::default();
        // 2024-07-08 (Monday): New York is UTC-4
        let open = Utc.with_ymd_and_hms(2024, 7, 8, 13, 30, 0).unwrap();
        assert!(clock.is_regular_session(open));
        let before = Utc.with_ymd_and_hms(2024, 7, 8, 13, 29, 0).unwrap();
        assert!(!clock.is_regular_session(before));
    }

    #[test]
    fn test_crypto_always_open() {
        let clock = MarketClock::default();
        assert!(clock.crypto_open(utc(6, 3, 0)));
    }
}
