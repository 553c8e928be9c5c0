//! NYSE/NASDAQ session calendar. A minute is "open" iff it falls on a
//! weekday that is not a US equity market holiday and lies within
//! 09:30-16:00 US/Eastern inclusive. Holidays falling on Saturday are
//! observed the prior Friday, on Sunday the following Monday.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::US::Eastern;

fn session_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).unwrap()
}

fn session_close() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap()
}

pub fn is_market_open_now() -> bool {
    is_market_open(Utc::now())
}

pub fn is_market_open(at: DateTime<Utc>) -> bool {
    let local = at.with_timezone(&Eastern);
    let date = local.date_naive();

    if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    if is_market_holiday(date) {
        return false;
    }

    let time = local.time();
    time >= session_open() && time <= session_close()
}

/// Observed US equity market holidays for the date's year.
pub fn is_market_holiday(date: NaiveDate) -> bool {
    observed_holidays(date.year()).contains(&date)
}

fn observed_holidays(year: i32) -> Vec<NaiveDate> {
    let fixed = [
        NaiveDate::from_ymd_opt(year, 1, 1).unwrap(),   // New Year's Day
        NaiveDate::from_ymd_opt(year, 6, 19).unwrap(),  // Juneteenth
        NaiveDate::from_ymd_opt(year, 7, 4).unwrap(),   // Independence Day
        NaiveDate::from_ymd_opt(year, 12, 25).unwrap(), // Christmas Day
    ];
    let floating = [
        nth_weekday(year, 1, Weekday::Mon, 3),  // MLK Day
        nth_weekday(year, 2, Weekday::Mon, 3),  // Presidents' Day
        last_weekday(year, 5, Weekday::Mon),    // Memorial Day
        nth_weekday(year, 9, Weekday::Mon, 1),  // Labor Day
        nth_weekday(year, 11, Weekday::Thu, 4), // Thanksgiving
    ];

    let mut holidays: Vec<NaiveDate> = fixed.iter().chain(floating.iter()).copied().collect();
    for holiday in fixed {
        match holiday.weekday() {
            Weekday::Sat => holidays.push(holiday - Duration::days(1)),
            Weekday::Sun => holidays.push(holiday + Duration::days(1)),
            _ => {}
        }
    }
    holidays
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    let offset = (7 + weekday.num_days_from_monday() - first.weekday().num_days_from_monday()) % 7;
    first + Duration::days((offset + 7 * (n - 1)) as i64)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> NaiveDate {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap()
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap()
    };
    let last = first_of_next - Duration::days(1);
    let offset = (7 + last.weekday().num_days_from_monday() - weekday.num_days_from_monday()) % 7;
    last - Duration::days(offset as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn eastern(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Eastern
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn open_at_the_bell_closed_after_four() {
        // 2026-08-04 is a Tuesday.
        assert!(is_market_open(eastern(2026, 8, 4, 9, 30, 0)));
        assert!(is_market_open(eastern(2026, 8, 4, 16, 0, 0)));
        assert!(!is_market_open(eastern(2026, 8, 4, 16, 0, 1)));
        assert!(!is_market_open(eastern(2026, 8, 4, 9, 29, 59)));
    }

    #[test]
    fn weekends_are_closed() {
        assert!(!is_market_open(eastern(2026, 8, 1, 12, 0, 0))); // Saturday
        assert!(!is_market_open(eastern(2026, 8, 2, 12, 0, 0))); // Sunday
    }

    #[test]
    fn floating_holidays() {
        assert!(is_market_holiday(NaiveDate::from_ymd_opt(2026, 1, 19).unwrap())); // MLK
        assert!(is_market_holiday(NaiveDate::from_ymd_opt(2026, 2, 16).unwrap())); // Presidents'
        assert!(is_market_holiday(NaiveDate::from_ymd_opt(2026, 5, 25).unwrap())); // Memorial
        assert!(is_market_holiday(NaiveDate::from_ymd_opt(2026, 9, 7).unwrap())); // Labor
        assert!(is_market_holiday(NaiveDate::from_ymd_opt(2026, 11, 26).unwrap())); // Thanksgiving
    }

    #[test]
    fn saturday_holiday_observed_on_friday() {
        // Jul 4 2026 is a Saturday; observed Friday Jul 3.
        assert!(is_market_holiday(NaiveDate::from_ymd_opt(2026, 7, 3).unwrap()));
        assert!(!is_market_open(eastern(2026, 7, 3, 11, 0, 0)));
    }

    #[test]
    fn sunday_holiday_observed_on_monday() {
        // Jan 1 2023 was a Sunday; observed Monday Jan 2.
        assert!(is_market_holiday(NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()));
    }

    #[test]
    fn ordinary_trading_day_is_not_a_holiday() {
        assert!(!is_market_holiday(NaiveDate::from_ymd_opt(2026, 8, 4).unwrap()));
        assert!(is_market_open(eastern(2026, 8, 4, 12, 0, 0)));
    }
}
