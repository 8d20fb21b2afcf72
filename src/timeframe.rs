//! Named reporting windows relative to the current local time.

use chrono::{DateTime, Datelike, Days, Local, Months, NaiveDate, TimeZone};

/// Token used when none is given.
pub const DEFAULT_TIMEFRAME: &str = "t";

/// Resolves `token` into a half-open `[start, end)` range of unix seconds.
///
/// | token | window |
/// |-------|--------|
/// | `t`   | today |
/// | `24h` | the last 24 hours, ending now |
/// | `7d`  | 7 days before today, through today |
/// | `30d` | 30 days before today, through today |
/// | `12m` | the 1st of the month 12 months ago, through today |
/// | `mtd` | month to date |
/// | `ytd` | year to date |
///
/// Day-based windows end at the start of tomorrow. An empty token means `t`;
/// anything unrecognized falls back to `24h`.
pub fn resolve<Tz: TimeZone>(token: &str, now: &DateTime<Tz>) -> (i64, i64) {
    let tz = now.timezone();
    let today = now.date_naive();
    let end_of_day = midnight(&tz, today + Days::new(1));

    let token = if token.is_empty() { DEFAULT_TIMEFRAME } else { token };
    match token {
        "t" => (midnight(&tz, today), end_of_day),
        "7d" => (midnight(&tz, today - Days::new(7)), end_of_day),
        "30d" => (midnight(&tz, today - Days::new(30)), end_of_day),
        "12m" => {
            let first = first_of_month(today);
            let from = first.checked_sub_months(Months::new(12)).unwrap_or(first);
            (midnight(&tz, from), end_of_day)
        }
        "mtd" => (midnight(&tz, first_of_month(today)), end_of_day),
        "ytd" => {
            let jan1 = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
            (midnight(&tz, jan1), end_of_day)
        }
        _ => {
            let end = now.timestamp();
            (end - 24 * 3600, end)
        }
    }
}

/// [`resolve`] against the local clock.
pub fn resolve_now(token: &str) -> (i64, i64) {
    resolve(token, &Local::now())
}

fn first_of_month(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

// Local midnight can be skipped by a DST change; take the first instant
// of the day that exists.
fn midnight<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> i64 {
    let start = day.and_time(chrono::NaiveTime::MIN);
    match tz.from_local_datetime(&start).earliest() {
        Some(t) => t.timestamp(),
        None => tz
            .from_local_datetime(&(start + chrono::Duration::hours(1)))
            .earliest()
            .map(|t| t.timestamp())
            .unwrap_or_else(|| start.and_utc().timestamp()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
    }

    fn ts(y: i32, m: u32, d: u32) -> i64 {
        at(y, m, d, 0, 0).timestamp()
    }

    #[test]
    fn test_day_based_windows() {
        let now = at(2023, 8, 9, 10, 11);
        let tomorrow = ts(2023, 8, 10);

        let cases = [
            ("t", ts(2023, 8, 9)),
            ("7d", ts(2023, 8, 2)),
            ("30d", ts(2023, 7, 10)),
            ("12m", ts(2022, 8, 1)),
            ("mtd", ts(2023, 8, 1)),
            ("ytd", ts(2023, 1, 1)),
        ];

        for (token, start) in cases {
            assert_eq!(resolve(token, &now), (start, tomorrow), "token {}", token);
        }
    }

    #[test]
    fn test_rolling_and_fallback_windows() {
        let now = at(2023, 8, 9, 10, 11);
        let last_day = (now.timestamp() - 86_400, now.timestamp());

        assert_eq!(resolve("24h", &now), last_day);
        assert_eq!(resolve("fortnight", &now), last_day);
        assert_eq!(resolve("", &now), resolve("t", &now));
    }

    #[test]
    fn test_windows_across_year_boundary() {
        let now = at(2024, 1, 3, 23, 59);
        assert_eq!(resolve("7d", &now).0, ts(2023, 12, 27));
        assert_eq!(resolve("12m", &now).0, ts(2023, 1, 1));
        assert_eq!(resolve("ytd", &now), (ts(2024, 1, 1), ts(2024, 1, 4)));
    }
}
