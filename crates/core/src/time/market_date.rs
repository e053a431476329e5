use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use std::collections::HashSet;

// Before this local time the latest complete session is the previous day's.
// US cash close is 16:00 ET; the data vendors settle a little later.
const CLOSE_CUTOFF_HOUR: u32 = 16;
const CLOSE_CUTOFF_MINUTE: u32 = 30;

pub const HOLIDAYS_ENV: &str = "US_MARKET_HOLIDAYS";

/// The date a run is filed under. An explicit `YYYY-MM-DD` wins; otherwise the
/// last complete session in the market's local time (`UTC + offset_hours`).
pub fn resolve_analysis_date(
    date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
    offset_hours: i32,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid analysis date {s:?} (expected YYYY-MM-DD)"));
    }

    let holidays = configured_holidays(std::env::var(HOLIDAYS_ENV).ok().as_deref());
    market_date(now_utc, offset_hours, &holidays)
}

pub fn market_date(
    now_utc: DateTime<Utc>,
    offset_hours: i32,
    holidays: &HashSet<NaiveDate>,
) -> anyhow::Result<NaiveDate> {
    let offset = FixedOffset::east_opt(offset_hours * 3600)
        .with_context(|| format!("invalid market UTC offset {offset_hours}h"))?;
    let now_local = now_utc.with_timezone(&offset);

    let cutoff_reached =
        (now_local.hour(), now_local.minute()) >= (CLOSE_CUTOFF_HOUR, CLOSE_CUTOFF_MINUTE);
    let mut date = now_local.date_naive();
    if !cutoff_reached {
        date -= Duration::days(1);
    }

    while is_weekend(date) || holidays.contains(&date) {
        date -= Duration::days(1);
    }
    Ok(date)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

/// Fixed-date closures plus a comma-separated `YYYY-MM-DD` list.
pub fn configured_holidays(extra: Option<&str>) -> HashSet<NaiveDate> {
    let mut out = HashSet::new();
    for y in 2024..=2030 {
        for (m, d) in [(1, 1), (7, 4), (12, 25)] {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                out.insert(date);
            }
        }
    }

    for part in extra.unwrap_or_default().split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match NaiveDate::parse_from_str(part, "%Y-%m-%d") {
            Ok(d) => {
                out.insert(d);
            }
            Err(_) => tracing::warn!(value = part, "ignoring malformed holiday"),
        }
    }
    out
}
