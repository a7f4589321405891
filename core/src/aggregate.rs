//! Derived dashboard values. Everything here is a pure function of an entry
//! slice (newest first, as kept by [`EntryStore`](crate::store::EntryStore)),
//! the settings and the caller's notion of "now".

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike};

use crate::models::{
    Category, Dashboard, DashboardCard, DailyIntake, LogEntry, ReadingPoint, Settings,
    StatusLevel,
};

pub const MINUTE_MS: i64 = 60_000;
pub const HOUR_MS: i64 = 60 * MINUTE_MS;
pub const DAY_MS: i64 = 24 * HOUR_MS;

/// Number of populated days kept by [`daily_intake_series`].
pub const INTAKE_DAYS: usize = 7;

/// Points returned by [`reading_series`] when the caller gives no limit.
pub const DEFAULT_TREND_POINTS: usize = 20;

#[must_use]
pub fn latest(entries: &[LogEntry], category: Category) -> Option<&LogEntry> {
    entries.iter().find(|e| e.category == category)
}

/// Epoch millis of local midnight on the day of `now`.
fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    now.timezone()
        .from_local_datetime(&midnight)
        .earliest()
        .map_or_else(
            || now.timestamp_millis() - i64::from(now.time().num_seconds_from_midnight()) * 1000,
            |dt| dt.timestamp_millis(),
        )
}

fn day_of<Tz: TimeZone>(timestamp_ms: i64, tz: &Tz) -> Option<NaiveDate> {
    tz.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.date_naive())
}

/// Sum of today's values for `category`, today being the local day of `now`.
#[must_use]
pub fn daily_total<Tz: TimeZone>(
    entries: &[LogEntry],
    category: Category,
    now: &DateTime<Tz>,
) -> f64 {
    let since = start_of_day(now);
    entries
        .iter()
        .filter(|e| e.category == category && e.timestamp >= since)
        .map(|e| e.value)
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Elapsed {
    JustNow,
    Minutes(i64),
    Hours(i64),
    Days(i64),
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (n, unit) = match *self {
            Elapsed::JustNow => return f.write_str("just now"),
            Elapsed::Minutes(n) => (n, "minute"),
            Elapsed::Hours(n) => (n, "hour"),
            Elapsed::Days(n) => (n, "day"),
        };
        let plural = if n == 1 { "" } else { "s" };
        write!(f, "{n} {unit}{plural} ago")
    }
}

/// Floor-bucketed time since `timestamp`. Future timestamps count as just now.
#[must_use]
pub fn time_since(timestamp: i64, now_ms: i64) -> Elapsed {
    let elapsed = now_ms.saturating_sub(timestamp).max(0);
    let minutes = elapsed / MINUTE_MS;
    if minutes < 1 {
        return Elapsed::JustNow;
    }
    if minutes < 60 {
        return Elapsed::Minutes(minutes);
    }
    let hours = elapsed / HOUR_MS;
    if hours < 24 {
        return Elapsed::Hours(hours);
    }
    Elapsed::Days(elapsed / DAY_MS)
}

#[must_use]
pub fn time_since_label(timestamp: i64, now_ms: i64) -> String {
    time_since(timestamp, now_ms).to_string()
}

/// Per-day feeding and saline sums, oldest day first, limited to the most
/// recent [`INTAKE_DAYS`] days that have any intake entry.
#[must_use]
pub fn daily_intake_series<Tz: TimeZone>(entries: &[LogEntry], tz: &Tz) -> Vec<DailyIntake> {
    let mut days: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    for entry in entries.iter().filter(|e| e.category.is_intake()) {
        let Some(day) = day_of(entry.timestamp, tz) else {
            continue;
        };
        let sums = days.entry(day).or_insert((0.0, 0.0));
        match entry.category {
            Category::Feeding => sums.0 += entry.value,
            Category::Saline => sums.1 += entry.value,
            _ => {}
        }
    }

    let skip = days.len().saturating_sub(INTAKE_DAYS);
    days.into_iter()
        .skip(skip)
        .map(|(date, (feeding, saline))| DailyIntake {
            date,
            feeding,
            saline,
        })
        .collect()
}

/// Threshold classification used for colouring readings.
#[must_use]
pub fn status(category: Category, value: f64, settings: &Settings) -> StatusLevel {
    match category {
        Category::Glucose if value < settings.glucose_low => StatusLevel::Low,
        Category::Glucose if value > settings.glucose_high => StatusLevel::High,
        Category::Ketone if value >= settings.ketone_danger => StatusLevel::Danger,
        Category::Ketone if value >= settings.ketone_warning => StatusLevel::Warning,
        _ => StatusLevel::Normal,
    }
}

#[must_use]
pub fn abnormal_entries<'a>(entries: &'a [LogEntry], settings: &Settings) -> Vec<&'a LogEntry> {
    entries
        .iter()
        .filter(|e| status(e.category, e.value, settings).is_alert())
        .collect()
}

/// The `limit` most recent readings of a category, oldest first.
#[must_use]
pub fn reading_series(entries: &[LogEntry], category: Category, limit: usize) -> Vec<ReadingPoint> {
    let mut points: Vec<ReadingPoint> = entries
        .iter()
        .filter(|e| e.category == category)
        .take(limit)
        .map(|e| ReadingPoint {
            timestamp: e.timestamp,
            value: e.value,
        })
        .collect();
    points.reverse();
    points
}

#[must_use]
pub fn dashboard<Tz>(entries: &[LogEntry], settings: &Settings, now: &DateTime<Tz>) -> Dashboard
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let now_ms = now.timestamp_millis();
    let cards: Vec<DashboardCard> = Category::ALL
        .into_iter()
        .map(|category| {
            let latest = latest(entries, category).cloned();
            let today_total = daily_total(entries, category, now);
            let target = settings.target_for(category);
            DashboardCard {
                category,
                unit: category.unit(),
                status: latest
                    .as_ref()
                    .map(|e| status(category, e.value, settings)),
                since: latest
                    .as_ref()
                    .map(|e| time_since_label(e.timestamp, now_ms)),
                latest,
                today_total,
                target,
                progress_pct: target.map(|t| today_total / t * 100.0),
            }
        })
        .collect();

    let alerts = cards
        .iter()
        .filter(|c| c.status.is_some_and(StatusLevel::is_alert))
        .count();

    Dashboard {
        generated_at: now.to_rfc3339(),
        cards,
        alerts,
    }
}
