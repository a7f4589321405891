use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDateTime, TimeZone};
use serde::Serialize;
use std::io::{self, BufRead, Write};

use catlog_core::models::{LogEntry, StatusLevel};

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

/// Parse `--at` into epoch millis. `None` means "use the creation time".
/// Accepts "now", "YYYY-MM-DD HH:MM" and "YYYY-MM-DDTHH:MM" in local time.
pub(crate) fn parse_timestamp(at: Option<&str>) -> Result<Option<i64>> {
    let Some(s) = at.map(str::trim) else {
        return Ok(None);
    };
    if s.eq_ignore_ascii_case("now") {
        return Ok(None);
    }
    let naive = TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .with_context(|| format!("Invalid time '{s}'. Use \"YYYY-MM-DD HH:MM\" or now"))?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("Time '{s}' does not exist in the local timezone"))?;
    Ok(Some(local.timestamp_millis()))
}

pub(crate) fn format_timestamp(ms: i64) -> String {
    Local
        .timestamp_millis_opt(ms)
        .single()
        .map_or_else(|| ms.to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

pub(crate) fn format_reading(entry: &LogEntry) -> String {
    format!("{} {}", entry.value, entry.unit)
}

pub(crate) fn status_marker(status: StatusLevel) -> String {
    if status.is_alert() {
        format!("! {status}")
    } else {
        status.to_string()
    }
}

/// Ask a yes/no question on stderr. Anything but y/yes is a no.
pub(crate) fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} [y/N] ");
    io::stderr().flush()?;
    let stdin = io::stdin();
    let Some(line) = stdin.lock().lines().next() else {
        return Ok(false);
    };
    Ok(is_yes(&line?))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

pub(crate) fn parse_limit(limit: usize) -> Result<usize> {
    if limit == 0 {
        bail!("Limit must be greater than 0");
    }
    Ok(limit)
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
