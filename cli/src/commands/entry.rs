use anyhow::Result;
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use catlog_core::models::{Category, LogEntry, NewLogEntry, StatusLevel, parse_category};
use catlog_core::service::CareService;

use super::helpers::{
    confirm, format_reading, format_timestamp, json_error, no_neg_zero, parse_limit,
    parse_timestamp, status_marker, truncate,
};

#[derive(Serialize)]
struct EntryWithStatus<'a> {
    #[serde(flatten)]
    entry: &'a LogEntry,
    status: StatusLevel,
}

fn with_status<'a>(svc: &CareService, entry: &'a LogEntry) -> EntryWithStatus<'a> {
    EntryWithStatus {
        entry,
        status: svc.status_of(entry.category, entry.value),
    }
}

pub(crate) fn cmd_log(
    svc: &mut CareService,
    category: &str,
    value: f64,
    note: Option<String>,
    at: Option<&str>,
    json: bool,
) -> Result<()> {
    let category = parse_category(category)?;
    let timestamp = parse_timestamp(at)?;

    let entry = svc.add_entry(NewLogEntry {
        category,
        value,
        timestamp,
        note,
    })?;
    let status = svc.status_of(entry.category, entry.value);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&with_status(svc, &entry))?
        );
    } else {
        println!(
            "Logged {} {} at {} (id {})",
            entry.category,
            format_reading(&entry),
            format_timestamp(entry.timestamp),
            entry.id
        );
        if status.is_alert() {
            println!("  Status: {}", status_marker(status));
        }
        if entry.category.is_intake() {
            let total = no_neg_zero(svc.daily_total(entry.category));
            match svc.settings().target_for(entry.category) {
                Some(target) => println!("  Today: {total} / {target} {}", entry.unit),
                None => println!("  Today: {total} {}", entry.unit),
            }
        }
        if !entry.note.is_empty() {
            println!("  Note: {}", entry.note);
        }
    }

    Ok(())
}

pub(crate) fn cmd_list(
    svc: &CareService,
    category: Option<&str>,
    limit: Option<usize>,
    alerts: bool,
    json: bool,
) -> Result<()> {
    let category = category.map(parse_category).transpose()?;
    let limit = limit.map(parse_limit).transpose()?;

    let source: Vec<&LogEntry> = if alerts {
        svc.alerts()
    } else {
        svc.entries().iter().collect()
    };
    let entries: Vec<&LogEntry> = source
        .into_iter()
        .filter(|e| category.is_none_or(|c| e.category == c))
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    if json {
        let rows: Vec<EntryWithStatus> = entries.iter().map(|e| with_status(svc, e)).collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if entries.is_empty() {
        if alerts {
            eprintln!("No abnormal readings.");
        } else {
            eprintln!("No entries found. Use `catlog log` to record one.");
        }
    } else {
        print_entry_table(svc, &entries);
    }

    Ok(())
}

fn print_entry_table(svc: &CareService, entries: &[&LogEntry]) {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Note")]
        note: String,
    }

    let rows: Vec<EntryRow> = entries
        .iter()
        .map(|e| EntryRow {
            id: e.id.clone(),
            time: format_timestamp(e.timestamp),
            category: e.category.label().to_string(),
            value: format_reading(e),
            status: status_marker(svc.status_of(e.category, e.value)),
            note: truncate(&e.note, 30),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..4)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn cmd_delete(svc: &mut CareService, id: &str, yes: bool, json: bool) -> Result<()> {
    let Some(entry) = svc.get_entry(id).cloned() else {
        if json {
            println!("{}", json_error(&format!("Entry {id} not found")));
        } else {
            eprintln!("Entry {id} not found");
        }
        process::exit(2);
    };

    if !yes {
        let question = format!(
            "Delete {} {} from {}?",
            entry.category,
            format_reading(&entry),
            format_timestamp(entry.timestamp)
        );
        if !confirm(&question)? {
            if json {
                println!("{}", serde_json::json!({ "deleted": null }));
            } else {
                eprintln!("Cancelled");
            }
            return Ok(());
        }
    }

    svc.remove_entry(id)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted entry {id}");
    }
    Ok(())
}

pub(crate) fn cmd_trend(svc: &CareService, category: &str, limit: usize, json: bool) -> Result<()> {
    let category: Category = parse_category(category)?;
    let limit = parse_limit(limit)?;
    let points = svc.trend(category, limit);

    if json {
        println!("{}", serde_json::to_string_pretty(&points)?);
        return Ok(());
    }
    if points.is_empty() {
        eprintln!("No {category} readings yet.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct TrendRow {
        #[tabled(rename = "Time")]
        time: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Status")]
        status: String,
    }

    let unit = category.unit();
    let rows: Vec<TrendRow> = points
        .iter()
        .map(|p| TrendRow {
            time: format_timestamp(p.timestamp),
            value: format!("{} {unit}", p.value),
            status: status_marker(svc.status_of(category, p.value)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
        .to_string();
    println!("{} (oldest first)", category.label());
    println!("{table}");
    Ok(())
}
