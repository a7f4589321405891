use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use catlog_core::models::DashboardCard;
use catlog_core::service::CareService;

use super::helpers::{no_neg_zero, status_marker};

fn format_today(card: &DashboardCard) -> String {
    let total = no_neg_zero(card.today_total);
    match (card.target, card.progress_pct) {
        (Some(target), Some(pct)) => format!("{total} / {target} {} ({pct:.0}%)", card.unit),
        _ => format!("{total} {}", card.unit),
    }
}

pub(crate) fn cmd_dashboard(svc: &CareService, json: bool) -> Result<()> {
    let dashboard = svc.dashboard();

    if json {
        println!("{}", serde_json::to_string_pretty(&dashboard)?);
        return Ok(());
    }

    #[derive(Tabled)]
    struct CardRow {
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Latest")]
        latest: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "When")]
        since: String,
        #[tabled(rename = "Today")]
        today: String,
    }

    let rows: Vec<CardRow> = dashboard
        .cards
        .iter()
        .map(|card| CardRow {
            category: card.category.label().to_string(),
            latest: card
                .latest
                .as_ref()
                .map_or_else(|| "-".to_string(), |e| format!("{} {}", e.value, card.unit)),
            status: card.status.map_or_else(|| "-".to_string(), status_marker),
            since: card.since.clone().unwrap_or_else(|| "-".to_string()),
            today: format_today(card),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    match dashboard.alerts {
        0 => {}
        1 => println!("1 reading needs attention."),
        n => println!("{n} readings need attention."),
    }
    Ok(())
}

pub(crate) fn cmd_intake(svc: &CareService, json: bool) -> Result<()> {
    let series = svc.intake_series();

    if json {
        println!("{}", serde_json::to_string_pretty(&series)?);
        return Ok(());
    }
    if series.is_empty() {
        eprintln!("No feeding or saline entries yet.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct IntakeRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Feeding (ml)")]
        feeding: String,
        #[tabled(rename = "Saline (ml)")]
        saline: String,
    }

    let rows: Vec<IntakeRow> = series
        .iter()
        .map(|day| IntakeRow {
            date: day.date.format("%m-%d %a").to_string(),
            feeding: format!("{}", no_neg_zero(day.feeding)),
            saline: format!("{}", no_neg_zero(day.saline)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}
