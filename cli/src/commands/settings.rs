use anyhow::{Result, bail};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use catlog_core::models::{Settings, SettingsPatch};
use catlog_core::service::CareService;

fn print_settings(settings: &Settings) {
    #[derive(Tabled)]
    struct SettingRow {
        #[tabled(rename = "Setting")]
        name: &'static str,
        #[tabled(rename = "Value")]
        value: String,
    }

    let target = |v: f64| {
        if v > 0.0 {
            format!("{v} ml")
        } else {
            "not set".to_string()
        }
    };

    let rows = vec![
        SettingRow {
            name: "Glucose low",
            value: format!("{} mg/dL", settings.glucose_low),
        },
        SettingRow {
            name: "Glucose high",
            value: format!("{} mg/dL", settings.glucose_high),
        },
        SettingRow {
            name: "Ketone warning",
            value: format!("{} mmol/L", settings.ketone_warning),
        },
        SettingRow {
            name: "Ketone danger",
            value: format!("{} mmol/L", settings.ketone_danger),
        },
        SettingRow {
            name: "Daily feeding target",
            value: target(settings.daily_feeding_target),
        },
        SettingRow {
            name: "Daily saline target",
            value: target(settings.daily_saline_target),
        },
    ];

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn cmd_settings_show(svc: &CareService, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(svc.settings())?);
    } else {
        print_settings(svc.settings());
    }
    Ok(())
}

pub(crate) fn cmd_settings_set(svc: &mut CareService, patch: &SettingsPatch, json: bool) -> Result<()> {
    if patch.is_empty() {
        bail!(
            "Nothing to update. Provide at least one of --glucose-low, --glucose-high, \
             --ketone-warning, --ketone-danger, --feeding-target or --saline-target"
        );
    }
    patch.validate()?;

    let settings = svc.patch_settings(patch)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&settings)?);
    } else {
        println!("Settings updated.");
        print_settings(&settings);
    }
    for note in settings.inverted_thresholds() {
        eprintln!("Note: {note}. Readings will be classified using these values as given.");
    }
    Ok(())
}
