use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::process;

use catlog_core::backup::backup_file_name;
use catlog_core::service::CareService;

use super::helpers::json_error;

pub(crate) fn cmd_export(svc: &CareService, out: Option<PathBuf>, json: bool) -> Result<()> {
    let path = out.unwrap_or_else(|| PathBuf::from(backup_file_name(Local::now().date_naive())));
    let data = svc.export_backup()?;
    std::fs::write(&path, data)
        .with_context(|| format!("Failed to write backup file: {}", path.display()))?;

    let count = svc.entries().len();
    if json {
        println!(
            "{}",
            serde_json::json!({ "path": path.display().to_string(), "entries": count })
        );
    } else {
        println!("Exported {count} entries and settings to {}", path.display());
    }
    Ok(())
}

pub(crate) fn cmd_import(svc: &mut CareService, file: &Path, json: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read backup file: {}", file.display()))?;

    match svc.import_backup(&text) {
        Ok(summary) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                match summary.entries_imported {
                    Some(n) => println!("Restored {n} entries"),
                    None => println!("No entries in backup; existing entries kept"),
                }
                if summary.settings_imported {
                    println!("Restored settings");
                }
            }
            Ok(())
        }
        Err(e) => {
            let message = format!("Import failed: {e}. Nothing was changed.");
            if json {
                println!("{}", json_error(&message));
            } else {
                eprintln!("{message}");
            }
            process::exit(1);
        }
    }
}
